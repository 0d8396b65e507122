//! Account secret encryption
//!
//! The registry only stores what an [`AccountEncryptor`] produces. The
//! shipped [`PinEncryptor`] uses ChaCha20-Poly1305 with a key derived from the
//! PIN by HKDF-SHA256 over a random per-account salt.
//!
//! # Blob Format
//!
//! `ncryptsec-v1:` + base64(`[salt (16 bytes)] + [nonce (12 bytes)] + [ciphertext + tag]`)
//!
//! The plaintext is the secret key in hex.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use nostr::SecretKey;
use rand::RngCore;
use sha2::Sha256;
use tracing::warn;
use zeroize::Zeroize;

use crate::error::{CacheError, CacheResult};
use crate::identity::Npub;
use crate::types::{Account, Profile};

/// Prefix identifying the blob format version
pub const BLOB_PREFIX: &str = "ncryptsec-v1:";

/// Salt size for key derivation (16 bytes)
pub const SALT_SIZE: usize = 16;

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

const KDF_INFO: &[u8] = b"npubcache account secret v1";

/// Turns a raw secret into an [`Account`] and back
///
/// Implementations must never return, log or persist the raw secret.
pub trait AccountEncryptor: Send + Sync {
    /// Encrypt `secret` for `profile`
    ///
    /// Returns `None` when no usable account can be produced, e.g. the secret
    /// does not belong to the profile's identity.
    fn encrypt(&self, profile: &Profile, secret: &SecretKey, pin: Option<&str>) -> Option<Account>;

    /// Recover the secret of an account
    fn decrypt(&self, account: &Account, pin: Option<&str>) -> CacheResult<SecretKey>;
}

/// PIN-based encryptor using ChaCha20-Poly1305 AEAD
#[derive(Debug, Default, Clone, Copy)]
pub struct PinEncryptor;

impl PinEncryptor {
    pub fn new() -> Self {
        Self
    }

    fn cipher(pin: Option<&str>, salt: &[u8]) -> CacheResult<ChaCha20Poly1305> {
        let hk = Hkdf::<Sha256>::new(Some(salt), pin.unwrap_or_default().as_bytes());
        let mut key = [0u8; 32];
        hk.expand(KDF_INFO, &mut key)
            .map_err(|e| CacheError::Crypto(format!("Key derivation failed: {}", e)))?;
        let cipher = ChaCha20Poly1305::new((&key).into());
        key.zeroize();
        Ok(cipher)
    }

    fn seal(secret: &SecretKey, pin: Option<&str>) -> CacheResult<String> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut salt);
        rand::rng().fill_bytes(&mut nonce_bytes);

        let cipher = Self::cipher(pin, &salt)?;
        let mut plaintext = secret.to_secret_hex();
        let sealed = cipher.encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes());
        plaintext.zeroize();
        let ciphertext =
            sealed.map_err(|e| CacheError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", BLOB_PREFIX, STANDARD.encode(blob)))
    }

    fn open(encrypted: &str, pin: Option<&str>) -> CacheResult<SecretKey> {
        let encoded = encrypted
            .strip_prefix(BLOB_PREFIX)
            .ok_or_else(|| CacheError::Crypto("Unknown secret blob format".to_string()))?;
        let blob = STANDARD
            .decode(encoded)
            .map_err(|e| CacheError::Crypto(format!("Invalid secret blob: {}", e)))?;

        if blob.len() <= SALT_SIZE + NONCE_SIZE {
            return Err(CacheError::Crypto(
                "Data too short to contain salt and nonce".to_string(),
            ));
        }

        let (salt, rest) = blob.split_at(SALT_SIZE);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        let cipher = Self::cipher(pin, salt)?;
        let mut plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CacheError::Crypto("Decryption failed (wrong PIN?)".to_string()))?;

        let secret = std::str::from_utf8(&plaintext)
            .ok()
            .and_then(|hex| SecretKey::from_hex(hex).ok())
            .ok_or_else(|| CacheError::Crypto("Decrypted secret is malformed".to_string()));
        plaintext.zeroize();
        secret
    }
}

impl AccountEncryptor for PinEncryptor {
    fn encrypt(&self, profile: &Profile, secret: &SecretKey, pin: Option<&str>) -> Option<Account> {
        match Npub::from_secret(secret) {
            Ok(owner) if owner == profile.npub => {}
            _ => {
                warn!(npub = %profile.npub, "Secret does not belong to profile");
                return None;
            }
        }

        match Self::seal(secret, pin) {
            Ok(encrypted_secret) => Some(Account {
                npub: profile.npub.clone(),
                encrypted_secret,
                profile: Some(profile.clone()),
            }),
            Err(e) => {
                warn!(npub = %profile.npub, error = %e, "Failed to encrypt account secret");
                None
            }
        }
    }

    fn decrypt(&self, account: &Account, pin: Option<&str>) -> CacheResult<SecretKey> {
        let secret = Self::open(&account.encrypted_secret, pin)?;
        if Npub::from_secret(&secret)? != account.npub {
            return Err(CacheError::Crypto(
                "Decrypted secret belongs to a different identity".to_string(),
            ));
        }
        Ok(secret)
    }
}
