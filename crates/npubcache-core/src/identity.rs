//! Identity conversion between raw key material and canonical npub identifiers
//!
//! Format: `npub1{bech32-x-only-public-key}` (NIP-19)
//!
//! Public keys are accepted as 64-char hex or `npub1…`; secret keys as
//! 64-char hex or `nsec1…`. Secret keys are never logged or formatted.

use nostr::nips::nip19::ToBech32;
use nostr::{Keys, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CacheError, CacheResult};

/// Canonical public identifier of an identity
///
/// Always holds a valid bech32 `npub1…` string; every constructor
/// normalizes and validates its input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Npub(String);

impl Npub {
    /// Encode a public key as an npub
    pub fn from_public_key(public_key: &PublicKey) -> CacheResult<Self> {
        public_key
            .to_bech32()
            .map(Npub)
            .map_err(|e| CacheError::InvalidKey(e.to_string()))
    }

    /// Derive the npub belonging to a secret key
    pub fn from_secret(secret: &SecretKey) -> CacheResult<Self> {
        let keys = Keys::new(secret.clone());
        Self::from_public_key(&keys.public_key())
    }

    /// Parse a public key given as hex or npub into canonical form
    pub fn parse(raw_key: &str) -> CacheResult<Self> {
        let raw_key = raw_key.trim();
        if raw_key.is_empty() {
            return Err(CacheError::InvalidKey("empty public key".to_string()));
        }
        let public_key = PublicKey::parse(raw_key)
            .map_err(|e| CacheError::InvalidKey(format!("{}: {}", raw_key, e)))?;
        Self::from_public_key(&public_key)
    }

    /// Decode back into a public key
    pub fn public_key(&self) -> CacheResult<PublicKey> {
        PublicKey::parse(&self.0).map_err(|e| CacheError::InvalidKey(e.to_string()))
    }

    /// Get the npub as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Npub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Npub {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Npub {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Npub> for String {
    fn from(npub: Npub) -> Self {
        npub.0
    }
}

impl AsRef<str> for Npub {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Convert a raw public key (hex or npub) to its canonical identifier
pub fn to_canonical_identifier(raw_key: &str) -> CacheResult<Npub> {
    Npub::parse(raw_key)
}

/// Parse a raw secret key (hex or nsec)
///
/// The error message never echoes the input.
pub fn parse_secret(raw_secret: &str) -> CacheResult<SecretKey> {
    SecretKey::parse(raw_secret.trim())
        .map_err(|_| CacheError::InvalidKey("malformed secret key".to_string()))
}

/// Derive the canonical identifier of a raw secret key
pub fn npub_from_secret(raw_secret: &str) -> CacheResult<Npub> {
    let secret = parse_secret(raw_secret)?;
    Npub::from_secret(&secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIP-19 reference vector
    const HEX_PUBKEY: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";
    const NPUB: &str = "npub180cvv07tjdrrgpa0j7j7tmnyl2yr6yr7l8j4s3evf6u64th6gkwsyjh6w6";

    #[test]
    fn test_hex_to_npub() {
        let npub = to_canonical_identifier(HEX_PUBKEY).unwrap();
        assert_eq!(npub.as_str(), NPUB);
    }

    #[test]
    fn test_npub_is_canonical() {
        let npub = Npub::parse(NPUB).unwrap();
        assert_eq!(npub.as_str(), NPUB);
        assert_eq!(npub.public_key().unwrap().to_hex(), HEX_PUBKEY);
    }

    #[test]
    fn test_whitespace_trimmed() {
        let npub = Npub::parse(&format!("  {}\n", HEX_PUBKEY)).unwrap();
        assert_eq!(npub.as_str(), NPUB);
    }

    #[test]
    fn test_invalid_public_key() {
        assert!(matches!(Npub::parse(""), Err(CacheError::InvalidKey(_))));
        assert!(matches!(Npub::parse("not-a-key"), Err(CacheError::InvalidKey(_))));
        assert!(matches!(
            Npub::parse("npub1invalidchecksum"),
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_secret_to_npub_matches_keys() {
        let keys = Keys::generate();
        let hex = keys.secret_key().to_secret_hex();

        let from_secret = npub_from_secret(&hex).unwrap();
        let expected = Npub::from_public_key(&keys.public_key()).unwrap();
        assert_eq!(from_secret, expected);
    }

    #[test]
    fn test_invalid_secret_does_not_echo_input() {
        let err = parse_secret("deadbeef-secret").unwrap_err();
        assert!(!err.to_string().contains("deadbeef"));
    }

    #[test]
    fn test_serde_validates() {
        let json = serde_json::to_string(&Npub::parse(NPUB).unwrap()).unwrap();
        assert_eq!(json, format!("\"{}\"", NPUB));

        let parsed: Npub = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_str(), NPUB);

        let bad: Result<Npub, _> = serde_json::from_str("\"garbage\"");
        assert!(bad.is_err());
    }
}
