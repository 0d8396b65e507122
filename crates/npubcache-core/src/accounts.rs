//! Account Secret Store - persisted registry of local accounts
//!
//! The registry maps npub → [`Account`]. Every mutation is written to the
//! [`KeyValueStore`] under [`ACCOUNTS_KEY`] before it becomes visible: if the
//! write fails the in-memory registry is left untouched and nothing is
//! published on the feed.
//!
//! The store is constructed once with [`AccountStore::open`] and shared by
//! handle (`Arc<AccountStore>`); there is no global instance.

use nostr::SecretKey;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::crypto::AccountEncryptor;
use crate::error::{CacheError, CacheResult};
use crate::feed::{AccountFeed, AccountSubscription};
use crate::identity::Npub;
use crate::storage::KeyValueStore;
use crate::types::{Account, Profile};

/// Storage key of the registry blob (JSON object npub → account)
pub const ACCOUNTS_KEY: &str = "accounts.v1";

pub struct AccountStore {
    kv: Arc<dyn KeyValueStore>,
    encryptor: Arc<dyn AccountEncryptor>,
    /// Registry in display (insertion) order; keys are unique
    accounts: Mutex<Vec<Account>>,
    feed: AccountFeed,
}

impl AccountStore {
    /// Open the store, seeding the registry from durable storage
    pub fn open(
        kv: Arc<dyn KeyValueStore>,
        encryptor: Arc<dyn AccountEncryptor>,
    ) -> CacheResult<Self> {
        let accounts: Vec<Account> = match kv.read_string(ACCOUNTS_KEY)? {
            Some(blob) => {
                // Object order is the display order.
                let map: Map<String, Value> = serde_json::from_str(&blob)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                map.into_iter()
                    .map(|(_, value)| serde_json::from_value(value))
                    .collect::<Result<Vec<Account>, _>>()
                    .map_err(|e| CacheError::Serialization(e.to_string()))?
            }
            None => Vec::new(),
        };

        info!(count = accounts.len(), "Loaded account registry");

        Ok(Self {
            kv,
            encryptor,
            feed: AccountFeed::new(accounts.clone()),
            accounts: Mutex::new(accounts),
        })
    }

    /// Encrypt `secret` into an account for `profile`
    ///
    /// Does not touch the registry. Returns `None` when the encryptor cannot
    /// produce a usable account; callers must check for it.
    pub fn create_account(
        &self,
        profile: &Profile,
        secret: &SecretKey,
        pin: Option<&str>,
    ) -> Option<Account> {
        let account = self.encryptor.encrypt(profile, secret, pin);
        if account.is_none() {
            debug!(npub = %profile.npub, "Encryptor produced no account");
        }
        account
    }

    /// Insert or replace the account with the same npub
    pub fn add_account(&self, account: Account) -> CacheResult<()> {
        let npub = account.npub.clone();
        let mut accounts = self.accounts.lock();

        let mut next = accounts.clone();
        match next.iter_mut().find(|a| a.npub == account.npub) {
            Some(existing) => *existing = account,
            None => next.push(account),
        }

        self.persist(&next)?;
        *accounts = next;
        self.feed.publish(accounts.clone());

        info!(%npub, total = accounts.len(), "Account added");
        Ok(())
    }

    /// Remove the account with the same npub as `account`
    ///
    /// See [`remove_npub`](Self::remove_npub).
    pub fn remove_account(&self, account: &Account) -> CacheResult<bool> {
        self.remove_npub(&account.npub)
    }

    /// Remove the account for `npub`; absence is not an error
    ///
    /// The registry is persisted and republished either way. Returns whether
    /// an account was removed.
    pub fn remove_npub(&self, npub: &Npub) -> CacheResult<bool> {
        let mut accounts = self.accounts.lock();

        let mut next = accounts.clone();
        next.retain(|a| &a.npub != npub);
        let removed = next.len() != accounts.len();

        self.persist(&next)?;
        *accounts = next;
        self.feed.publish(accounts.clone());

        if removed {
            info!(%npub, total = accounts.len(), "Account removed");
        } else {
            debug!(%npub, "Remove requested for unknown account");
        }
        Ok(removed)
    }

    /// Subscribe to full account-list snapshots
    ///
    /// The current list is delivered first.
    pub fn accounts(&self) -> AccountSubscription {
        self.feed.subscribe()
    }

    /// Current account list in display order
    pub fn list(&self) -> Vec<Account> {
        self.accounts.lock().clone()
    }

    pub fn get(&self, npub: &Npub) -> Option<Account> {
        self.accounts.lock().iter().find(|a| &a.npub == npub).cloned()
    }

    /// Decrypt the secret of a stored account
    pub fn unlock(&self, npub: &Npub, pin: Option<&str>) -> CacheResult<SecretKey> {
        let account = self
            .get(npub)
            .ok_or_else(|| CacheError::ProfileNotFound(npub.to_string()))?;
        self.encryptor.decrypt(&account, pin).inspect_err(|_| {
            warn!(%npub, "Failed to unlock account");
        })
    }

    fn persist(&self, accounts: &[Account]) -> CacheResult<()> {
        let mut map = Map::with_capacity(accounts.len());
        for account in accounts {
            let value = serde_json::to_value(account)
                .map_err(|e| CacheError::Serialization(e.to_string()))?;
            map.insert(account.npub.to_string(), value);
        }
        let blob =
            serde_json::to_string(&map).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.kv.write_string(ACCOUNTS_KEY, &blob).inspect_err(|e| {
            warn!(error = %e, "Failed to persist account registry");
        })
    }
}
