//! npubcache Core Library
//!
//! Profile loading with request deduplication, and an encrypted local
//! account registry.
//!
//! ## Overview
//!
//! Profiles are addressed by npub and fetched from a [`ProfileSource`] that
//! may be slow or unreliable. The [`ProfileOrchestrator`] makes sure each
//! identifier is fetched at most once per logical request and never again
//! once it is eagerly loaded. The [`AccountStore`] keeps locally controlled
//! identities, with their secrets encrypted, in durable storage and publishes
//! every change of the account list.
//!
//! ## Core Principles
//!
//! - **At most one fetch**: overlapping and concurrent requests share fetches
//! - **Forward-only load state**: `Unresolved → LazyLoaded → EagerLoaded`
//! - **Persist, then publish**: no subscriber ever sees unsaved accounts
//! - **Secrets stay sealed**: raw keys are never stored or logged
//!
//! ## Backends
//!
//! | Concern  | Durable            | Ephemeral       |
//! |----------|--------------------|-----------------|
//! | Storage  | [`Storage`] (redb) | [`MemoryStore`] |
//! | Profiles | [`JsonFileSource`] | [`MemorySource`] |
//!
//! The ephemeral backends keep everything in process memory. They are meant
//! for tests and embedding, and carry switches to inject failures and
//! latency; nothing written to them survives a restart.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use npubcache_core::{AccountStore, JsonFileSource, PinEncryptor, ProfileCache, ProfileOrchestrator, Storage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Storage::new("~/.npubcache/data/npubcache.redb")?;
//!     let accounts = Arc::new(AccountStore::open(Arc::new(storage), Arc::new(PinEncryptor::new()))?);
//!     let orchestrator = ProfileOrchestrator::new(
//!         Arc::new(JsonFileSource::new("profiles.json")),
//!         Arc::new(ProfileCache::new()),
//!         accounts.clone(),
//!     );
//!
//!     let profile = orchestrator.load_from_raw_key("npub1...").await?;
//!     println!("{}", profile.label());
//!
//!     if let Some(account) = orchestrator.load_account("nsec1...", Some("1234")).await? {
//!         accounts.add_account(account)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod cache;
pub mod crypto;
pub mod error;
pub mod feed;
pub mod identity;
pub mod orchestrator;
pub mod source;
pub mod storage;
pub mod types;

// Re-exports
pub use accounts::{AccountStore, ACCOUNTS_KEY};
pub use cache::ProfileCache;
pub use crypto::{AccountEncryptor, PinEncryptor};
pub use error::{CacheError, CacheResult};
pub use feed::{AccountFeed, AccountSubscription, SnapshotFeed, Subscription};
pub use identity::Npub;
pub use orchestrator::ProfileOrchestrator;
pub use source::{JsonFileSource, ProfileSource, RawProfileRecord, SourceError};
pub use storage::{KeyValueStore, Storage};

// Ephemeral in-memory backends
pub use source::MemorySource;
pub use storage::MemoryStore;
pub use types::*;
