//! Profile Orchestrator - the single entry point for loading profiles
//!
//! Every loading path funnels into one remote fetch per identifier per
//! logical request:
//! - identifiers are flattened and deduplicated across all batches
//! - eager entries are answered from the cache
//! - identifiers another call is already fetching are awaited, not refetched
//! - the rest go to the [`ProfileSource`] in a single call
//!
//! A failed fetch caches nothing; the error reaches the caller as
//! [`CacheError::Fetch`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use npubcache_core::{AccountStore, JsonFileSource, MemoryStore, PinEncryptor, ProfileCache, ProfileOrchestrator};
//!
//! let accounts = Arc::new(AccountStore::open(Arc::new(MemoryStore::new()), Arc::new(PinEncryptor::new()))?);
//! let orchestrator = ProfileOrchestrator::new(
//!     Arc::new(JsonFileSource::new("profiles.json")),
//!     Arc::new(ProfileCache::new()),
//!     accounts,
//! );
//!
//! let profiles = orchestrator.load_profiles(&[&[a.clone(), b.clone()], &[b, c]]).await?;
//! ```

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::accounts::AccountStore;
use crate::cache::ProfileCache;
use crate::error::{CacheError, CacheResult};
use crate::identity::{self, Npub};
use crate::source::ProfileSource;
use crate::types::{Account, LocalUser, Profile};

/// Identifiers currently being fetched, with a channel that closes when the
/// fetch finishes (successfully or not)
#[derive(Default)]
struct InFlight {
    pending: Mutex<HashMap<Npub, watch::Receiver<()>>>,
}

impl InFlight {
    /// Claim every identifier nobody is fetching yet; return waiters for the
    /// ones already claimed elsewhere
    fn partition(&self, npubs: &[Npub]) -> (FetchClaim<'_>, Vec<(Npub, watch::Receiver<()>)>) {
        let mut pending = self.pending.lock();
        let mut claim = FetchClaim {
            registry: self,
            npubs: Vec::new(),
            _done: Vec::new(),
        };
        let mut waiters = Vec::new();

        for npub in npubs {
            match pending.get(npub) {
                Some(rx) => waiters.push((npub.clone(), rx.clone())),
                None => {
                    let (tx, rx) = watch::channel(());
                    pending.insert(npub.clone(), rx);
                    claim.npubs.push(npub.clone());
                    claim._done.push(tx);
                }
            }
        }

        (claim, waiters)
    }
}

/// Ownership of in-flight identifiers; releases them on drop
struct FetchClaim<'a> {
    registry: &'a InFlight,
    npubs: Vec<Npub>,
    /// Dropped after the map entries are removed, waking the waiters
    _done: Vec<watch::Sender<()>>,
}

impl FetchClaim<'_> {
    fn npubs(&self) -> &[Npub] {
        &self.npubs
    }
}

impl Drop for FetchClaim<'_> {
    fn drop(&mut self) {
        let mut pending = self.registry.pending.lock();
        for npub in &self.npubs {
            pending.remove(npub);
        }
    }
}

/// Loads profiles through the cache and creates local accounts
pub struct ProfileOrchestrator {
    source: Arc<dyn ProfileSource>,
    cache: Arc<ProfileCache>,
    accounts: Arc<AccountStore>,
    in_flight: InFlight,
}

impl ProfileOrchestrator {
    pub fn new(
        source: Arc<dyn ProfileSource>,
        cache: Arc<ProfileCache>,
        accounts: Arc<AccountStore>,
    ) -> Self {
        Self {
            source,
            cache,
            accounts,
            in_flight: InFlight::default(),
        }
    }

    pub fn cache(&self) -> &Arc<ProfileCache> {
        &self.cache
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    /// Load one profile
    ///
    /// An eager cache entry is returned as is; anything else is reloaded,
    /// joining a fetch of the same identifier that is already running.
    pub async fn load(&self, npub: &Npub) -> CacheResult<Profile> {
        if self.cache.is_eager_loaded(npub) {
            debug!(%npub, "Profile served from cache");
            return self.cache.get(npub);
        }
        self.load_profiles(&[std::slice::from_ref(npub)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::ProfileNotFound(npub.to_string()))
    }

    /// Load a batch of profiles; see [`load_profiles`](Self::load_profiles)
    pub async fn load_many(&self, npubs: &[Npub]) -> CacheResult<Vec<Profile>> {
        self.load_profiles(&[npubs]).await
    }

    /// Load the union of several batches with at most one fetch per identifier
    ///
    /// Profiles come back in first-occurrence order of the deduplicated union.
    pub async fn load_profiles(&self, batches: &[&[Npub]]) -> CacheResult<Vec<Profile>> {
        let requested = dedup(batches.iter().flat_map(|batch| batch.iter()));

        let missing: Vec<Npub> = requested
            .iter()
            .filter(|npub| !self.cache.is_eager_loaded(npub))
            .cloned()
            .collect();

        debug!(
            requested = requested.len(),
            missing = missing.len(),
            "Loading profiles"
        );

        if !missing.is_empty() {
            let (claim, waiters) = self.in_flight.partition(&missing);

            if !claim.npubs().is_empty() {
                self.fetch_and_cache(claim.npubs()).await?;
            }
            drop(claim);

            if !waiters.is_empty() {
                debug!(count = waiters.len(), "Joining fetches already in flight");
                let mut retry = Vec::new();
                for (npub, mut rx) in waiters {
                    while rx.changed().await.is_ok() {}
                    if !self.cache.is_eager_loaded(&npub) {
                        retry.push(npub);
                    }
                }
                // The fetch we waited on failed or missed these.
                if !retry.is_empty() {
                    self.fetch_and_cache(&retry).await?;
                }
            }
        }

        self.cache.get_many(&requested)
    }

    /// Fetch the given identifiers unconditionally and cache them as eager
    ///
    /// Returns the cache's view of exactly the requested identifiers.
    pub async fn force_profile_reload(&self, npubs: &[Npub]) -> CacheResult<Vec<Profile>> {
        let requested = dedup(npubs.iter());
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        // Let concurrent loads join this fetch where nobody else is fetching.
        let (claim, _) = self.in_flight.partition(&requested);
        self.fetch_and_cache(&requested).await?;
        drop(claim);

        self.cache.get_many(&requested)
    }

    /// Load a profile given a raw public key (hex or npub)
    pub async fn load_from_raw_key(&self, raw_key: &str) -> CacheResult<Profile> {
        let npub = identity::to_canonical_identifier(raw_key)?;
        self.load(&npub).await
    }

    /// Build an encrypted account for a raw secret key (hex or nsec)
    ///
    /// The profile is loaded and bound to a new local user handle. The
    /// account is NOT persisted; call [`AccountStore::add_account`] to keep
    /// it. Returns `Ok(None)` when encryption produced no account.
    pub async fn load_account(
        &self,
        raw_secret: &str,
        pin: Option<&str>,
    ) -> CacheResult<Option<Account>> {
        let secret = identity::parse_secret(raw_secret)?;
        let npub = Npub::from_secret(&secret)?;

        self.load(&npub).await?;
        let profile = self.cache.attach_user(&npub, LocalUser::new(npub.clone()))?;

        let account = self.accounts.create_account(&profile, &secret, pin);
        if account.is_some() {
            info!(%npub, "Prepared local account");
        }
        Ok(account)
    }

    /// One remote call for `npubs`; requested identifiers the source did not
    /// answer become unresolved placeholders
    async fn fetch_and_cache(&self, npubs: &[Npub]) -> CacheResult<()> {
        debug!(count = npubs.len(), "Fetching profiles from source");

        let records = self.source.fetch_profiles(npubs).await.map_err(|e| {
            warn!(count = npubs.len(), error = %e, "Profile fetch failed");
            e
        })?;

        let requested: HashSet<Npub> = npubs.iter().cloned().collect();
        let touched: HashSet<Npub> = self.cache.cache(records, &requested).into_iter().collect();

        let unanswered: Vec<Npub> = npubs
            .iter()
            .filter(|npub| !touched.contains(*npub))
            .cloned()
            .collect();
        if !unanswered.is_empty() {
            debug!(count = unanswered.len(), "Source had no record for some profiles");
            self.cache.reference(&unanswered);
        }

        Ok(())
    }
}

/// Deduplicate, keeping first-occurrence order
fn dedup<'a>(npubs: impl Iterator<Item = &'a Npub>) -> Vec<Npub> {
    let mut seen = HashSet::new();
    npubs.filter(|npub| seen.insert(*npub)).cloned().collect()
}
