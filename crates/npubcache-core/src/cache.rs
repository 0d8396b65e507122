//! Profile Cache - in-memory profiles and their load state
//!
//! The cache is the single owner of profile data. Lookups of identifiers the
//! cache has never seen fail with [`CacheError::ProfileNotFound`]; entries
//! for identifiers referenced before any data arrived are explicit
//! [`LoadState::Unresolved`] placeholders created through
//! [`ProfileCache::reference`]. No display data is ever invented.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::identity::Npub;
use crate::source::RawProfileRecord;
use crate::types::{LoadState, LocalUser, Profile};

#[derive(Default)]
pub struct ProfileCache {
    profiles: RwLock<HashMap<Npub, Profile>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached profile for `npub`
    pub fn get(&self, npub: &Npub) -> CacheResult<Profile> {
        self.try_get(npub)
            .ok_or_else(|| CacheError::ProfileNotFound(npub.to_string()))
    }

    /// Get cached profiles in the order given
    ///
    /// Fails on the first identifier the cache does not know.
    pub fn get_many(&self, npubs: &[Npub]) -> CacheResult<Vec<Profile>> {
        let profiles = self.profiles.read();
        npubs
            .iter()
            .map(|npub| {
                profiles
                    .get(npub)
                    .cloned()
                    .ok_or_else(|| CacheError::ProfileNotFound(npub.to_string()))
            })
            .collect()
    }

    pub fn try_get(&self, npub: &Npub) -> Option<Profile> {
        self.profiles.read().get(npub).cloned()
    }

    /// Seed placeholders for identifiers not seen yet
    pub fn reference(&self, npubs: &[Npub]) {
        let mut profiles = self.profiles.write();
        for npub in npubs {
            profiles
                .entry(npub.clone())
                .or_insert_with(|| Profile::unresolved(npub.clone()));
        }
    }

    /// Cast and upsert a batch of raw records
    ///
    /// Records for identifiers in `requested` become eager, all others lazy.
    /// Records that cannot be cast are skipped. The whole batch is applied
    /// under one write lock. Returns the identifiers that were updated.
    pub fn cache(&self, records: Vec<RawProfileRecord>, requested: &HashSet<Npub>) -> Vec<Npub> {
        let cast: Vec<Profile> = records
            .iter()
            .filter_map(|record| {
                let npub = match Npub::parse(&record.pubkey) {
                    Ok(npub) => npub,
                    Err(e) => {
                        warn!(pubkey = %record.pubkey, error = %e, "Skipping uncastable record");
                        return None;
                    }
                };
                let state = if requested.contains(&npub) {
                    LoadState::EagerLoaded
                } else {
                    LoadState::LazyLoaded
                };
                Profile::cast(record, state).ok()
            })
            .collect();

        let mut touched = Vec::with_capacity(cast.len());
        let mut profiles = self.profiles.write();
        for profile in cast {
            let npub = profile.npub.clone();
            Self::upsert(&mut profiles, profile);
            if !touched.contains(&npub) {
                touched.push(npub);
            }
        }

        debug!(
            records = records.len(),
            updated = touched.len(),
            total = profiles.len(),
            "Cached profile records"
        );
        touched
    }

    /// Upsert an already-cast profile
    pub fn cache_profile(&self, profile: Profile) {
        let mut profiles = self.profiles.write();
        Self::upsert(&mut profiles, profile);
    }

    fn upsert(profiles: &mut HashMap<Npub, Profile>, profile: Profile) {
        match profiles.get_mut(&profile.npub) {
            Some(existing) => existing.merge(profile),
            None => {
                profiles.insert(profile.npub.clone(), profile);
            }
        }
    }

    pub fn is_eager_loaded(&self, npub: &Npub) -> bool {
        self.load_state(npub) == Some(LoadState::EagerLoaded)
    }

    pub fn load_state(&self, npub: &Npub) -> Option<LoadState> {
        self.profiles.read().get(npub).map(|p| p.load_state)
    }

    /// Bind a local user handle to a cached profile
    pub fn attach_user(&self, npub: &Npub, user: LocalUser) -> CacheResult<Profile> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(npub)
            .ok_or_else(|| CacheError::ProfileNotFound(npub.to_string()))?;
        profile.user = Some(user);
        Ok(profile.clone())
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    /// All cached profiles, sorted by identifier
    pub fn snapshot(&self) -> Vec<Profile> {
        let mut all: Vec<Profile> = self.profiles.read().values().cloned().collect();
        all.sort_by(|a, b| a.npub.cmp(&b.npub));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::Keys;

    fn npub() -> Npub {
        Npub::from_public_key(&Keys::generate().public_key()).unwrap()
    }

    fn record(npub: &Npub, created_at: u64, name: &str) -> RawProfileRecord {
        RawProfileRecord::new(npub.as_str(), created_at, format!(r#"{{"name":"{}"}}"#, name))
    }

    fn requested(npubs: &[&Npub]) -> HashSet<Npub> {
        npubs.iter().map(|n| (*n).clone()).collect()
    }

    #[test]
    fn test_unknown_is_not_found() {
        let cache = ProfileCache::new();
        let id = npub();

        assert!(!cache.is_eager_loaded(&id));
        assert!(cache.load_state(&id).is_none());
        assert!(matches!(cache.get(&id), Err(CacheError::ProfileNotFound(_))));
        assert!(cache.get_many(&[id]).is_err());
    }

    #[test]
    fn test_reference_creates_placeholder() {
        let cache = ProfileCache::new();
        let id = npub();

        cache.reference(&[id.clone()]);

        let placeholder = cache.get(&id).unwrap();
        assert_eq!(placeholder.load_state, LoadState::Unresolved);
        assert!(placeholder.content.name.is_none());
        assert!(!cache.is_eager_loaded(&id));
    }

    #[test]
    fn test_reference_does_not_touch_loaded() {
        let cache = ProfileCache::new();
        let id = npub();
        cache.cache(vec![record(&id, 1, "a")], &requested(&[&id]));

        cache.reference(&[id.clone()]);

        assert!(cache.is_eager_loaded(&id));
        assert_eq!(cache.get(&id).unwrap().content.name.as_deref(), Some("a"));
    }

    #[test]
    fn test_requested_eager_incidental_lazy() {
        let cache = ProfileCache::new();
        let asked = npub();
        let extra = npub();

        let touched = cache.cache(
            vec![record(&asked, 1, "asked"), record(&extra, 1, "extra")],
            &requested(&[&asked]),
        );

        assert_eq!(touched, vec![asked.clone(), extra.clone()]);
        assert_eq!(cache.load_state(&asked), Some(LoadState::EagerLoaded));
        assert_eq!(cache.load_state(&extra), Some(LoadState::LazyLoaded));
    }

    #[test]
    fn test_eager_not_downgraded() {
        let cache = ProfileCache::new();
        let id = npub();
        cache.cache(vec![record(&id, 1, "first")], &requested(&[&id]));

        cache.cache(vec![record(&id, 2, "second")], &HashSet::new());

        let profile = cache.get(&id).unwrap();
        assert_eq!(profile.load_state, LoadState::EagerLoaded);
        assert_eq!(profile.content.name.as_deref(), Some("second"));
    }

    #[test]
    fn test_skips_uncastable() {
        let cache = ProfileCache::new();
        let id = npub();

        let touched = cache.cache(
            vec![RawProfileRecord::new("bogus", 1, "{}"), record(&id, 1, "ok")],
            &requested(&[&id]),
        );

        assert_eq!(touched, vec![id]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_many_keeps_order() {
        let cache = ProfileCache::new();
        let a = npub();
        let b = npub();
        cache.cache(vec![record(&a, 1, "a"), record(&b, 1, "b")], &requested(&[&a, &b]));

        let profiles = cache.get_many(&[b.clone(), a.clone()]).unwrap();
        assert_eq!(profiles[0].npub, b);
        assert_eq!(profiles[1].npub, a);
    }

    #[test]
    fn test_attach_user() {
        let cache = ProfileCache::new();
        let id = npub();

        assert!(cache.attach_user(&id, LocalUser::new(id.clone())).is_err());

        cache.reference(&[id.clone()]);
        let profile = cache.attach_user(&id, LocalUser::new(id.clone())).unwrap();
        assert_eq!(profile.user.as_ref().map(|u| &u.npub), Some(&id));

        cache.cache(vec![record(&id, 3, "named")], &requested(&[&id]));
        assert!(cache.get(&id).unwrap().user.is_some());
    }

    #[test]
    fn test_snapshot_sorted() {
        let cache = ProfileCache::new();
        let ids = [npub(), npub(), npub()];
        cache.reference(&ids);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.windows(2).all(|w| w[0].npub <= w[1].npub));
        assert!(!cache.is_empty());
    }
}
