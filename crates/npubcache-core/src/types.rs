//! Core domain types: profiles, load state, local users and accounts

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::CacheResult;
use crate::identity::Npub;
use crate::source::RawProfileRecord;

/// How completely a cached profile has been loaded
///
/// Ordered and forward-only: `Unresolved < LazyLoaded < EagerLoaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LoadState {
    /// Identifier known, no data fetched yet
    Unresolved,
    /// Data obtained incidentally; possibly incomplete
    LazyLoaded,
    /// Direct answer to an explicit load request
    EagerLoaded,
}

impl LoadState {
    /// Combine two states; the result never moves backward
    pub fn merge(self, other: LoadState) -> LoadState {
        self.max(other)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadState::Unresolved => "unresolved",
            LoadState::LazyLoaded => "lazy",
            LoadState::EagerLoaded => "eager",
        };
        f.write_str(s)
    }
}

/// Display fields carried in the JSON content of a metadata record
///
/// Every field may be absent. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileContent {
    pub name: Option<String>,
    pub display_name: Option<String>,
    #[serde(alias = "bio")]
    pub about: Option<String>,
    #[serde(alias = "image")]
    pub picture: Option<String>,
    pub banner: Option<String>,
    pub website: Option<String>,
    pub nip05: Option<String>,
    pub lud16: Option<String>,
}

impl ProfileContent {
    /// Best-effort parse; malformed content yields empty fields
    pub fn parse(content: &str) -> Self {
        if content.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(content) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed profile content");
                Self::default()
            }
        }
    }

    /// Take every field from `other` that is present, keep the rest
    fn fill_from(&mut self, other: ProfileContent) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }
        fill(&mut self.name, other.name);
        fill(&mut self.display_name, other.display_name);
        fill(&mut self.about, other.about);
        fill(&mut self.picture, other.picture);
        fill(&mut self.banner, other.banner);
        fill(&mut self.website, other.website);
        fill(&mut self.nip05, other.nip05);
        fill(&mut self.lud16, other.lud16);
    }
}

/// Handle for an identity controlled on this device
///
/// Never carries secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub npub: Npub,
    /// Unix timestamp when the handle was created
    pub created_at: i64,
}

impl LocalUser {
    pub fn new(npub: Npub) -> Self {
        Self {
            npub,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Public profile of a remote identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub npub: Npub,

    #[serde(flatten)]
    pub content: ProfileContent,

    /// Timestamp of the record the display fields came from
    pub created_at: u64,

    /// Set once an account for this identity exists locally
    pub user: Option<LocalUser>,

    pub load_state: LoadState,
}

impl Profile {
    /// Placeholder for an identifier referenced before any load
    pub fn unresolved(npub: Npub) -> Self {
        Self {
            npub,
            content: ProfileContent::default(),
            created_at: 0,
            user: None,
            load_state: LoadState::Unresolved,
        }
    }

    /// Cast a raw record into a profile with the given load state
    ///
    /// Fails only when the record's pubkey is not a valid key.
    pub fn cast(record: &RawProfileRecord, load_state: LoadState) -> CacheResult<Self> {
        let npub = Npub::parse(&record.pubkey)?;
        Ok(Self {
            npub,
            content: ProfileContent::parse(&record.content),
            created_at: record.created_at,
            user: None,
            load_state,
        })
    }

    /// Best name to show for this profile
    pub fn label(&self) -> &str {
        self.content
            .display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.content.name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(self.npub.as_str())
    }

    pub fn is_eager_loaded(&self) -> bool {
        self.load_state == LoadState::EagerLoaded
    }

    /// Merge a newer cast of the same identity into this one
    ///
    /// - load state only moves forward
    /// - the first eager cast replaces whatever partial data was cached,
    ///   regardless of timestamps
    /// - otherwise a record older than the current data leaves display
    ///   fields alone
    /// - an eager cast replaces all display fields, a lazy cast only fills
    ///   the ones it carries
    /// - the local user handle survives
    pub fn merge(&mut self, incoming: Profile) {
        debug_assert_eq!(self.npub, incoming.npub);

        if incoming.is_eager_loaded() && !self.is_eager_loaded() {
            self.content = incoming.content;
            self.created_at = incoming.created_at;
        } else if self.load_state == LoadState::Unresolved
            || incoming.created_at >= self.created_at
        {
            match incoming.load_state {
                LoadState::EagerLoaded => self.content = incoming.content,
                LoadState::LazyLoaded | LoadState::Unresolved => {
                    self.content.fill_from(incoming.content)
                }
            }
            self.created_at = self.created_at.max(incoming.created_at);
        }

        self.load_state = self.load_state.merge(incoming.load_state);

        if self.user.is_none() {
            self.user = incoming.user;
        }
    }
}

/// Locally known identity with its encrypted secret
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub npub: Npub,

    /// Opaque blob produced by an [`AccountEncryptor`](crate::crypto::AccountEncryptor)
    pub encrypted_secret: String,

    /// Profile snapshot taken when the account was created
    pub profile: Option<Profile>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("npub", &self.npub)
            .field("encrypted_secret", &"<redacted>")
            .field("profile", &self.profile)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::Keys;

    fn npub() -> Npub {
        Npub::from_public_key(&Keys::generate().public_key()).unwrap()
    }

    fn record(npub: &Npub, created_at: u64, content: &str) -> RawProfileRecord {
        RawProfileRecord::new(npub.as_str(), created_at, content)
    }

    #[test]
    fn test_load_state_order() {
        assert!(LoadState::Unresolved < LoadState::LazyLoaded);
        assert!(LoadState::LazyLoaded < LoadState::EagerLoaded);
        assert_eq!(
            LoadState::EagerLoaded.merge(LoadState::LazyLoaded),
            LoadState::EagerLoaded
        );
        assert_eq!(
            LoadState::Unresolved.merge(LoadState::LazyLoaded),
            LoadState::LazyLoaded
        );
    }

    #[test]
    fn test_cast_reads_content() {
        let id = npub();
        let raw = record(&id, 10, r#"{"name":"alice","about":"hi","picture":"https://x/a.png"}"#);

        let profile = Profile::cast(&raw, LoadState::EagerLoaded).unwrap();
        assert_eq!(profile.npub, id);
        assert_eq!(profile.content.name.as_deref(), Some("alice"));
        assert_eq!(profile.content.about.as_deref(), Some("hi"));
        assert_eq!(profile.content.picture.as_deref(), Some("https://x/a.png"));
        assert_eq!(profile.created_at, 10);
        assert!(profile.is_eager_loaded());
    }

    #[test]
    fn test_cast_accepts_aliases_and_bad_content() {
        let id = npub();
        let aliased = Profile::cast(
            &record(&id, 1, r#"{"bio":"b","image":"i","extra":5}"#),
            LoadState::LazyLoaded,
        )
        .unwrap();
        assert_eq!(aliased.content.about.as_deref(), Some("b"));
        assert_eq!(aliased.content.picture.as_deref(), Some("i"));

        let broken = Profile::cast(&record(&id, 1, "{not json"), LoadState::LazyLoaded).unwrap();
        assert_eq!(broken.content, ProfileContent::default());
    }

    #[test]
    fn test_cast_rejects_bad_pubkey() {
        let raw = RawProfileRecord::new("zzz", 1, "{}");
        assert!(Profile::cast(&raw, LoadState::EagerLoaded).is_err());
    }

    #[test]
    fn test_merge_eager_is_sticky() {
        let id = npub();
        let mut cached =
            Profile::cast(&record(&id, 5, r#"{"name":"a"}"#), LoadState::EagerLoaded).unwrap();
        let lazy = Profile::cast(&record(&id, 6, r#"{"about":"new"}"#), LoadState::LazyLoaded).unwrap();

        cached.merge(lazy);

        assert_eq!(cached.load_state, LoadState::EagerLoaded);
        assert_eq!(cached.content.name.as_deref(), Some("a"));
        assert_eq!(cached.content.about.as_deref(), Some("new"));
        assert_eq!(cached.created_at, 6);
    }

    #[test]
    fn test_merge_eager_replaces_fields() {
        let id = npub();
        let mut cached = Profile::cast(
            &record(&id, 5, r#"{"name":"a","about":"old"}"#),
            LoadState::LazyLoaded,
        )
        .unwrap();
        let eager = Profile::cast(&record(&id, 7, r#"{"name":"b"}"#), LoadState::EagerLoaded).unwrap();

        cached.merge(eager);

        assert_eq!(cached.load_state, LoadState::EagerLoaded);
        assert_eq!(cached.content.name.as_deref(), Some("b"));
        assert!(cached.content.about.is_none());
    }

    #[test]
    fn test_merge_older_record_keeps_fields() {
        let id = npub();
        let mut cached =
            Profile::cast(&record(&id, 9, r#"{"name":"new"}"#), LoadState::EagerLoaded).unwrap();
        let stale = Profile::cast(&record(&id, 3, r#"{"name":"old"}"#), LoadState::EagerLoaded).unwrap();
        let stale_lazy =
            Profile::cast(&record(&id, 4, r#"{"name":"older"}"#), LoadState::LazyLoaded).unwrap();

        cached.merge(stale);
        cached.merge(stale_lazy);

        assert_eq!(cached.content.name.as_deref(), Some("new"));
        assert_eq!(cached.created_at, 9);
        assert_eq!(cached.load_state, LoadState::EagerLoaded);
    }

    #[test]
    fn test_first_eager_cast_replaces_newer_lazy_data() {
        let id = npub();
        let mut cached =
            Profile::cast(&record(&id, 10, r#"{"name":"lazy"}"#), LoadState::LazyLoaded).unwrap();
        let eager = Profile::cast(
            &record(&id, 9, r#"{"name":"full","about":"bio","picture":"pic"}"#),
            LoadState::EagerLoaded,
        )
        .unwrap();

        cached.merge(eager);

        assert_eq!(cached.load_state, LoadState::EagerLoaded);
        assert_eq!(cached.content.name.as_deref(), Some("full"));
        assert_eq!(cached.content.about.as_deref(), Some("bio"));
        assert_eq!(cached.content.picture.as_deref(), Some("pic"));
        assert_eq!(cached.created_at, 9);
    }

    #[test]
    fn test_merge_keeps_user() {
        let id = npub();
        let mut cached = Profile::unresolved(id.clone());
        cached.user = Some(LocalUser::new(id.clone()));

        let eager = Profile::cast(&record(&id, 1, r#"{"name":"a"}"#), LoadState::EagerLoaded).unwrap();
        cached.merge(eager);

        assert!(cached.user.is_some());
        assert_eq!(cached.content.name.as_deref(), Some("a"));
    }

    #[test]
    fn test_label_fallbacks() {
        let id = npub();
        let mut profile = Profile::unresolved(id.clone());
        assert_eq!(profile.label(), id.as_str());

        profile.content.name = Some("name".to_string());
        assert_eq!(profile.label(), "name");

        profile.content.display_name = Some("Display".to_string());
        assert_eq!(profile.label(), "Display");
    }

    #[test]
    fn test_account_debug_redacts_secret() {
        let account = Account {
            npub: npub(),
            encrypted_secret: "ncryptsec-v1:SENSITIVE".to_string(),
            profile: None,
        };
        let printed = format!("{:?}", account);
        assert!(!printed.contains("SENSITIVE"));
        assert!(printed.contains("<redacted>"));
    }
}
