//! Remote profile source contract and bundled sources
//!
//! A [`ProfileSource`] answers a batch of identifiers with raw metadata
//! records. It may be slow, may omit identifiers it knows nothing about, may
//! include records nobody asked for, and fails as a unit.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::identity::Npub;

/// Failure of a whole fetch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Source could not be reached
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Source answered with something that is not a record list
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Raw metadata record as delivered by a source
///
/// `content` is the JSON metadata object; its shape is not trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProfileRecord {
    /// Author public key, hex or npub
    pub pubkey: String,
    /// Unix timestamp of the record
    pub created_at: u64,
    #[serde(default)]
    pub content: String,
}

impl RawProfileRecord {
    pub fn new(pubkey: impl Into<String>, created_at: u64, content: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            created_at,
            content: content.into(),
        }
    }
}

/// Anything that can fetch profile records for a batch of identifiers
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch records for `npubs`, best-effort one per identifier
    async fn fetch_profiles(&self, npubs: &[Npub]) -> Result<Vec<RawProfileRecord>, SourceError>;
}

/// Source backed by a JSON file holding an array of records
///
/// The file is re-read on every fetch. Only records for requested
/// identifiers are returned; the newest record per identifier wins.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProfileSource for JsonFileSource {
    async fn fetch_profiles(&self, npubs: &[Npub]) -> Result<Vec<RawProfileRecord>, SourceError> {
        let data = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let records: Vec<RawProfileRecord> =
            serde_json::from_str(&data).map_err(|e| SourceError::Malformed(e.to_string()))?;

        let wanted: HashSet<&Npub> = npubs.iter().collect();
        let mut newest: HashMap<Npub, RawProfileRecord> = HashMap::new();
        for record in records {
            let Ok(npub) = Npub::parse(&record.pubkey) else {
                debug!(pubkey = %record.pubkey, "Skipping record with invalid pubkey");
                continue;
            };
            if !wanted.contains(&npub) {
                continue;
            }
            match newest.get(&npub) {
                Some(existing) if existing.created_at >= record.created_at => {}
                _ => {
                    newest.insert(npub, record);
                }
            }
        }

        debug!(
            requested = npubs.len(),
            found = newest.len(),
            path = %self.path.display(),
            "Read profiles from file"
        );
        Ok(npubs.iter().filter_map(|n| newest.remove(n)).collect())
    }
}

/// Ephemeral in-memory source that records every call
///
/// A stand-in for a network client in tests and embedding: it can return
/// incidental records alongside requested ones, fail on demand and add
/// latency. Records live only in process memory.
#[derive(Default)]
pub struct MemorySource {
    records: Mutex<HashMap<Npub, RawProfileRecord>>,
    incidental: Mutex<Vec<RawProfileRecord>>,
    calls: Mutex<Vec<Vec<Npub>>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `record` the answer for its identifier
    pub fn insert(&self, npub: Npub, record: RawProfileRecord) {
        self.records.lock().insert(npub, record);
    }

    /// Append `record` to every successful response
    pub fn add_incidental(&self, record: RawProfileRecord) {
        self.incidental.lock().push(record);
    }

    /// Fail every fetch started from now on (or stop failing)
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside every fetch
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Identifier batches of every fetch so far, in call order
    pub fn calls(&self) -> Vec<Vec<Npub>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// How many times `npub` has been requested in total
    pub fn times_requested(&self, npub: &Npub) -> usize {
        self.calls
            .lock()
            .iter()
            .flatten()
            .filter(|n| *n == npub)
            .count()
    }
}

#[async_trait]
impl ProfileSource for MemorySource {
    async fn fetch_profiles(&self, npubs: &[Npub]) -> Result<Vec<RawProfileRecord>, SourceError> {
        self.calls.lock().push(npubs.to_vec());

        // Outcome is decided when the call starts, not when it returns.
        let fail = self.fail.load(Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if fail {
            return Err(SourceError::Unavailable("memory source set to fail".to_string()));
        }

        let mut out: Vec<RawProfileRecord> = {
            let records = self.records.lock();
            npubs.iter().filter_map(|n| records.get(n).cloned()).collect()
        };
        out.extend(self.incidental.lock().iter().cloned());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::Keys;
    use tempfile::tempdir;

    fn npub() -> Npub {
        Npub::from_public_key(&Keys::generate().public_key()).unwrap()
    }

    #[tokio::test]
    async fn test_file_source_filters_and_picks_newest() {
        let a = npub();
        let b = npub();
        let c = npub();
        let hex_a = a.public_key().unwrap().to_hex();

        let records = vec![
            RawProfileRecord::new(hex_a.clone(), 1, r#"{"name":"old"}"#),
            RawProfileRecord::new(hex_a, 2, r#"{"name":"new"}"#),
            RawProfileRecord::new(b.as_str(), 1, r#"{"name":"b"}"#),
            RawProfileRecord::new("garbage", 1, "{}"),
            RawProfileRecord::new(c.as_str(), 1, r#"{"name":"c"}"#),
        ];

        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let source = JsonFileSource::new(&path);
        let fetched = source.fetch_profiles(&[b.clone(), a.clone()]).await.unwrap();

        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].content, r#"{"name":"b"}"#);
        assert_eq!(fetched[1].content, r#"{"name":"new"}"#);
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let dir = tempdir().unwrap();
        let source = JsonFileSource::new(dir.path().join("absent.json"));

        let err = source.fetch_profiles(&[npub()]).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_file_source_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "{\"not\":\"a list\"}").unwrap();

        let err = JsonFileSource::new(&path)
            .fetch_profiles(&[npub()])
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_memory_source_records_calls() {
        let a = npub();
        let source = MemorySource::new();
        source.insert(a.clone(), RawProfileRecord::new(a.as_str(), 1, "{}"));

        let first = source.fetch_profiles(&[a.clone()]).await.unwrap();
        assert_eq!(first.len(), 1);

        source.set_fail(true);
        assert!(source.fetch_profiles(&[a.clone()]).await.is_err());

        assert_eq!(source.call_count(), 2);
        assert_eq!(source.times_requested(&a), 2);
    }
}
