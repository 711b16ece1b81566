// 💾 Store - Persisted tables and swappable snapshots
//
// Files are pretty-printed JSON. The demographic table keeps its nested
// age-band × gender mapping; the campaign summary file is only a cache of
// what the ledgers produce.
//
// Long-lived holders keep snapshots behind SnapshotStore: readers clone an
// Arc, a rebuild swaps the whole value. No cell is ever mutated in place.

use crate::demographics::{CellValue, DemographicTable};
use crate::error::{Error, Result};
use crate::ledger::{CampaignSnapshot, InvestmentLedger, LedgerMerger, RebuildStats, VotesLedger};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

// ============================================================================
// JSON FILES
// ============================================================================

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::MissingSource(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn save_demographics<V: CellValue>(path: &Path, table: &DemographicTable<V>) -> Result<()> {
    write_json(path, table)?;
    info!(path = %path.display(), cities = table.len(), "demographic table saved");
    Ok(())
}

pub fn load_demographics<V: CellValue>(path: &Path) -> Result<DemographicTable<V>> {
    read_json(path)
}

pub fn save_campaign_cache(path: &Path, snapshot: &CampaignSnapshot) -> Result<()> {
    write_json(path, snapshot)
}

// ============================================================================
// SNAPSHOT STORE
// ============================================================================

/// Read-mostly holder for an immutable snapshot
#[derive(Debug)]
pub struct SnapshotStore<T> {
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotStore<T> {
    pub fn new(initial: T) -> Self {
        SnapshotStore {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The snapshot as of now. Later swaps do not affect the returned Arc.
    pub fn current(&self) -> Arc<T> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swap in a fully built snapshot, returning the previous one
    pub fn replace(&self, next: T) -> Arc<T> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(next))
    }
}

impl<T: Default> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// ============================================================================
// CAMPAIGN STATE
// ============================================================================

/// Result of a successful rebuild. The new snapshot is live even when
/// writing the cache failed.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub stats: RebuildStats,
    pub cache_error: Option<Error>,
}

/// Ledger file locations plus the live campaign snapshot.
/// `refresh` is the only way the snapshot changes.
#[derive(Debug)]
pub struct CampaignState {
    votes_path: PathBuf,
    investments_path: PathBuf,
    cache_path: Option<PathBuf>,
    snapshot: SnapshotStore<CampaignSnapshot>,
}

impl CampaignState {
    pub fn new(votes_path: impl Into<PathBuf>, investments_path: impl Into<PathBuf>) -> Self {
        CampaignState {
            votes_path: votes_path.into(),
            investments_path: investments_path.into(),
            cache_path: None,
            snapshot: SnapshotStore::default(),
        }
    }

    /// Also write the summary cache after each refresh
    pub fn with_cache(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(cache_path.into());
        self
    }

    /// Reload both ledgers and rebuild. On a structural ledger error the
    /// previous snapshot stays in place and the error is returned.
    /// The cache is written after the swap; its failure is reported in the outcome.
    pub fn refresh(&self) -> Result<RefreshOutcome> {
        let votes = VotesLedger::load(&self.votes_path)?;
        let investments = InvestmentLedger::load(&self.investments_path)?;

        let (snapshot, stats) = LedgerMerger::new().rebuild_with_stats(&votes, &investments);
        self.snapshot.replace(snapshot);

        let cache_error = match &self.cache_path {
            Some(cache) => save_campaign_cache(cache, &self.snapshot.current()).err(),
            None => None,
        };
        if let (Some(cache), Some(e)) = (&self.cache_path, &cache_error) {
            warn!(path = %cache.display(), error = %e, "campaign summary cache not written");
        }

        Ok(RefreshOutcome { stats, cache_error })
    }

    pub fn snapshot(&self) -> Arc<CampaignSnapshot> {
        self.snapshot.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_store_swaps_whole_value() {
        let store = SnapshotStore::new(vec![1, 2, 3]);
        let before = store.current();

        let previous = store.replace(vec![9]);

        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*previous, vec![1, 2, 3]);
        assert_eq!(*store.current(), vec![9]);
    }

    #[test]
    fn test_snapshot_store_concurrent_readers() {
        let store = Arc::new(SnapshotStore::new(0u64));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let value = *store.current();
                        assert!(value <= 50);
                    }
                })
            })
            .collect();

        for i in 1..=50 {
            store.replace(i);
        }
        for r in readers {
            r.join().unwrap();
        }

        assert_eq!(*store.current(), 50);
    }

    #[test]
    fn test_cache_failure_keeps_rebuilt_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let votes_path = dir.path().join("votos_data.json");
        fs::write(&votes_path, r#"{"toledo": [{"year": 2022, "votes": 7}]}"#).unwrap();

        // A directory cannot be written as a file
        let state = CampaignState::new(&votes_path, dir.path().join("investments_data.json"))
            .with_cache(dir.path());
        let outcome = state.refresh().unwrap();

        assert!(outcome.cache_error.is_some());
        assert_eq!(outcome.stats.cities, 1);
        assert_eq!(state.snapshot().len(), 1);
    }

    #[test]
    fn test_read_json_missing_file() {
        let result: Result<CampaignSnapshot> = read_json(Path::new("/nonexistent/campaign.json"));
        assert!(matches!(result, Err(Error::MissingSource(_))));
    }
}
