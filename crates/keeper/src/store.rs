//! Per-venue snapshot history.

use std::fs;
use std::path::{Path, PathBuf};

use apy_math::{PriceE8, Snapshot, Wad};
use num_bigint::BigInt;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::StoreError;

/// Append-only ordered history of one venue's snapshots
pub trait SnapshotStore: Send {
    fn records(&self) -> &[Snapshot];

    fn last_record(&self) -> Option<&Snapshot> {
        self.records().last()
    }

    /// Rejects records that would break timestamp ordering or interval
    /// bookkeeping, leaving the store untouched
    fn append(&mut self, record: Snapshot) -> Result<(), StoreError>;
}

/// Check that `record` may follow `previous`
pub fn check_append(previous: Option<&Snapshot>, record: &Snapshot, index: usize) -> Result<(), StoreError> {
    let violation = |reason: String| StoreError::InvariantViolated { index, reason };

    match previous {
        None if record.interval != 0 => Err(violation(format!(
            "first record must have interval 0, got {}",
            record.interval
        ))),
        None => Ok(()),
        Some(prev) if record.timestamp < prev.timestamp => Err(violation(format!(
            "timestamp {} precedes previous {}",
            record.timestamp, prev.timestamp
        ))),
        Some(prev) if record.interval != record.timestamp - prev.timestamp => Err(violation(format!(
            "interval {} does not match timestamp delta {}",
            record.interval,
            record.timestamp - prev.timestamp
        ))),
        Some(_) => Ok(()),
    }
}

pub fn validate_history(records: &[Snapshot]) -> Result<(), StoreError> {
    for (index, record) in records.iter().enumerate() {
        let previous = index.checked_sub(1).map(|i| &records[i]);
        check_append(previous, record, index)?;
    }
    Ok(())
}

/// Record written by the earlier result logs: `time` and `interval` in
/// milliseconds, venue-specific reward keys, `apy` in percent
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
    pub balance: Wad,
    #[serde(alias = "compRewardBalance", alias = "aaveRewardBalance")]
    pub reward_balance: Wad,
    #[serde(alias = "compPrice", alias = "aavePrice")]
    pub reward_price: PriceE8,
    pub time: i64,
    pub profit: Wad,
    pub apy: Wad,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Current(Snapshot),
    Legacy(LegacyRecord),
}

/// Convert a history that may contain legacy records into snapshots.
///
/// Legacy timestamps are truncated to seconds and intervals are rebuilt from
/// the converted timestamps, so the first record always gets interval 0.
fn import_records(stored: Vec<StoredRecord>) -> (Vec<Snapshot>, usize) {
    let mut records: Vec<Snapshot> = Vec::with_capacity(stored.len());
    let mut imported = 0;

    for record in stored {
        let snapshot = match record {
            StoredRecord::Current(snapshot) => snapshot,
            StoredRecord::Legacy(legacy) => {
                imported += 1;
                let timestamp = legacy.time.div_euclid(1_000);
                let interval = records.last().map_or(0, |prev| timestamp - prev.timestamp);
                Snapshot {
                    balance: legacy.balance,
                    reward_balance: legacy.reward_balance,
                    reward_price: legacy.reward_price,
                    timestamp,
                    interval,
                    profit: legacy.profit,
                    apy: Wad::from_raw(legacy.apy.raw() / BigInt::from(100)),
                }
            }
        };
        records.push(snapshot);
    }

    (records, imported)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn records(&self) -> &[Snapshot] {
        &self.records
    }

    fn append(&mut self, record: Snapshot) -> Result<(), StoreError> {
        check_append(self.records.last(), &record, self.records.len())?;
        self.records.push(record);
        Ok(())
    }
}

/// History persisted as one JSON array per venue, rewritten on every append
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Vec<Snapshot>,
}

impl JsonFileStore {
    /// A missing file is an empty history. Legacy result logs are converted
    /// on load and written back in the current shape on the next append.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let stored: Vec<StoredRecord> = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let (records, imported) = import_records(stored);
        if imported > 0 {
            info!(path = %path.display(), imported, "converted legacy result records");
        }

        validate_history(&records)?;
        debug!(path = %path.display(), records = records.len(), "loaded snapshot history");
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &[Snapshot]) -> Result<(), StoreError> {
        let io_error = |e: std::io::Error| StoreError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        let content = serde_json::to_string_pretty(records).map_err(|e| StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)
    }
}

impl SnapshotStore for JsonFileStore {
    fn records(&self) -> &[Snapshot] {
        &self.records
    }

    fn append(&mut self, record: Snapshot) -> Result<(), StoreError> {
        check_append(self.records.last(), &record, self.records.len())?;

        let mut next = self.records.clone();
        next.push(record);
        self.persist(&next)?;
        self.records = next;
        Ok(())
    }
}
