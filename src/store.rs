use crate::error::Result;
use crate::migrate;
use crate::model::KillRecord;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Result of merging a batch of incoming records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub appended: usize,
    pub duplicates: usize,
}

/// Append-only, deduplicated killmail archive backed by one JSON file.
///
/// Records keep insertion order. A `killmail_id` already present is never
/// replaced or appended again, so merging the same batch twice is a no-op.
pub struct HistoryStore {
    path: PathBuf,
    records: Vec<KillRecord>,
    seen: HashSet<u64>,
}

impl HistoryStore {
    /// Load the archive at `path`.
    ///
    /// A missing file yields an empty store and is created as `[]` so the
    /// rest of the run can rely on it existing. Legacy records are migrated
    /// to the canonical schema here.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No existing history found at {}, starting empty", path.display());
            write_json_atomic(path, &Vec::<KillRecord>::new())?;
            return Ok(Self::in_memory(path, Vec::new()));
        }

        let json = fs::read_to_string(path)?;
        let raw: Vec<serde_json::Value> = serde_json::from_str(&json)?;

        let mut records = Vec::with_capacity(raw.len());
        let mut migrated = 0;
        for value in raw {
            let (record, was_legacy) = migrate::canonicalize(value)?;
            if was_legacy {
                migrated += 1;
            }
            records.push(record);
        }

        if migrated > 0 {
            log::info!("🔁 Migrated {} legacy records to the current schema", migrated);
        }

        let mut store = Self::in_memory(path, Vec::new());
        let outcome = store.merge(records);
        if outcome.duplicates > 0 {
            log::warn!(
                "⚠️  Archive {} held {} duplicate killmails, keeping first copies",
                path.display(),
                outcome.duplicates
            );
        }

        log::info!("📂 Loaded {} killmails from {}", store.len(), path.display());
        Ok(store)
    }

    /// A store that is not read from disk. `persist` still writes to `path`.
    pub fn in_memory(path: &Path, records: Vec<KillRecord>) -> Self {
        let mut store = Self {
            path: path.to_path_buf(),
            records: Vec::new(),
            seen: HashSet::new(),
        };
        store.merge(records);
        store
    }

    /// Append incoming records whose `killmail_id` is not yet present,
    /// preserving arrival order.
    pub fn merge<I>(&mut self, incoming: I) -> MergeOutcome
    where
        I: IntoIterator<Item = KillRecord>,
    {
        let mut outcome = MergeOutcome::default();

        for record in incoming {
            if self.seen.insert(record.killmail_id) {
                self.records.push(record);
                outcome.appended += 1;
            } else {
                outcome.duplicates += 1;
            }
        }

        outcome
    }

    /// Write the whole collection back, replacing the file atomically.
    pub fn persist(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.records)?;
        log::debug!("Saved {} killmails to {}", self.records.len(), self.path.display());
        Ok(())
    }

    pub fn records(&self) -> &[KillRecord] {
        &self.records
    }

    /// Mutable access for enrichment. Ids must not be changed through it.
    pub fn records_mut(&mut self) -> &mut [KillRecord] {
        &mut self.records
    }

    pub fn contains(&self, killmail_id: u64) -> bool {
        self.seen.contains(&killmail_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Serialize `value` to a sibling temp file and rename it over `path`.
///
/// Readers never observe a half-written file; a crash leaves the previous
/// version in place.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, value)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
