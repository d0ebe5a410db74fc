//! Folds a finished StreamLog into the JSON-array store.

use std::collections::{HashMap, HashSet};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::stream_log::{read_stream_log, StreamLogWriter};
use crate::models::{DedupPolicy, MergeMode};

/// Errors merging a StreamLog into its store.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot read stream log {path}: {source}")]
    ReadStream {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read existing store {path}: {source}")]
    ReadStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write store {path}: {source}")]
    WriteStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("merge task failed: {0}")]
    Task(String),
}

/// What a merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Entries in the store after the merge.
    pub store_records: usize,
    /// Records taken from the StreamLog.
    pub appended: usize,
    pub malformed_lines: usize,
    pub duplicates_skipped: usize,
    /// False when the store was written but the StreamLog could not be removed.
    pub stream_log_removed: bool,
}

type LockRegistry = HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>;

/// Merges StreamLogs into stores, one merge per store path at a time.
///
/// Clones share the lock registry.
#[derive(Debug, Clone, Default)]
pub struct MergeReconciler {
    locks: Arc<Mutex<LockRegistry>>,
}

impl MergeReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(key.to_path_buf()).or_default().clone()
    }

    /// Drop the registry entry once no other merge holds or awaits it.
    fn release(&self, key: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Merge the StreamLog at `stream` into the store at `store`.
    ///
    /// The store is replaced atomically; on any error it is left as it was
    /// and the StreamLog is kept for a later retry. The StreamLog is removed
    /// only after the store has been written.
    pub async fn merge(
        &self,
        store: &Path,
        stream: &Path,
        mode: MergeMode,
        dedup: DedupPolicy,
    ) -> Result<MergeSummary, MergeError> {
        let key = lock_key(store);
        let lock = self.lock_for(&key);
        let result = {
            let _guard = lock.lock().await;
            merge_locked(store, stream, mode, dedup).await
        };
        self.release(&key, lock);
        result
    }
}

async fn merge_locked(
    store: &Path,
    stream: &Path,
    mode: MergeMode,
    dedup: DedupPolicy,
) -> Result<MergeSummary, MergeError> {
    let store_path = store.to_path_buf();
    let stream_path = stream.to_path_buf();
    let mut summary = tokio::task::spawn_blocking(move || {
        merge_blocking(&store_path, &stream_path, mode, dedup)
    })
    .await
    .map_err(|e| MergeError::Task(e.to_string()))??;

    summary.stream_log_removed = match StreamLogWriter::discard(stream).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "Store written but stream log {} could not be removed: {}",
                stream.display(),
                e
            );
            false
        }
    };

    info!(
        "Merged {} records into {} ({} total, {} malformed, {} duplicates)",
        summary.appended,
        store.display(),
        summary.store_records,
        summary.malformed_lines,
        summary.duplicates_skipped
    );
    Ok(summary)
}

/// Registry key for a store: its canonical parent directory joined with the
/// file name, so different spellings of one path share a lock.
fn lock_key(store: &Path) -> PathBuf {
    let path = if store.is_absolute() {
        store.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(store),
            Err(_) => store.to_path_buf(),
        }
    };
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(dir) => dir.join(name),
            Err(_) => path,
        },
        _ => path,
    }
}

fn merge_blocking(
    store: &Path,
    stream: &Path,
    mode: MergeMode,
    dedup: DedupPolicy,
) -> Result<MergeSummary, MergeError> {
    let contents = read_stream_log(stream).map_err(|source| MergeError::ReadStream {
        path: stream.to_path_buf(),
        source,
    })?;

    let mut items = match mode {
        MergeMode::Replace => Vec::new(),
        MergeMode::Append => load_store(store)?,
    };

    let mut seen: HashSet<String> = HashSet::new();
    let dedup_urls = mode == MergeMode::Append && dedup == DedupPolicy::Url;
    if dedup_urls {
        seen.extend(items.iter().filter_map(url_of).map(str::to_string));
    }

    let mut summary = MergeSummary {
        malformed_lines: contents.malformed,
        ..MergeSummary::default()
    };
    for record in contents.records {
        if dedup_urls && !seen.insert(record.url.clone()) {
            debug!("Skipping duplicate {}", record.url);
            summary.duplicates_skipped += 1;
            continue;
        }
        items.push(serde_json::to_value(&record)?);
        summary.appended += 1;
    }

    write_store(store, &items)?;
    summary.store_records = items.len();
    Ok(summary)
}

fn url_of(item: &Value) -> Option<&str> {
    item.get("url").and_then(Value::as_str)
}

/// Load the store's entries. A missing, empty, corrupt, or non-list store
/// reads as empty; any other read failure is an error so the store is never
/// overwritten blind.
fn load_store(store: &Path) -> Result<Vec<Value>, MergeError> {
    let bytes = match std::fs::read(store) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(MergeError::ReadStore {
                path: store.to_path_buf(),
                source,
            })
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => {
            warn!("Store {} is not a JSON list, starting fresh", store.display());
            Ok(Vec::new())
        }
        Err(e) => {
            warn!("Store {} is not valid JSON ({}), starting fresh", store.display(), e);
            Ok(Vec::new())
        }
    }
}

/// Write `items` to a sibling temp file, sync it, and rename it over `store`.
fn write_store(store: &Path, items: &[Value]) -> Result<(), MergeError> {
    let write_err = |source: io::Error| MergeError::WriteStore {
        path: store.to_path_buf(),
        source,
    };

    let parent = store
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(write_err)?;

    // An existing store keeps its mode; a new one gets the umask default.
    let existing = std::fs::metadata(store)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.permissions());
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(parent).map_err(write_err)?;
    if let Some(permissions) = existing {
        tmp.as_file().set_permissions(permissions).map_err(write_err)?;
    }
    {
        let mut writer = BufWriter::new(&mut tmp);
        serde_json::to_writer_pretty(&mut writer, items)?;
        writer.flush().map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(store).map_err(|e| write_err(e.error))?;
    Ok(())
}
