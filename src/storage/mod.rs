//! On-disk output: the append-only StreamLog and the JSON-array store it is
//! merged into.

mod merge;
mod stream_log;

pub use merge::{MergeError, MergeReconciler, MergeSummary};
pub use stream_log::{read_stream_log, SinkError, StalePolicy, StreamLogContents, StreamLogWriter};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

const STORE_EXTENSION: &str = "json";
const STREAM_LOG_SUFFIX: &str = ".tmp.jsonl";

/// Force a `.json` extension onto a store destination.
///
/// `mevzuat` becomes `mevzuat.json`, `out.txt` becomes `out.json`.
pub fn normalize_store_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.extension() {
        Some(ext) if ext == STORE_EXTENSION => path.to_path_buf(),
        _ => path.with_extension(STORE_EXTENSION),
    }
}

/// StreamLog path for a store: `<store>.tmp.jsonl`.
pub fn stream_log_path(store: &Path) -> PathBuf {
    let mut name = OsString::from(store.as_os_str());
    name.push(STREAM_LOG_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_store_path_keeps_json() {
        assert_eq!(
            normalize_store_path("out/laws.json"),
            PathBuf::from("out/laws.json")
        );
    }

    #[test]
    fn test_normalize_store_path_adds_extension() {
        assert_eq!(normalize_store_path("mevzuat"), PathBuf::from("mevzuat.json"));
    }

    #[test]
    fn test_normalize_store_path_replaces_extension() {
        assert_eq!(normalize_store_path("data/out.txt"), PathBuf::from("data/out.json"));
    }

    #[test]
    fn test_stream_log_path() {
        assert_eq!(
            stream_log_path(Path::new("data/mevzuat.json")),
            PathBuf::from("data/mevzuat.json.tmp.jsonl")
        );
    }
}
