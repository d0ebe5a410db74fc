//! Append-only line-delimited record log written during a crawl.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::models::DocumentRecord;
use crate::scrapers::RecordSink;

/// Errors writing the StreamLog.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("stream log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("stream log {0} left by an interrupted run; recover it or discard it first")]
    StaleStreamLog(PathBuf),
}

impl SinkError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What to do with a StreamLog that already exists when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    #[default]
    Refuse,
    Discard,
}

/// Writes one JSON record per line, flushing after every line so a crash
/// loses at most the record in flight.
pub struct StreamLogWriter {
    path: PathBuf,
    file: Option<File>,
    lines: usize,
}

impl StreamLogWriter {
    /// Create the StreamLog at `path`.
    ///
    /// Under [`StalePolicy::Refuse`] the file is created exclusively, so of
    /// two runs racing for the same store only one gets the log.
    pub async fn create(path: &Path, stale: StalePolicy) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::io(path, e))?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        match stale {
            StalePolicy::Refuse => {
                options.create_new(true);
            }
            StalePolicy::Discard => {
                if fs::try_exists(path).await.unwrap_or(false) {
                    warn!("Discarding stale stream log {}", path.display());
                }
                options.create(true).truncate(true);
            }
        }

        let file = match options.open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SinkError::StaleStreamLog(path.to_path_buf()))
            }
            Err(e) => return Err(SinkError::io(path, e)),
        };
        debug!("Opened stream log {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Append one record and flush it.
    pub async fn write(&mut self, record: &DocumentRecord) -> Result<(), SinkError> {
        let line = record.to_line()?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SinkError::io(&self.path, io::Error::other("stream log closed")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SinkError::io(&self.path, e))?;
        file.flush().await.map_err(|e| SinkError::io(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    /// Sync and close the log. Safe to call more than once.
    pub async fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| SinkError::io(&self.path, e))?;
            file.sync_all()
                .await
                .map_err(|e| SinkError::io(&self.path, e))?;
        }
        Ok(())
    }

    /// Remove a StreamLog from disk. A missing file is not an error.
    pub async fn discard(path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RecordSink for StreamLogWriter {
    async fn accept(&mut self, record: DocumentRecord) -> Result<(), SinkError> {
        self.write(&record).await
    }
}

/// Records recovered from a StreamLog.
#[derive(Debug, Default)]
pub struct StreamLogContents {
    pub records: Vec<DocumentRecord>,
    /// Non-blank lines that could not be decoded.
    pub malformed: usize,
}

/// Read every well-formed record from a StreamLog, in file order.
///
/// Undecodable lines (including invalid UTF-8 and a torn final line) are
/// counted and skipped. A missing file reads as empty.
pub fn read_stream_log(path: &Path) -> io::Result<StreamLogContents> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StreamLogContents::default()),
        Err(e) => return Err(e),
    };

    let mut contents = StreamLogContents::default();
    for (idx, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_no = idx + 1;
        let Ok(line) = std::str::from_utf8(raw) else {
            warn!("Skipping stream line {} with invalid UTF-8", line_no);
            contents.malformed += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match DocumentRecord::from_line(line, line_no) {
            Some(record) => contents.records.push(record),
            None => contents.malformed += 1,
        }
    }
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(url: &str) -> DocumentRecord {
        DocumentRecord::new(url, format!("Başlık {}", url), "metin", None)
    }

    #[tokio::test]
    async fn test_write_then_read_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json.tmp.jsonl");

        let mut writer = StreamLogWriter::create(&path, StalePolicy::Refuse).await.unwrap();
        writer.write(&record("a")).await.unwrap();
        writer.accept(record("b")).await.unwrap();
        assert_eq!(writer.lines(), 2);
        writer.finish().await.unwrap();
        writer.finish().await.unwrap();

        let contents = read_stream_log(&path).unwrap();
        let urls: Vec<_> = contents.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b"]);
        assert_eq!(contents.malformed, 0);
    }

    #[tokio::test]
    async fn test_refuses_stale_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json.tmp.jsonl");
        std::fs::write(&path, "{}\n").unwrap();

        let err = StreamLogWriter::create(&path, StalePolicy::Refuse)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SinkError::StaleStreamLog(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_refuse_creates_one_owner() {
        let dir = tempdir().unwrap();

        for attempt in 0..20 {
            let path = dir.path().join(format!("run{}.json.tmp.jsonl", attempt));
            let (a, b) = tokio::join!(
                StreamLogWriter::create(&path, StalePolicy::Refuse),
                StreamLogWriter::create(&path, StalePolicy::Refuse),
            );

            let owners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
            assert_eq!(owners, 1);
            let loser = a.err().or(b.err()).unwrap();
            assert!(matches!(loser, SinkError::StaleStreamLog(_)));
        }
    }

    #[tokio::test]
    async fn test_discard_policy_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json.tmp.jsonl");
        std::fs::write(&path, "old line\n").unwrap();

        let mut writer = StreamLogWriter::create(&path, StalePolicy::Discard).await.unwrap();
        writer.finish().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_creates_missing_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.json.tmp.jsonl");
        let mut writer = StreamLogWriter::create(&path, StalePolicy::Refuse).await.unwrap();
        writer.write(&record("a")).await.unwrap();
        writer.finish().await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_read_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut bytes = record("a").to_line().unwrap().into_bytes();
        bytes.extend_from_slice(b"not json\n");
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"\n");
        bytes.extend_from_slice(record("b").to_line().unwrap().as_bytes());
        bytes.extend_from_slice(br#"{"url":"c","kanun_adi":"#);
        std::fs::write(&path, bytes).unwrap();

        let contents = read_stream_log(&path).unwrap();
        let urls: Vec<_> = contents.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b"]);
        assert_eq!(contents.malformed, 3);
    }

    #[test]
    fn test_read_missing_is_empty() {
        let dir = tempdir().unwrap();
        let contents = read_stream_log(&dir.path().join("absent.jsonl")).unwrap();
        assert!(contents.records.is_empty());
        assert_eq!(contents.malformed, 0);
    }

    #[tokio::test]
    async fn test_discard_missing_is_ok() {
        let dir = tempdir().unwrap();
        StreamLogWriter::discard(&dir.path().join("absent.jsonl"))
            .await
            .unwrap();
    }
}
