//! Append-only message log.
//!
//! One JSON record per line in a single file. Every operation takes the
//! store's async mutex, so appends are linearized and a `stats` call sees
//! every append that completed before it.

use super::{LogStats, MessageRecord};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// File name of the JSON-array document older deployments wrote.
const LEGACY_DOCUMENT: &str = "messages.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed message log {} at line {line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl StorageError {
    fn io<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File-backed ordered sequence of [`MessageRecord`]s.
#[derive(Debug)]
pub struct MessageLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MessageLog {
    /// Open the log at `path`, creating parent directories.
    ///
    /// A missing file is an empty log. A torn trailing line left by an
    /// interrupted write is truncated away. When the file does not exist
    /// but a legacy `messages.json` array sits next to it, its records are
    /// imported.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(StorageError::io("create", parent))?;
        }

        if fs::try_exists(&path)
            .await
            .map_err(StorageError::io("stat", &path))?
        {
            repair_torn_tail(&path).await?;
        } else {
            import_legacy_document(&path).await?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    ///
    /// Either the whole line lands on disk or the file is left at its
    /// previous length.
    pub async fn append(&self, record: &MessageRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record).map_err(|e| StorageError::Malformed {
            path: self.path.clone(),
            line: 0,
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(StorageError::io("open", &self.path))?;

        let prior_len = file
            .metadata()
            .await
            .map_err(StorageError::io("stat", &self.path))?
            .len();

        if prior_len > 0 {
            file.seek(SeekFrom::Start(prior_len - 1))
                .await
                .map_err(StorageError::io("seek", &self.path))?;
            let last = file
                .read_u8()
                .await
                .map_err(StorageError::io("read", &self.path))?;
            if last != b'\n' {
                return Err(StorageError::Malformed {
                    path: self.path.clone(),
                    line: 0,
                    reason: "log does not end on a record boundary".into(),
                });
            }
        }

        let written = async {
            file.write_all(&line).await?;
            file.sync_data().await
        }
        .await;

        if let Err(source) = written {
            if let Err(e) = file.set_len(prior_len).await {
                tracing::error!(
                    path = %self.path.display(),
                    "Failed to roll back partial append: {e}"
                );
            }
            return Err(StorageError::Io {
                op: "append to",
                path: self.path.clone(),
                source,
            });
        }

        tracing::debug!(from = %record.from, to = %record.to, "Message appended");
        Ok(())
    }

    /// Count records and return the most recent one.
    pub async fn stats(&self) -> Result<LogStats, StorageError> {
        let _guard = self.lock.lock().await;
        let mut stats = LogStats::default();
        self.scan(|record| {
            stats.count += 1;
            stats.last = Some(record);
        })
        .await?;
        Ok(stats)
    }

    /// Every record, oldest first.
    #[cfg(test)]
    async fn records(&self) -> Result<Vec<MessageRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut records = Vec::new();
        self.scan(|record| records.push(record)).await?;
        Ok(records)
    }

    /// Full scan; caller holds the lock.
    async fn scan<F>(&self, mut visit: F) -> Result<(), StorageError>
    where
        F: FnMut(MessageRecord),
    {
        let file = match fs::File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io("open", &self.path)(e)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0;
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(StorageError::io("read", &self.path))?
        {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| StorageError::Malformed {
                path: self.path.clone(),
                line: line_no,
                reason: e.to_string(),
            })?;
            visit(record);
        }
        Ok(())
    }
}

/// Drop bytes after the last newline.
async fn repair_torn_tail(path: &Path) -> Result<(), StorageError> {
    let bytes = fs::read(path).await.map_err(StorageError::io("read", path))?;
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }

    let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() - keep,
        "Truncating torn trailing record in message log"
    );

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(StorageError::io("open", path))?;
    file.set_len(keep as u64)
        .await
        .map_err(StorageError::io("truncate", path))?;
    file.sync_data()
        .await
        .map_err(StorageError::io("sync", path))
}

/// Convert a sibling `messages.json` array into the line-oriented log.
///
/// Older writers stored request bodies unchecked, so fields may be missing,
/// null or non-string; those become `""` or their JSON text. Items that are
/// not objects are skipped. A document that is not a JSON array is left in
/// place and the log starts empty.
///
/// Written to a temp file and renamed, so a crash leaves either no log or
/// the complete import.
async fn import_legacy_document(path: &Path) -> Result<(), StorageError> {
    let legacy = path.with_file_name(LEGACY_DOCUMENT);
    if legacy == path {
        return Ok(());
    }

    let raw = match fs::read(&legacy).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StorageError::io("read", &legacy)(e)),
    };

    let items: Vec<serde_json::Value> = match serde_json::from_slice(&raw) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(
                legacy = %legacy.display(),
                "Legacy message document is not a JSON array, skipping import: {e}"
            );
            return Ok(());
        }
    };

    let mut out = Vec::new();
    let mut imported = 0usize;
    for (index, item) in items.iter().enumerate() {
        let Some(record) = legacy_record(item) else {
            tracing::warn!(
                legacy = %legacy.display(),
                index,
                "Skipping non-object legacy message"
            );
            continue;
        };
        let line = serde_json::to_vec(&record).map_err(|e| StorageError::Malformed {
            path: legacy.clone(),
            line: 0,
            reason: e.to_string(),
        })?;
        out.extend(line);
        out.push(b'\n');
        imported += 1;
    }

    let tmp = path.with_extension("jsonl.tmp");
    fs::write(&tmp, &out)
        .await
        .map_err(StorageError::io("write", &tmp))?;
    fs::rename(&tmp, path)
        .await
        .map_err(StorageError::io("rename", &tmp))?;

    tracing::info!(
        legacy = %legacy.display(),
        records = imported,
        skipped = items.len() - imported,
        "Imported legacy message document"
    );
    Ok(())
}

fn legacy_record(item: &serde_json::Value) -> Option<MessageRecord> {
    let fields = item.as_object()?;
    let field = |name: &str| match fields.get(name) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    Some(MessageRecord {
        from: field("from"),
        to: field("to"),
        message: field("message"),
    })
}
