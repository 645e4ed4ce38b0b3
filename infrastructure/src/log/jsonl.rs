//! JSONL file log backend.
//!
//! Each topic is stored as `<topic>.jsonl` with one `{"sequence", "payload"}`
//! object per line, plus the creation memo in `<topic>.meta.json`. Records
//! are written to disk before they are published to subscribers. Opening an
//! existing directory reloads every topic found in it; a torn final line
//! left by an interrupted write is dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use tribunal_application::ports::log_backend::{LogBackend, LogError, LogRecord, RecordStream};
use tribunal_application::ports::memory_log::InMemoryLogBackend;
use tribunal_domain::{LogHandle, SequenceNumber};

const LOG_EXTENSION: &str = "jsonl";
const MEMO_SUFFIX: &str = ".meta.json";

#[derive(Serialize, Deserialize)]
struct Line {
    sequence: SequenceNumber,
    payload: serde_json::Value,
}

/// File-backed [`LogBackend`] that accepts JSON payloads.
pub struct JsonlLogBackend {
    dir: PathBuf,
    live: InMemoryLogBackend,
    writers: Mutex<HashMap<String, BufWriter<File>>>,
}

impl JsonlLogBackend {
    /// Opens (or creates) a log directory, reloading existing topics.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let backend = Self {
            dir,
            live: InMemoryLogBackend::new(),
            writers: Mutex::new(HashMap::new()),
        };
        let reloaded = backend.reload()?;
        if reloaded > 0 {
            info!(
                "Reloaded {} log topics from {}",
                reloaded,
                backend.dir.display()
            );
        }
        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{topic}.{LOG_EXTENSION}"))
    }

    fn memo_path(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{topic}{MEMO_SUFFIX}"))
    }

    fn reload(&self) -> Result<usize, LogError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let mut topics: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_suffix(MEMO_SUFFIX).map(str::to_string)
            })
            .collect();
        topics.sort();

        for topic in &topics {
            let memo_path = self.memo_path(topic);
            let memo = std::fs::read_to_string(&memo_path).map_err(|e| io_error(&memo_path, e))?;
            let handle = self.live.insert_topic(topic, &memo)?;

            let log_path = self.log_path(topic);
            if !log_path.exists() {
                continue;
            }
            let bytes = std::fs::read(&log_path).map_err(|e| io_error(&log_path, e))?;
            let mut offset = 0;
            for (index, raw) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
                let start = offset;
                offset += raw.len();
                let text = String::from_utf8_lossy(raw);
                if text.trim().is_empty() {
                    continue;
                }
                let line: Line = match serde_json::from_str(&text) {
                    Ok(line) => line,
                    Err(e) if !raw.ends_with(b"\n") => {
                        warn!(
                            "Dropping torn record at {}:{}: {}",
                            log_path.display(),
                            index + 1,
                            e
                        );
                        truncate(&log_path, start as u64)?;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                };
                let expected = self.live.next_sequence(&handle)?;
                if line.sequence != expected {
                    return Err(LogError::Backend(format!(
                        "{}:{}: expected sequence {}, found {}",
                        log_path.display(),
                        index + 1,
                        expected,
                        line.sequence
                    )));
                }
                self.live.push(&handle, serde_json::to_vec(&line.payload)?)?;
                if !raw.ends_with(b"\n") {
                    let mut file = OpenOptions::new()
                        .append(true)
                        .open(&log_path)
                        .map_err(|e| io_error(&log_path, e))?;
                    writeln!(file).map_err(|e| io_error(&log_path, e))?;
                }
            }
            debug!("Reloaded topic {}", topic);
        }
        Ok(topics.len())
    }

    fn check_name(name: &str) -> Result<(), LogError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(())
        } else {
            Err(LogError::Backend(format!("invalid topic name '{name}'")))
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> LogError {
    LogError::Backend(format!("{}: {}", path.display(), e))
}

fn truncate(path: &Path, len: u64) -> Result<(), LogError> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(len))
        .map_err(|e| io_error(path, e))
}

/// Cuts the file behind `writer` back to `len`, dropping whatever a failed
/// write left behind. Buffered bytes are discarded, not flushed.
fn discard_partial_write(writer: BufWriter<File>, len: u64) -> std::io::Result<()> {
    let (file, _unflushed) = writer.into_parts();
    file.set_len(len)
}

#[async_trait]
impl LogBackend for JsonlLogBackend {
    async fn create_topic(&self, name: &str, memo: &str) -> Result<LogHandle, LogError> {
        Self::check_name(name)?;
        let handle = self.live.insert_topic(name, memo)?;
        let memo_path = self.memo_path(name);
        std::fs::write(&memo_path, memo).map_err(|e| io_error(&memo_path, e))?;
        debug!("Created log topic {}", memo_path.display());
        Ok(handle)
    }

    async fn append(
        &self,
        topic: &LogHandle,
        payload: Vec<u8>,
    ) -> Result<SequenceNumber, LogError> {
        let value: serde_json::Value =
            serde_json::from_slice(&payload).map_err(|e| LogError::AppendRejected {
                topic: topic.topic().to_string(),
                reason: format!("payload is not JSON: {e}"),
            })?;

        // Writers lock serialises appends, so file order matches sequence order
        let mut writers = self
            .writers
            .lock()
            .map_err(|_| LogError::Backend("writer lock poisoned".to_string()))?;
        let sequence = self.live.next_sequence(topic)?;
        let path = self.log_path(topic.topic());

        let writer = match writers.entry(topic.topic().to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| io_error(&path, e))?;
                entry.insert(BufWriter::new(file))
            }
        };

        let line = serde_json::to_string(&Line {
            sequence,
            payload: value,
        })?;
        let len = writer
            .get_ref()
            .metadata()
            .map_err(|e| io_error(&path, e))?
            .len();
        if let Err(e) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
            if let Some(writer) = writers.remove(topic.topic())
                && let Err(truncate_error) = discard_partial_write(writer, len)
            {
                warn!(
                    "Could not roll back partial write to {}: {}",
                    path.display(),
                    truncate_error
                );
            }
            return Err(LogError::AppendRejected {
                topic: topic.topic().to_string(),
                reason: e.to_string(),
            });
        }

        self.live.push(topic, payload)
    }

    async fn subscribe(
        &self,
        topic: &LogHandle,
        since: Option<SequenceNumber>,
    ) -> Result<RecordStream, LogError> {
        self.live.subscribe(topic, since).await
    }

    async fn read(&self, topic: &LogHandle) -> Result<Vec<LogRecord>, LogError> {
        self.live.read(topic).await
    }

    async fn memo(&self, topic: &LogHandle) -> Result<String, LogError> {
        self.live.memo(topic).await
    }
}

impl Drop for JsonlLogBackend {
    fn drop(&mut self) {
        if let Ok(mut writers) = self.writers.lock() {
            for writer in writers.values_mut() {
                let _ = writer.flush();
            }
        }
    }
}
