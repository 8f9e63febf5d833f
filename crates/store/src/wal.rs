//! Single-file WAL writer/reader with durability-mode-aware fsync behavior.

use crate::format::{RecordError, WalRecord, WAL_HEADER_SIZE};
use stackmemory_core::config::DurabilityMode;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Appends transactions to the WAL file, fsyncing according to the
/// configured `DurabilityMode`.
pub struct WalWriter {
    file: Option<File>,
    path: PathBuf,
    durability: DurabilityMode,
    next_seq: u64,
    writes_since_sync: usize,
    last_sync: Instant,
    batch_interval_ms: u64,
    batch_size: usize,
}

impl WalWriter {
    /// Open (creating if absent) the WAL file at `path`, resuming `next_seq`
    /// from the caller's last-known sequence number (from recovery).
    pub fn open(
        path: PathBuf,
        durability: DurabilityMode,
        batch_interval_ms: u64,
        batch_size: usize,
        resume_seq: u64,
    ) -> std::io::Result<Self> {
        if durability == DurabilityMode::InMemory {
            return Ok(WalWriter {
                file: None,
                path,
                durability,
                next_seq: resume_seq,
                writes_since_sync: 0,
                last_sync: Instant::now(),
                batch_interval_ms,
                batch_size,
            });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        if is_new {
            file.write_all(&WalRecord::encode_header())?;
            file.sync_all()?;
        }

        Ok(WalWriter {
            file: Some(file),
            path,
            durability,
            next_seq: resume_seq,
            writes_since_sync: 0,
            last_sync: Instant::now(),
            batch_interval_ms,
            batch_size,
        })
    }

    /// Append a transaction payload, returning its assigned sequence number.
    pub fn append(&mut self, timestamp: i64, payload: &[u8]) -> std::io::Result<u64> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let Some(file) = self.file.as_mut() else {
            return Ok(seq);
        };

        let record = WalRecord {
            seq,
            timestamp,
            payload: payload.to_vec(),
        };
        file.write_all(&record.to_bytes())?;
        self.writes_since_sync += 1;
        self.maybe_sync()?;
        Ok(seq)
    }

    fn maybe_sync(&mut self) -> std::io::Result<()> {
        let should_sync = match self.durability {
            DurabilityMode::InMemory => false,
            DurabilityMode::Strict => true,
            DurabilityMode::Batched => {
                self.writes_since_sync >= self.batch_size
                    || self.last_sync.elapsed().as_millis() as u64 >= self.batch_interval_ms
            }
            DurabilityMode::Async => false,
        };
        if should_sync {
            self.flush()?;
        }
        Ok(())
    }

    /// Force an fsync regardless of durability mode or batching state.
    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.sync_all()?;
        }
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Truncate the WAL back to just its header, after a successful
    /// checkpoint has made the entries durable in the main database file.
    pub fn truncate_after_checkpoint(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.set_len(WAL_HEADER_SIZE as u64)?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Next sequence number that will be assigned.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Path of the underlying WAL file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One successfully replayed WAL entry.
pub struct WalEntry {
    /// Assigned sequence number.
    pub seq: u64,
    /// Commit timestamp, unix milliseconds.
    pub timestamp: i64,
    /// Raw bincode-encoded payload.
    pub payload: Vec<u8>,
}

/// Result of replaying a WAL file at startup.
pub struct WalReadResult {
    /// Entries read successfully, in order.
    pub entries: Vec<WalEntry>,
    /// Highest sequence number seen, for resuming the writer.
    pub max_seq: u64,
    /// Whether the tail of the file was truncated (a partial or corrupt
    /// record was found and the rest of the file was discarded).
    pub truncated: bool,
}

/// Reads and replays a WAL file, tolerating a torn write at the tail.
pub struct WalReader;

impl WalReader {
    /// Replay every record in `path`. Returns an empty, non-truncated
    /// result if the file doesn't exist yet.
    pub fn read_all(path: &Path) -> std::io::Result<WalReadResult> {
        if !path.exists() {
            return Ok(WalReadResult {
                entries: Vec::new(),
                max_seq: 0,
                truncated: false,
            });
        }

        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        if buf.len() < WAL_HEADER_SIZE || !WalRecord::is_valid_header(&buf) {
            tracing::warn!(path = %path.display(), "WAL header missing or invalid; treating as empty");
            return Ok(WalReadResult {
                entries: Vec::new(),
                max_seq: 0,
                truncated: true,
            });
        }

        let mut offset = WAL_HEADER_SIZE;
        let mut entries = Vec::new();
        let mut max_seq = 0;
        let mut truncated = false;

        while offset < buf.len() {
            match WalRecord::from_bytes(&buf[offset..]) {
                Ok((record, consumed)) => {
                    max_seq = max_seq.max(record.seq);
                    entries.push(WalEntry {
                        seq: record.seq,
                        timestamp: record.timestamp,
                        payload: record.payload,
                    });
                    offset += consumed;
                }
                Err(RecordError::Truncated) => {
                    tracing::warn!(
                        path = %path.display(),
                        offset,
                        "WAL ends with a partial record; discarding tail"
                    );
                    truncated = true;
                    break;
                }
                Err(RecordError::ChecksumMismatch { .. }) => {
                    tracing::warn!(
                        path = %path.display(),
                        offset,
                        "WAL record failed checksum; discarding remainder of file"
                    );
                    truncated = true;
                    break;
                }
            }
        }

        if truncated {
            // Repair in place so the next writer append starts clean.
            let mut file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset as u64)?;
            file.seek(SeekFrom::Start(offset as u64))?;
        }

        Ok(WalReadResult {
            entries,
            max_seq,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_replay_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.wal");

        let mut writer =
            WalWriter::open(path.clone(), DurabilityMode::Strict, 100, 1000, 0).unwrap();
        writer.append(1, &[1, 2, 3]).unwrap();
        writer.append(2, &[4, 5]).unwrap();
        writer.flush().unwrap();

        let result = WalReader::read_all(&path).unwrap();
        assert!(!result.truncated);
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].payload, vec![1, 2, 3]);
        assert_eq!(result.max_seq, 1);
    }

    #[test]
    fn in_memory_mode_writes_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.wal");
        let mut writer =
            WalWriter::open(path.clone(), DurabilityMode::InMemory, 100, 1000, 0).unwrap();
        writer.append(1, &[1]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn torn_tail_is_dropped_and_file_repaired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.wal");

        {
            let mut writer =
                WalWriter::open(path.clone(), DurabilityMode::Strict, 100, 1000, 0).unwrap();
            writer.append(1, &[1, 2, 3]).unwrap();
            writer.flush().unwrap();
        }

        // Append a torn record by hand.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[9, 9, 9, 9, 9]).unwrap();
        file.sync_all().unwrap();

        let result = WalReader::read_all(&path).unwrap();
        assert!(result.truncated);
        assert_eq!(result.entries.len(), 1);

        // The file should now be clean for further appends.
        let result2 = WalReader::read_all(&path).unwrap();
        assert!(!result2.truncated);
        assert_eq!(result2.entries.len(), 1);
    }

    #[test]
    fn resume_seq_continues_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.wal");
        {
            let mut writer =
                WalWriter::open(path.clone(), DurabilityMode::Strict, 100, 1000, 0).unwrap();
            writer.append(1, &[1]).unwrap();
            writer.append(2, &[2]).unwrap();
            writer.flush().unwrap();
        }
        let replay = WalReader::read_all(&path).unwrap();
        let mut writer =
            WalWriter::open(path.clone(), DurabilityMode::Strict, 100, 1000, replay.max_seq + 1)
                .unwrap();
        let seq = writer.append(3, &[3]).unwrap();
        assert_eq!(seq, 2);
    }
}
