//! Append-only, page-buffered, rotated, CRC32-protected WAL writer.
//!
//! A single rotated log: fixed-size pages, rotation at a configured file
//! size, and a total-size cap that triggers refusal rather than silent
//! unbounded growth.

use crate::error::{Error, Result};
use crate::wal::record::{Lsn, WalRecord};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_ROTATE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct WalConfig {
    pub page_size: usize,
    pub rotate_size: u64,
    /// Total bytes across all WAL files beyond which writes are refused.
    pub max_total_size: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            rotate_size: DEFAULT_ROTATE_SIZE,
            max_total_size: 64 * DEFAULT_ROTATE_SIZE,
        }
    }
}

struct OpenFile {
    file: BufWriter<File>,
    seq: u64,
    bytes_in_file: u64,
    bytes_in_page: usize,
}

pub struct WalWriter {
    dir: PathBuf,
    config: WalConfig,
    next_lsn: AtomicU64,
    total_bytes: AtomicU64,
    current: Mutex<OpenFile>,
}

fn file_name(seq: u64) -> String {
    format!("wal-{seq:010}.log")
}

impl WalWriter {
    /// Create a fresh WAL directory (or open it if empty) starting a new
    /// sequence-1 file.
    pub fn create(dir: impl AsRef<Path>, config: WalConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let seq = 1;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(file_name(seq)))?;
        Ok(Self {
            dir,
            config,
            next_lsn: AtomicU64::new(1),
            total_bytes: AtomicU64::new(0),
            current: Mutex::new(OpenFile {
                file: BufWriter::new(file),
                seq,
                bytes_in_file: 0,
                bytes_in_page: 0,
            }),
        })
    }

    /// Resume an existing WAL directory: appends continue in the
    /// highest-numbered existing file, LSNs continue from `next_lsn`.
    pub fn resume(dir: impl AsRef<Path>, config: WalConfig, next_lsn: Lsn) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let mut seqs: Vec<u64> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix("wal-"))
                    .and_then(|n| n.strip_suffix(".log"))
                    .and_then(|n| n.parse::<u64>().ok())
            })
            .collect();
        seqs.sort_unstable();
        let seq = seqs.last().copied().unwrap_or(1);
        let path = dir.join(file_name(seq));
        let bytes_in_file = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let total_bytes = seqs
            .iter()
            .map(|s| fs::metadata(dir.join(file_name(*s))).map(|m| m.len()).unwrap_or(0))
            .sum();
        Ok(Self {
            dir,
            config,
            next_lsn: AtomicU64::new(next_lsn.max(1)),
            total_bytes: AtomicU64::new(total_bytes),
            current: Mutex::new(OpenFile {
                file: BufWriter::new(file),
                seq,
                bytes_in_file,
                bytes_in_page: 0,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize, frame (`len | crc32 | payload`), and append `record`.
    /// Flushes the page buffer to the OS when it fills or rotation occurs,
    /// but does not fsync — callers decide durability boundaries (see
    /// `flush_through`).
    pub fn append(&self, record: &WalRecord) -> Result<Lsn> {
        let payload = bincode::serialize(record)?;
        let crc = crc32fast::hash(&payload);
        let mut frame = Vec::with_capacity(payload.len() + 8);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        if self.total_bytes.load(Ordering::Relaxed) + frame.len() as u64 > self.config.max_total_size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "WAL total size cap exceeded",
            )));
        }

        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock();

        if current.bytes_in_file > 0 && current.bytes_in_file + frame.len() as u64 > self.config.rotate_size {
            current.file.flush()?;
            let new_seq = current.seq + 1;
            let new_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(file_name(new_seq)))?;
            current.file = BufWriter::new(new_file);
            current.seq = new_seq;
            current.bytes_in_file = 0;
            current.bytes_in_page = 0;
            tracing::info!(seq = new_seq, "WAL rotated");
        }

        current.file.write_all(&frame)?;
        current.bytes_in_file += frame.len() as u64;
        current.bytes_in_page += frame.len();
        self.total_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);

        if current.bytes_in_page >= self.config.page_size {
            current.file.flush()?;
            current.bytes_in_page = 0;
        }

        Ok(lsn)
    }

    /// Flush the page buffer and fsync the current file. Called at commit
    /// boundaries: a write's WAL record must be durable before its
    /// transaction's COMMIT record is considered durable, which this
    /// crate realizes by fsyncing once per commit.
    pub fn flush_through(&self, _lsn: Lsn) -> Result<()> {
        let mut current = self.current.lock();
        current.file.flush()?;
        current.file.get_ref().sync_data()?;
        current.bytes_in_page = 0;
        Ok(())
    }

    pub fn current_lsn(&self) -> Lsn {
        self.next_lsn.load(Ordering::SeqCst)
    }
}
