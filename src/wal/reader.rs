//! Sequential WAL reader used by recovery.
//!
//! Reads every rotated file in sequence-number order and yields records in
//! total log order. A truncated final record (a length prefix with fewer
//! trailing bytes than it claims — the signature of a crash mid-append) or
//! a CRC mismatch is treated as the end of the log: anything from that
//! point on is absent, not an error.

use crate::error::Result;
use crate::wal::record::WalRecord;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

pub struct WalReadResult {
    pub records: Vec<WalRecord>,
    /// True if a corrupt or truncated record was encountered and reading
    /// stopped early (the remainder of the log, if any, is silently
    /// dropped — this is expected after a crash, not itself an error).
    pub truncated: bool,
}

pub fn read_all(dir: impl AsRef<Path>) -> Result<WalReadResult> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(WalReadResult {
            records: Vec::new(),
            truncated: false,
        });
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("wal-") && n.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut records = Vec::new();
    let mut truncated = false;

    'files: for path in files {
        let mut buf = Vec::new();
        fs::File::open(&path)?.read_to_end(&mut buf)?;
        let mut offset = 0usize;
        loop {
            if offset + 8 > buf.len() {
                if offset != buf.len() {
                    truncated = true;
                }
                break;
            }
            let len = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
            let crc = u32::from_le_bytes(buf[offset + 4..offset + 8].try_into().unwrap());
            let payload_start = offset + 8;
            let payload_end = payload_start + len;
            if payload_end > buf.len() {
                truncated = true;
                break;
            }
            let payload = &buf[payload_start..payload_end];
            if crc32fast::hash(payload) != crc {
                tracing::warn!(file = %path.display(), offset, "WAL CRC mismatch, stopping replay");
                truncated = true;
                break 'files;
            }
            match bincode::deserialize::<WalRecord>(payload) {
                Ok(record) => records.push(record),
                Err(_) => {
                    truncated = true;
                    break 'files;
                }
            }
            offset = payload_end;
        }
    }

    Ok(WalReadResult { records, truncated })
}
