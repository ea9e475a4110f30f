//! Façade configuration: one struct supplied to `Database::open`/`create`.
//! WAL flush policy is a first-class, explicit axis rather than a hidden
//! constant.

use crate::vector::HnswConfig;
use crate::wal::WalConfig;

/// When the WAL is fsynced. Commit boundaries and full pages always flush;
/// `EveryWrite` is a stricter option for hosts that want every individual
/// write durable, not just commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityLevel {
    /// Flush and fsync at commit boundaries and whenever a page fills.
    /// The default for this database.
    CommitAndPageFull,
    /// Additionally fsync after every individual WAL append. Slower,
    /// useful for hosts that cannot tolerate losing uncommitted writes on
    /// crash even though they are not yet visible to any reader.
    EveryWrite,
}

impl Default for DurabilityLevel {
    fn default() -> Self {
        DurabilityLevel::CommitAndPageFull
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub wal: WalConfig,
    pub durability: DurabilityLevel,
    pub hnsw: HnswDefaults,
    /// Row-count threshold above which a two-table join uses a hash join
    /// instead of a nested loop. 100 is an arbitrary default pending
    /// benchmarking against real workloads.
    pub hash_join_threshold: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct HnswDefaults {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswDefaults {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

impl HnswDefaults {
    pub fn config_for(&self, dimension: usize) -> HnswConfig {
        HnswConfig {
            dimension,
            m: self.m,
            ef_construction: self.ef_construction,
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            wal: WalConfig::default(),
            durability: DurabilityLevel::default(),
            hnsw: HnswDefaults::default(),
            hash_join_threshold: 100,
        }
    }
}
