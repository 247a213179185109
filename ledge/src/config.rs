//! Configuration and per-operation options.

use bytes::Bytes;
use common::{ColumnId, EngineConfig};

/// Configuration for opening a [`Database`](crate::Database).
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Engine configuration: location, column families, and tuning.
    pub engine: EngineConfig,
    /// Number of dedicated worker threads for engine tasks. `None` runs
    /// tasks on the ambient tokio runtime.
    pub worker_threads: Option<usize>,
}

/// Options for creating a [`RangeIterator`](crate::RangeIterator).
///
/// The `gt`/`gte` pair and the `lt`/`lte` pair are each mutually exclusive;
/// supplying both members of a pair is rejected as invalid input.
#[derive(Clone, Debug)]
pub struct IteratorOptions {
    /// Exclusive lower bound on keys.
    pub gt: Option<Bytes>,
    /// Inclusive lower bound on keys.
    pub gte: Option<Bytes>,
    /// Exclusive upper bound on keys.
    pub lt: Option<Bytes>,
    /// Inclusive upper bound on keys.
    pub lte: Option<Bytes>,
    /// Traverse from the upper end of the range towards the lower.
    pub reverse: bool,
    /// Whether batches carry keys. Suppressed keys pack as absent slots.
    pub keys: bool,
    /// Whether batches carry values. Suppressed values pack as absent slots.
    pub values: bool,
    /// Maximum number of records the iterator yields over its lifetime.
    /// Negative means unlimited.
    pub limit: i64,
    /// Whether reads populate the engine's block cache.
    pub fill_cache: bool,
    /// Whether the iterator may observe writes committed after creation.
    pub tailing: bool,
    /// Pin a read view at creation. Defaults to the opposite of `tailing`.
    pub snapshot: Option<bool>,
    /// Soft cap on payload bytes per batch. The record that crosses the cap
    /// is still fully included.
    pub high_water_mark_bytes: usize,
    /// Column family to iterate. `None` targets the default column.
    pub column: Option<ColumnId>,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            reverse: false,
            keys: true,
            values: true,
            limit: -1,
            fill_cache: false,
            tailing: false,
            snapshot: None,
            high_water_mark_bytes: 64 * 1024,
            column: None,
        }
    }
}

/// Options for [`Database::get_many`](crate::Database::get_many).
#[derive(Clone, Debug)]
pub struct GetManyOptions {
    /// Column family to read from. `None` targets the default column.
    pub column: Option<ColumnId>,
    /// Whether reads populate the engine's block cache.
    pub fill_cache: bool,
    /// Read all keys from one pinned view instead of the live engine.
    pub snapshot: bool,
}

impl Default for GetManyOptions {
    fn default() -> Self {
        Self {
            column: None,
            fill_cache: true,
            snapshot: true,
        }
    }
}

/// Options for [`Database::write`](crate::Database::write).
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    /// Sync the write log before acknowledging the write.
    pub sync: bool,
    /// Hint that the write may be throttled in favor of foreground traffic.
    pub low_priority: bool,
}

/// Options for replaying a [`WriteBatch`](crate::WriteBatch).
#[derive(Clone, Debug)]
pub struct IterateOptions {
    /// Whether replayed records carry keys.
    pub keys: bool,
    /// Whether replayed records carry values.
    pub values: bool,
    /// Whether log-data entries are replayed at all.
    pub data: bool,
    /// Only replay operations scoped to this column family. Log-data
    /// entries are never column-scoped and are unaffected by the filter.
    pub column: Option<ColumnId>,
}

impl Default for IterateOptions {
    fn default() -> Self {
        Self {
            keys: true,
            values: true,
            data: true,
            column: None,
        }
    }
}

/// Options for [`Database::clear`](crate::Database::clear).
#[derive(Clone, Debug)]
pub struct ClearOptions {
    /// Exclusive lower bound on keys.
    pub gt: Option<Bytes>,
    /// Inclusive lower bound on keys.
    pub gte: Option<Bytes>,
    /// Exclusive upper bound on keys.
    pub lt: Option<Bytes>,
    /// Inclusive upper bound on keys.
    pub lte: Option<Bytes>,
    /// Delete from the upper end of the range towards the lower.
    pub reverse: bool,
    /// Maximum number of keys to delete. Negative means unlimited.
    pub limit: i64,
    /// Column family to clear. `None` targets the default column.
    pub column: Option<ColumnId>,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            reverse: false,
            limit: -1,
            column: None,
        }
    }
}
