pub mod config;
pub mod factory;
pub mod in_memory;
pub mod max_rev;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;

/// Identifier of a column family within an engine.
///
/// Ids are assigned by the engine at open time and stay stable across
/// close/reopen of the same location. The default column family always has
/// id 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub u32);

impl ColumnId {
    /// The default column family, present in every engine.
    pub const DEFAULT: ColumnId = ColumnId(0);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// A single operation within an atomic write batch.
///
/// A `column` of `None` targets the default column family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        column: Option<ColumnId>,
        key: Bytes,
        value: Bytes,
    },
    Delete {
        column: Option<ColumnId>,
        key: Bytes,
    },
    Merge {
        column: Option<ColumnId>,
        key: Bytes,
        value: Bytes,
    },
    /// Opaque payload appended to the write log. Never lands in a column
    /// family and does not consume a sequence number.
    LogData { data: Bytes },
}

impl BatchOp {
    /// The column family the operation targets, with unscoped operations
    /// resolving to the default column. `None` for [`BatchOp::LogData`].
    pub fn column(&self) -> Option<ColumnId> {
        match self {
            BatchOp::Put { column, .. }
            | BatchOp::Delete { column, .. }
            | BatchOp::Merge { column, .. } => Some(column.unwrap_or(ColumnId::DEFAULT)),
            BatchOp::LogData { .. } => None,
        }
    }
}

/// Options for write operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    /// Whether to sync the write log before acknowledging the write.
    pub sync: bool,
    /// Hint that the write may be throttled in favor of foreground traffic.
    pub low_priority: bool,
}

/// Options for point reads.
#[derive(Clone, Copy, Debug)]
pub struct ReadOptions {
    /// Whether blocks read on behalf of this operation should populate the
    /// engine's block cache.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { fill_cache: true }
    }
}

/// Options for cursor creation.
#[derive(Clone, Debug)]
pub struct CursorOptions {
    /// Keys outside this range are invisible to the cursor.
    pub range: BytesRange,
    pub fill_cache: bool,
    /// Whether the cursor may observe writes committed after its creation.
    pub tailing: bool,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            range: BytesRange::unbounded(),
            fill_cache: true,
            tailing: false,
        }
    }
}

/// Error type for engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Errors reported by the storage engine.
    Storage(String),
    /// Internal errors.
    Internal(String),
}

impl std::error::Error for EngineError {}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EngineError::Storage(msg) => write!(f, "Storage error: {}", msg),
            EngineError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Trait for combining an existing value with a merge operand.
///
/// Merge operators must be associative: `merge(merge(a, b), c)` must equal
/// `merge(a, merge(b, c))` so the engine may fold operands in any grouping.
pub trait MergeOperator: Send + Sync {
    /// Merges the operand into the existing value, producing the resolved
    /// value for the key.
    fn merge(&self, key: &Bytes, existing_value: Option<Bytes>, operand: Bytes) -> Bytes;
}

/// A positioned cursor over the records of one column family.
///
/// A cursor starts unpositioned; any of the seek methods establishes a
/// position. Positioning methods clamp to the cursor's range, and stepping
/// off either end leaves the cursor invalid.
#[async_trait]
pub trait Cursor: Send {
    /// Positions at the first record whose key is `>= target`.
    async fn seek(&mut self, target: &[u8]) -> EngineResult<()>;

    /// Positions at the last record whose key is `<= target`.
    async fn seek_for_prev(&mut self, target: &[u8]) -> EngineResult<()>;

    async fn seek_to_first(&mut self) -> EngineResult<()>;

    async fn seek_to_last(&mut self) -> EngineResult<()>;

    async fn next(&mut self) -> EngineResult<()>;

    async fn prev(&mut self) -> EngineResult<()>;

    fn valid(&self) -> bool;

    /// The key at the current position, or `None` when invalid.
    fn key(&self) -> Option<Bytes>;

    /// The value at the current position, or `None` when invalid.
    fn value(&self) -> Option<Bytes>;

    /// Deferred error from the last positioning call. An invalid cursor with
    /// an `Ok` status has simply run off the end of its range.
    fn status(&self) -> EngineResult<()>;
}

/// Read operations shared by engines and snapshots.
#[async_trait]
pub trait EngineRead: Send + Sync {
    async fn get(
        &self,
        column: ColumnId,
        key: Bytes,
        options: &ReadOptions,
    ) -> EngineResult<Option<Bytes>>;

    /// Grouped point lookup, one result slot per input key in input order.
    ///
    /// A key that is absent yields `None` in its slot, and so does a key
    /// whose individual lookup failed. Only failures that sink the whole
    /// group surface as an error.
    async fn multi_get(
        &self,
        column: ColumnId,
        keys: &[Bytes],
        options: &ReadOptions,
    ) -> EngineResult<Vec<Option<Bytes>>>;

    async fn cursor(
        &self,
        column: ColumnId,
        options: CursorOptions,
    ) -> EngineResult<Box<dyn Cursor>>;
}

/// A pinned, consistent read view of the engine.
///
/// Reads through a snapshot do not observe writes committed after the
/// snapshot was taken. The view is released when the last `Arc` holding the
/// snapshot drops.
#[async_trait]
pub trait EngineSnapshot: EngineRead {}

/// The storage engine as seen by the client layer.
#[async_trait]
pub trait Engine: EngineRead {
    /// Applies a batch of operations atomically, in batch order.
    async fn write(&self, ops: Vec<BatchOp>, options: &WriteOptions) -> EngineResult<()>;

    /// Takes a point-in-time snapshot of the engine.
    async fn snapshot(&self) -> EngineResult<Arc<dyn EngineSnapshot>>;

    /// Returns the unmerged operands pending for a key, oldest first.
    ///
    /// Engines that fold merges eagerly return the resolved value as the
    /// single operand.
    async fn merge_operands(&self, column: ColumnId, key: Bytes) -> EngineResult<Vec<Bytes>>;

    /// Flushes the write log, optionally syncing it to stable storage.
    async fn flush_wal(&self, sync: bool) -> EngineResult<()>;

    /// The sequence number of the most recently applied operation.
    async fn latest_sequence(&self) -> EngineResult<u64>;

    /// Reads an engine property by name, or `None` when the engine does not
    /// expose the property.
    async fn property(&self, column: ColumnId, name: &str) -> EngineResult<Option<String>>;

    /// A stable identifier for the opened location.
    async fn identity(&self) -> EngineResult<String>;

    /// Resolves a column family name to its id.
    fn column_id(&self, name: &str) -> Option<ColumnId>;

    /// The names of all column families, in id order.
    fn column_names(&self) -> Vec<String>;

    /// Closes the engine and releases the location for other handles.
    async fn close(&self) -> EngineResult<()>;

    /// Registers engine metrics into the given Prometheus registry.
    ///
    /// The default implementation is a no-op. Engines that expose internal
    /// counters override this to register gauges that read live values on
    /// each scrape.
    #[cfg(feature = "metrics")]
    fn register_metrics(&self, _registry: &mut prometheus_client::registry::Registry) {}
}
