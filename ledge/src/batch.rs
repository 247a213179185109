//! Write batch construction and replay.

use bytes::Bytes;
use common::{BatchOp, ColumnId};

use crate::config::IterateOptions;

/// An ordered, append-only batch of write operations.
///
/// Operations accumulate in insertion order and are applied atomically by
/// [`Database::write`](crate::Database::write). The batch can also be
/// replayed without mutating anything via [`WriteBatch::iterate`].
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put against the default column family.
    pub fn put(&mut self, key: Bytes, value: Bytes) {
        self.ops.push(BatchOp::Put {
            column: None,
            key,
            value,
        });
    }

    /// Appends a put against the given column family.
    pub fn put_in(&mut self, column: ColumnId, key: Bytes, value: Bytes) {
        self.ops.push(BatchOp::Put {
            column: Some(column),
            key,
            value,
        });
    }

    /// Appends a delete against the default column family.
    pub fn delete(&mut self, key: Bytes) {
        self.ops.push(BatchOp::Delete { column: None, key });
    }

    /// Appends a delete against the given column family.
    pub fn delete_in(&mut self, column: ColumnId, key: Bytes) {
        self.ops.push(BatchOp::Delete {
            column: Some(column),
            key,
        });
    }

    /// Appends a merge against the default column family.
    pub fn merge(&mut self, key: Bytes, value: Bytes) {
        self.ops.push(BatchOp::Merge {
            column: None,
            key,
            value,
        });
    }

    /// Appends a merge against the given column family.
    pub fn merge_in(&mut self, column: ColumnId, key: Bytes, value: Bytes) {
        self.ops.push(BatchOp::Merge {
            column: Some(column),
            key,
            value,
        });
    }

    /// Appends an opaque payload to the write log.
    pub fn log_data(&mut self, data: Bytes) {
        self.ops.push(BatchOp::LogData { data });
    }

    /// Removes all accumulated operations.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Number of data operations in the batch. Log-data entries carry no
    /// data and are not counted.
    pub fn count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| !matches!(op, BatchOp::LogData { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Replays the batch in insertion order without mutating anything.
    ///
    /// A column filter drops operations scoped to any other column family.
    /// Log-data entries are never column-scoped: the filter ignores them and
    /// only `options.data` decides whether they appear.
    pub fn iterate(&self, options: &IterateOptions) -> Vec<BatchRecord> {
        let mut records = Vec::new();
        for op in &self.ops {
            if let BatchOp::LogData { data } = op {
                if options.data {
                    records.push(BatchRecord::LogData { data: data.clone() });
                }
                continue;
            }
            let column = match op.column() {
                Some(column) => column,
                None => continue,
            };
            if let Some(filter) = options.column {
                if column != filter {
                    continue;
                }
            }
            let record = match op {
                BatchOp::Put { key, value, .. } => BatchRecord::Put {
                    column,
                    key: options.keys.then(|| key.clone()),
                    value: options.values.then(|| value.clone()),
                },
                BatchOp::Delete { key, .. } => BatchRecord::Delete {
                    column,
                    key: options.keys.then(|| key.clone()),
                },
                BatchOp::Merge { key, value, .. } => BatchRecord::Merge {
                    column,
                    key: options.keys.then(|| key.clone()),
                    value: options.values.then(|| value.clone()),
                },
                BatchOp::LogData { .. } => continue,
            };
            records.push(record);
        }
        records
    }

    pub(crate) fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// A record produced by replaying a [`WriteBatch`].
///
/// Keys and values are `None` when the replay options suppressed them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchRecord {
    Put {
        column: ColumnId,
        key: Option<Bytes>,
        value: Option<Bytes>,
    },
    Delete {
        column: ColumnId,
        key: Option<Bytes>,
    },
    Merge {
        column: ColumnId,
        key: Option<Bytes>,
        value: Option<Bytes>,
    },
    LogData { data: Bytes },
}
