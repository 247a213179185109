pub mod bytes;
pub mod engine;

pub use bytes::BytesRange;
pub use engine::config::{
    ColumnOptions, CompactionStyle, EngineConfig, MergeOperatorKind, OptimizePreset, WalConfig,
};
pub use engine::factory::create_engine;
#[cfg(feature = "test-utils")]
pub use engine::in_memory::FailingEngine;
pub use engine::in_memory::InMemoryEngine;
pub use engine::max_rev::MaxRevMergeOperator;
pub use engine::{
    BatchOp, ColumnId, Cursor, CursorOptions, Engine, EngineError, EngineRead, EngineResult,
    EngineSnapshot, MergeOperator, ReadOptions, Record, WriteOptions,
};
