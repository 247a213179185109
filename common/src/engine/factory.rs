//! Engine factory resolving configuration into an engine instance.

use std::sync::Arc;

use super::config::{ColumnOptions, EngineConfig, MergeOperatorKind};
use super::in_memory::{ColumnSpec, InMemoryEngine};
use super::max_rev::MaxRevMergeOperator;
use super::{Engine, EngineResult, MergeOperator};

fn resolve_merge_operator(kind: MergeOperatorKind) -> Arc<dyn MergeOperator> {
    match kind {
        MergeOperatorKind::MaxRev => Arc::new(MaxRevMergeOperator),
    }
}

fn column_spec(name: &str, options: &ColumnOptions) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        merge: options.merge_operator.map(resolve_merge_operator),
    }
}

/// Creates an engine for the configured location.
///
/// The default column family is always opened first, followed by the
/// configured columns in name order. Tuning options (compaction style,
/// caches, presets) shape a native engine's tables; the in-memory engine
/// accepts and ignores them.
pub async fn create_engine(config: &EngineConfig) -> EngineResult<Arc<dyn Engine>> {
    let mut specs = vec![column_spec("default", &config.default_column)];
    for (name, options) in &config.columns {
        specs.push(column_spec(name, options));
    }

    let engine = InMemoryEngine::open(
        &config.location,
        config.create_if_missing,
        config.error_if_exists,
        specs,
    )?;
    Ok(Arc::new(engine))
}
