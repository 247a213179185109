//! Engine configuration types.
//!
//! Enumerated options parse via [`FromStr`] and reject unknown values before
//! any engine interaction, so a typo never reaches the engine as a silently
//! defaulted setting.

use std::collections::BTreeMap;
use std::str::FromStr;

/// Configuration for opening an engine location.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// The engine location (a path for on-disk engines, a registry name for
    /// the in-memory engine).
    pub location: String,
    /// Create the location when it does not exist. Default: true.
    pub create_if_missing: bool,
    /// Fail the open when the location already exists. Default: false.
    pub error_if_exists: bool,
    /// Background thread parallelism hint.
    pub parallelism: Option<u32>,
    /// Write-ahead log settings.
    pub wal: WalConfig,
    /// Whether writes may be pipelined with log appends.
    pub pipelined_write: bool,
    /// Options for the default column family.
    pub default_column: ColumnOptions,
    /// Additional column families by name.
    pub columns: BTreeMap<String, ColumnOptions>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            create_if_missing: true,
            error_if_exists: false,
            parallelism: None,
            wal: WalConfig::default(),
            pipelined_write: false,
            default_column: ColumnOptions::default(),
            columns: BTreeMap::new(),
        }
    }
}

/// Write-ahead log settings.
#[derive(Clone, Debug, Default)]
pub struct WalConfig {
    /// Retention of obsolete log files, in seconds.
    pub ttl_seconds: Option<u64>,
    /// Size cap on retained obsolete log files, in megabytes.
    pub size_limit_mb: Option<u64>,
    /// Whether log payloads are compressed.
    pub compression: bool,
}

/// Per-column-family options.
#[derive(Clone, Debug)]
pub struct ColumnOptions {
    /// Memory budget for the column's memtables, in megabytes.
    pub memtable_memory_budget_mb: Option<u64>,
    pub compaction: Option<CompactionStyle>,
    /// Whether values are compressed at rest. Default: true.
    pub compression: bool,
    /// Block cache capacity in bytes.
    pub cache_size_bytes: Option<u64>,
    pub optimize: Option<OptimizePreset>,
    pub merge_operator: Option<MergeOperatorKind>,
    /// Fixed key prefix length used for prefix seeks.
    pub prefix_extractor_len: Option<usize>,
    pub block_size: Option<usize>,
    pub block_restart_interval: Option<usize>,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        Self {
            memtable_memory_budget_mb: None,
            compaction: None,
            compression: true,
            cache_size_bytes: None,
            optimize: None,
            merge_operator: None,
            prefix_extractor_len: None,
            block_size: None,
            block_restart_interval: None,
        }
    }
}

/// Compaction strategy for a column family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactionStyle {
    Universal,
    Level,
}

impl FromStr for CompactionStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "universal" => Ok(CompactionStyle::Universal),
            "level" => Ok(CompactionStyle::Level),
            _ => Err(format!("unknown compaction style '{}'", s)),
        }
    }
}

/// Access-pattern preset shaping a column family's table layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizePreset {
    /// Tune for point lookups (hash index plus key filters).
    PointLookup,
    /// Tune for range scans.
    RangeLookup,
}

impl FromStr for OptimizePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "point-lookup" => Ok(OptimizePreset::PointLookup),
            "range-lookup" => Ok(OptimizePreset::RangeLookup),
            _ => Err(format!("unknown optimize preset '{}'", s)),
        }
    }
}

/// Built-in merge operators available by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOperatorKind {
    /// Keep the value carrying the numerically highest revision prefix.
    MaxRev,
}

impl FromStr for MergeOperatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maxRev" => Ok(MergeOperatorKind::MaxRev),
            _ => Err(format!("unknown merge operator '{}'", s)),
        }
    }
}
