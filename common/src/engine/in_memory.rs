use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    BatchOp, ColumnId, Cursor, CursorOptions, Engine, EngineError, EngineRead, EngineResult,
    EngineSnapshot, MergeOperator, ReadOptions, Record, WriteOptions,
};

/// A column family requested at open time.
///
/// Merge operators are runtime objects and are re-supplied on every open;
/// they are not part of the persisted location state.
pub struct ColumnSpec {
    pub name: String,
    pub merge: Option<Arc<dyn MergeOperator>>,
}

struct ColumnState {
    name: String,
    map: BTreeMap<Bytes, Bytes>,
    merge: Option<Arc<dyn MergeOperator>>,
}

struct EngineState {
    identity: String,
    columns: Vec<ColumnState>,
    by_name: HashMap<String, ColumnId>,
    sequence: u64,
}

impl EngineState {
    fn new(identity: String) -> Self {
        let mut state = Self {
            identity,
            columns: Vec::new(),
            by_name: HashMap::new(),
            sequence: 0,
        };
        state.add_column("default".to_string(), None);
        state
    }

    fn add_column(&mut self, name: String, merge: Option<Arc<dyn MergeOperator>>) -> ColumnId {
        let id = ColumnId(self.columns.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.columns.push(ColumnState {
            name,
            map: BTreeMap::new(),
            merge,
        });
        id
    }

    fn apply_specs(&mut self, specs: Vec<ColumnSpec>) {
        for spec in specs {
            match self.by_name.get(&spec.name) {
                Some(&id) => self.columns[id.0 as usize].merge = spec.merge,
                None => {
                    self.add_column(spec.name, spec.merge);
                }
            }
        }
    }

    fn column(&self, id: ColumnId) -> EngineResult<&ColumnState> {
        self.columns
            .get(id.0 as usize)
            .ok_or_else(|| EngineError::Internal(format!("unknown column family id {}", id.0)))
    }

    fn column_mut(&mut self, id: ColumnId) -> EngineResult<&mut ColumnState> {
        self.columns
            .get_mut(id.0 as usize)
            .ok_or_else(|| EngineError::Internal(format!("unknown column family id {}", id.0)))
    }
}

struct LocationEntry {
    state: Arc<RwLock<EngineState>>,
    held: bool,
}

/// Process-wide registry of in-memory locations.
///
/// Gives the in-memory engine the open semantics of an on-disk engine: a
/// location is held by at most one handle at a time, survives close/reopen
/// within the process, and can be required to pre-exist.
fn locations() -> &'static Mutex<HashMap<String, LocationEntry>> {
    static LOCATIONS: OnceLock<Mutex<HashMap<String, LocationEntry>>> = OnceLock::new();
    LOCATIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// In-memory implementation of the [`Engine`] trait.
///
/// Each column family is an ordered map under a single engine-wide lock.
/// Merges are folded eagerly at write time using the column's merge
/// operator, and snapshots clone the column maps wholesale.
pub struct InMemoryEngine {
    location: String,
    state: Arc<RwLock<EngineState>>,
    closed: AtomicBool,
}

impl InMemoryEngine {
    /// Opens a location, creating it when permitted.
    ///
    /// Fails when the location is held by another handle, when it is missing
    /// and `create_if_missing` is off, or when it exists and
    /// `error_if_exists` is on.
    pub fn open(
        location: &str,
        create_if_missing: bool,
        error_if_exists: bool,
        columns: Vec<ColumnSpec>,
    ) -> EngineResult<Self> {
        let mut registry = locations()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let state = match registry.get_mut(location) {
            Some(entry) => {
                if entry.held {
                    return Err(EngineError::Storage(format!(
                        "location '{}' is locked by another handle",
                        location
                    )));
                }
                if error_if_exists {
                    return Err(EngineError::Storage(format!(
                        "location '{}' already exists",
                        location
                    )));
                }
                entry.held = true;
                entry.state.clone()
            }
            None => {
                if !create_if_missing {
                    return Err(EngineError::Storage(format!(
                        "location '{}' does not exist",
                        location
                    )));
                }
                let identity = format!(
                    "mem-{:016x}",
                    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
                );
                let state = Arc::new(RwLock::new(EngineState::new(identity)));
                registry.insert(
                    location.to_string(),
                    LocationEntry {
                        state: state.clone(),
                        held: true,
                    },
                );
                state
            }
        };
        drop(registry);

        state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply_specs(columns);

        Ok(Self {
            location: location.to_string(),
            state,
            closed: AtomicBool::new(false),
        })
    }

    fn guard(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Storage("engine is closed".to_string()));
        }
        Ok(())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn records_in_range(
    map: &BTreeMap<Bytes, Bytes>,
    options: &CursorOptions,
) -> Vec<Record> {
    map.range((options.range.start.clone(), options.range.end.clone()))
        .map(|(k, v)| Record::new(k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl EngineRead for InMemoryEngine {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(
        &self,
        column: ColumnId,
        key: Bytes,
        _options: &ReadOptions,
    ) -> EngineResult<Option<Bytes>> {
        self.guard()?;
        let state = self.read_state();
        Ok(state.column(column)?.map.get(&key).cloned())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn multi_get(
        &self,
        column: ColumnId,
        keys: &[Bytes],
        _options: &ReadOptions,
    ) -> EngineResult<Vec<Option<Bytes>>> {
        self.guard()?;
        let state = self.read_state();
        let map = &state.column(column)?.map;
        Ok(keys.iter().map(|key| map.get(key).cloned()).collect())
    }

    /// Creates a cursor over the column's current contents.
    ///
    /// Records are materialized at creation time, so even a tailing cursor
    /// only observes writes committed before this call.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn cursor(
        &self,
        column: ColumnId,
        options: CursorOptions,
    ) -> EngineResult<Box<dyn Cursor>> {
        self.guard()?;
        let state = self.read_state();
        let records = records_in_range(&state.column(column)?.map, &options);
        Ok(Box::new(InMemoryCursor {
            records,
            pos: None,
        }))
    }
}

#[async_trait]
impl Engine for InMemoryEngine {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn write(&self, ops: Vec<BatchOp>, _options: &WriteOptions) -> EngineResult<()> {
        self.guard()?;
        let mut state = self.write_state();
        for op in ops {
            match op {
                BatchOp::Put { column, key, value } => {
                    let col = state.column_mut(column.unwrap_or(ColumnId::DEFAULT))?;
                    col.map.insert(key, value);
                    state.sequence += 1;
                }
                BatchOp::Delete { column, key } => {
                    let col = state.column_mut(column.unwrap_or(ColumnId::DEFAULT))?;
                    col.map.remove(&key);
                    state.sequence += 1;
                }
                BatchOp::Merge { column, key, value } => {
                    let col = state.column_mut(column.unwrap_or(ColumnId::DEFAULT))?;
                    let merge = col.merge.clone().ok_or_else(|| {
                        EngineError::Storage(format!(
                            "merge operator not configured for column family '{}'",
                            col.name
                        ))
                    })?;
                    let existing = col.map.get(&key).cloned();
                    let merged = merge.merge(&key, existing, value);
                    col.map.insert(key, merged);
                    state.sequence += 1;
                }
                // Log-only payloads mutate nothing and take no sequence number.
                BatchOp::LogData { .. } => {}
            }
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn snapshot(&self) -> EngineResult<Arc<dyn EngineSnapshot>> {
        self.guard()?;
        let state = self.read_state();
        let columns: Vec<BTreeMap<Bytes, Bytes>> =
            state.columns.iter().map(|c| c.map.clone()).collect();
        Ok(Arc::new(InMemorySnapshot {
            columns: Arc::new(columns),
        }))
    }

    async fn merge_operands(&self, column: ColumnId, key: Bytes) -> EngineResult<Vec<Bytes>> {
        self.guard()?;
        let state = self.read_state();
        // Merges are folded eagerly, so the resolved value is the only operand.
        Ok(state
            .column(column)?
            .map
            .get(&key)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn flush_wal(&self, _sync: bool) -> EngineResult<()> {
        self.guard()
    }

    async fn latest_sequence(&self) -> EngineResult<u64> {
        self.guard()?;
        Ok(self.read_state().sequence)
    }

    async fn property(&self, column: ColumnId, name: &str) -> EngineResult<Option<String>> {
        self.guard()?;
        let state = self.read_state();
        let col = state.column(column)?;
        match name {
            "num-keys" => Ok(Some(col.map.len().to_string())),
            _ => Ok(None),
        }
    }

    async fn identity(&self) -> EngineResult<String> {
        self.guard()?;
        Ok(self.read_state().identity.clone())
    }

    fn column_id(&self, name: &str) -> Option<ColumnId> {
        self.read_state().by_name.get(name).copied()
    }

    fn column_names(&self) -> Vec<String> {
        self.read_state()
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    async fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut registry = locations()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = registry.get_mut(&self.location) {
            entry.held = false;
        }
        Ok(())
    }
}

/// Snapshot holding a full copy of every column at creation time.
struct InMemorySnapshot {
    columns: Arc<Vec<BTreeMap<Bytes, Bytes>>>,
}

impl InMemorySnapshot {
    fn column(&self, id: ColumnId) -> EngineResult<&BTreeMap<Bytes, Bytes>> {
        self.columns
            .get(id.0 as usize)
            .ok_or_else(|| EngineError::Internal(format!("unknown column family id {}", id.0)))
    }
}

#[async_trait]
impl EngineRead for InMemorySnapshot {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(
        &self,
        column: ColumnId,
        key: Bytes,
        _options: &ReadOptions,
    ) -> EngineResult<Option<Bytes>> {
        Ok(self.column(column)?.get(&key).cloned())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn multi_get(
        &self,
        column: ColumnId,
        keys: &[Bytes],
        _options: &ReadOptions,
    ) -> EngineResult<Vec<Option<Bytes>>> {
        let map = self.column(column)?;
        Ok(keys.iter().map(|key| map.get(key).cloned()).collect())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn cursor(
        &self,
        column: ColumnId,
        options: CursorOptions,
    ) -> EngineResult<Box<dyn Cursor>> {
        let records = records_in_range(self.column(column)?, &options);
        Ok(Box::new(InMemoryCursor {
            records,
            pos: None,
        }))
    }
}

#[async_trait]
impl EngineSnapshot for InMemorySnapshot {}

/// Cursor over a materialized, ascending record list.
struct InMemoryCursor {
    records: Vec<Record>,
    /// `None` means the cursor is invalid (unpositioned or off either end).
    pos: Option<usize>,
}

#[async_trait]
impl Cursor for InMemoryCursor {
    async fn seek(&mut self, target: &[u8]) -> EngineResult<()> {
        let idx = self.records.partition_point(|r| r.key.as_ref() < target);
        self.pos = (idx < self.records.len()).then_some(idx);
        Ok(())
    }

    async fn seek_for_prev(&mut self, target: &[u8]) -> EngineResult<()> {
        let idx = self.records.partition_point(|r| r.key.as_ref() <= target);
        self.pos = idx.checked_sub(1);
        Ok(())
    }

    async fn seek_to_first(&mut self) -> EngineResult<()> {
        self.pos = (!self.records.is_empty()).then_some(0);
        Ok(())
    }

    async fn seek_to_last(&mut self) -> EngineResult<()> {
        self.pos = self.records.len().checked_sub(1);
        Ok(())
    }

    async fn next(&mut self) -> EngineResult<()> {
        self.pos = self
            .pos
            .and_then(|i| (i + 1 < self.records.len()).then_some(i + 1));
        Ok(())
    }

    async fn prev(&mut self) -> EngineResult<()> {
        self.pos = self.pos.and_then(|i| i.checked_sub(1));
        Ok(())
    }

    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn key(&self) -> Option<Bytes> {
        self.pos.map(|i| self.records[i].key.clone())
    }

    fn value(&self) -> Option<Bytes> {
        self.pos.map(|i| self.records[i].value.clone())
    }

    fn status(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// Injected failure that fires either once or on every call.
#[cfg(feature = "test-utils")]
#[derive(Clone)]
enum Failure {
    /// Error is returned once, then automatically cleared.
    Once(EngineError),
    /// Error is returned on every subsequent call until explicitly cleared.
    Persistent(EngineError),
}

#[cfg(feature = "test-utils")]
type FailSlot = arc_swap::ArcSwap<Option<Failure>>;

/// Checks a [`FailSlot`] and returns an error if one is set.
#[cfg(feature = "test-utils")]
fn check_failure(slot: &FailSlot) -> EngineResult<()> {
    let guard = slot.load();
    match guard.as_ref() {
        None => Ok(()),
        Some(Failure::Persistent(err)) => Err(err.clone()),
        Some(Failure::Once(_)) => {
            // Swap to None; if another thread raced us, one of them gets the
            // error and the others pass through.
            let prev = slot.swap(Arc::new(None));
            match prev.as_ref() {
                Some(Failure::Once(err)) => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }
}

/// An engine wrapper that delegates to an inner [`Engine`] but can inject
/// failures into `write`, `multi_get`, `snapshot`, `flush_wal`, and `close`
/// on demand.
///
/// Each failure slot is a lock-free [`ArcSwap`](arc_swap::ArcSwap), so the
/// wrapper adds no synchronisation that could mask concurrency bugs in the
/// code under test. Failures are either *persistent* (every call until
/// cleared) or *once* (next call only, then auto-cleared).
///
/// Gated behind the `test-utils` feature.
#[cfg(feature = "test-utils")]
pub struct FailingEngine {
    inner: Arc<dyn Engine>,
    fail_write: FailSlot,
    fail_multi_get: FailSlot,
    fail_snapshot: FailSlot,
    fail_flush_wal: FailSlot,
    fail_close: FailSlot,
}

#[cfg(feature = "test-utils")]
impl FailingEngine {
    /// Wraps an existing engine, with all failure injections initially `None`.
    pub fn wrap(inner: Arc<dyn Engine>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_write: arc_swap::ArcSwap::from_pointee(None),
            fail_multi_get: arc_swap::ArcSwap::from_pointee(None),
            fail_snapshot: arc_swap::ArcSwap::from_pointee(None),
            fail_flush_wal: arc_swap::ArcSwap::from_pointee(None),
            fail_close: arc_swap::ArcSwap::from_pointee(None),
        })
    }

    /// Makes `write` return the given error on every subsequent call.
    pub fn fail_write(&self, err: EngineError) {
        self.fail_write
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `write` return the given error on the next call only.
    pub fn fail_write_once(&self, err: EngineError) {
        self.fail_write.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `multi_get` return the given error on every subsequent call.
    pub fn fail_multi_get(&self, err: EngineError) {
        self.fail_multi_get
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `snapshot` return the given error on the next call only.
    pub fn fail_snapshot_once(&self, err: EngineError) {
        self.fail_snapshot.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `flush_wal` return the given error on every subsequent call.
    pub fn fail_flush_wal(&self, err: EngineError) {
        self.fail_flush_wal
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `close` return the given error on the next call only.
    pub fn fail_close_once(&self, err: EngineError) {
        self.fail_close.store(Arc::new(Some(Failure::Once(err))));
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl EngineRead for FailingEngine {
    async fn get(
        &self,
        column: ColumnId,
        key: Bytes,
        options: &ReadOptions,
    ) -> EngineResult<Option<Bytes>> {
        self.inner.get(column, key, options).await
    }

    async fn multi_get(
        &self,
        column: ColumnId,
        keys: &[Bytes],
        options: &ReadOptions,
    ) -> EngineResult<Vec<Option<Bytes>>> {
        check_failure(&self.fail_multi_get)?;
        self.inner.multi_get(column, keys, options).await
    }

    async fn cursor(
        &self,
        column: ColumnId,
        options: CursorOptions,
    ) -> EngineResult<Box<dyn Cursor>> {
        self.inner.cursor(column, options).await
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl Engine for FailingEngine {
    async fn write(&self, ops: Vec<BatchOp>, options: &WriteOptions) -> EngineResult<()> {
        check_failure(&self.fail_write)?;
        self.inner.write(ops, options).await
    }

    async fn snapshot(&self) -> EngineResult<Arc<dyn EngineSnapshot>> {
        check_failure(&self.fail_snapshot)?;
        self.inner.snapshot().await
    }

    async fn merge_operands(&self, column: ColumnId, key: Bytes) -> EngineResult<Vec<Bytes>> {
        self.inner.merge_operands(column, key).await
    }

    async fn flush_wal(&self, sync: bool) -> EngineResult<()> {
        check_failure(&self.fail_flush_wal)?;
        self.inner.flush_wal(sync).await
    }

    async fn latest_sequence(&self) -> EngineResult<u64> {
        self.inner.latest_sequence().await
    }

    async fn property(&self, column: ColumnId, name: &str) -> EngineResult<Option<String>> {
        self.inner.property(column, name).await
    }

    async fn identity(&self) -> EngineResult<String> {
        self.inner.identity().await
    }

    fn column_id(&self, name: &str) -> Option<ColumnId> {
        self.inner.column_id(name)
    }

    fn column_names(&self) -> Vec<String> {
        self.inner.column_names()
    }

    async fn close(&self) -> EngineResult<()> {
        check_failure(&self.fail_close)?;
        self.inner.close().await
    }
}
