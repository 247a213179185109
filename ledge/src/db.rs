//! Database lifecycle and engine-facing operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use common::{
    create_engine, BatchOp, ColumnId, CursorOptions, Engine, ReadOptions,
};

use crate::batch::WriteBatch;
use crate::codec::BufferPack;
use crate::config::{ClearOptions, Config, GetManyOptions, IteratorOptions, WriteOptions};
use crate::error::{Error, Result};
use crate::executor::TaskExecutor;
use crate::iterator::{encode_bounds, RangeIterator};
use crate::shutdown;

/// Deletes accumulated by [`Database::clear`] are flushed to the engine once
/// their keys reach this many bytes.
const CLEAR_BATCH_BYTES: usize = 16 * 1024;

/// A resource whose lifetime is tied to the database that created it.
///
/// Attached resources are closed, in unspecified order, when the database
/// closes, before the engine itself is torn down.
#[async_trait]
pub trait Closable: Send + Sync {
    async fn close(&self) -> Result<()>;
}

pub(crate) struct DbInner {
    config: Config,
    executor: Arc<TaskExecutor>,
    /// Serializes open/close so concurrent lifecycle calls stay idempotent.
    lifecycle: tokio::sync::Mutex<()>,
    state: Mutex<Option<Arc<dyn Engine>>>,
    resources: Mutex<HashMap<u64, Arc<dyn Closable>>>,
    next_resource: AtomicU64,
    shutdown_token: Mutex<Option<u64>>,
}

impl DbInner {
    pub(crate) fn next_resource_id(&self) -> u64 {
        self.next_resource.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn attach_resource(&self, id: u64, resource: Arc<dyn Closable>) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, resource);
    }

    pub(crate) fn detach_resource(&self, id: u64) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn engine(&self) -> Result<Arc<dyn Engine>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotOpen)
    }
}

/// The database: an opened engine location plus the resources created from
/// it.
///
/// All methods take `&self`; the handle is cheap to share across tasks.
/// Opening and closing are idempotent, and closing tears down attached
/// resources (iterators and other [`Closable`]s) before the engine.
pub struct Database {
    pub(crate) inner: Arc<DbInner>,
}

impl Database {
    /// Creates a closed database handle for the given configuration.
    ///
    /// With `worker_threads` unset, engine tasks run on the ambient tokio
    /// runtime, which must exist when this is called.
    pub fn new(config: Config) -> Result<Self> {
        let executor = match config.worker_threads {
            Some(threads) => TaskExecutor::dedicated(threads)?,
            None => TaskExecutor::ambient()?,
        };
        Ok(Self {
            inner: Arc::new(DbInner {
                config,
                executor: Arc::new(executor),
                lifecycle: tokio::sync::Mutex::new(()),
                state: Mutex::new(None),
                resources: Mutex::new(HashMap::new()),
                next_resource: AtomicU64::new(1),
                shutdown_token: Mutex::new(None),
            }),
        })
    }

    /// Opens the engine location, creating configured column families.
    ///
    /// Returns the names of all column families. Idempotent: opening an
    /// already-open database returns the existing columns unchanged.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn open(&self) -> Result<Vec<String>> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if let Ok(engine) = self.inner.engine() {
            return Ok(engine.column_names());
        }

        let engine_config = self.inner.config.engine.clone();
        let engine = self
            .inner
            .executor
            .submit(async move { create_engine(&engine_config).await.map_err(Error::from) })
            .join()
            .await?;
        let columns = engine.column_names();

        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(engine);
        let token = shutdown::register(&self.inner);
        *self
            .inner
            .shutdown_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);

        tracing::debug!(
            location = %self.inner.config.engine.location,
            "database opened"
        );
        Ok(columns)
    }

    /// Closes the database: attached resources first, then the engine.
    ///
    /// Resource close failures are logged and swallowed; only the engine's
    /// own close failure surfaces. Idempotent: closing a database that is
    /// not open succeeds.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn close(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let engine = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.take()
        };
        let Some(engine) = engine else {
            return Ok(());
        };

        // Drain the registry under the lock, close outside of it: a
        // resource's close may itself call back into detach.
        let resources: Vec<Arc<dyn Closable>> = {
            let mut map = self
                .inner
                .resources
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            map.drain().map(|(_, resource)| resource).collect()
        };
        for resource in resources {
            if let Err(error) = resource.close().await {
                tracing::warn!(%error, "failed to close attached resource");
            }
        }

        let result = self
            .inner
            .executor
            .submit(async move {
                if let Err(error) = engine.flush_wal(true).await {
                    tracing::warn!(%error, "failed to flush write log on close");
                }
                engine.close().await.map_err(Error::from)
            })
            .join()
            .await;

        let token = self
            .inner
            .shutdown_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            shutdown::deregister(token);
        }

        tracing::debug!(
            location = %self.inner.config.engine.location,
            "database closed"
        );
        result
    }

    pub fn is_open(&self) -> bool {
        self.inner.engine().is_ok()
    }

    /// The configured engine location.
    pub fn location(&self) -> &str {
        &self.inner.config.engine.location
    }

    /// Resolves a column family name to its id.
    pub fn column(&self, name: &str) -> Result<ColumnId> {
        self.inner
            .engine()?
            .column_id(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown column family '{}'", name)))
    }

    /// The names of all column families, in id order.
    pub fn columns(&self) -> Result<Vec<String>> {
        Ok(self.inner.engine()?.column_names())
    }

    /// Attaches a resource to be closed when the database closes.
    pub fn attach(&self, resource: Arc<dyn Closable>) -> u64 {
        let id = self.inner.next_resource_id();
        self.inner.attach_resource(id, resource);
        id
    }

    /// Detaches a previously attached resource. No-op for unknown ids.
    pub fn detach(&self, id: u64) {
        self.inner.detach_resource(id);
    }

    /// Creates a [`RangeIterator`] over the configured bounds.
    ///
    /// Unless the iterator is tailing (or a snapshot was explicitly
    /// declined), a read view is pinned here, so the iterator does not
    /// observe later writes.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn iterator(&self, options: IteratorOptions) -> Result<RangeIterator> {
        let engine = self.inner.engine()?;
        let range = encode_bounds(&options.gt, &options.gte, &options.lt, &options.lte)?;
        let snapshot = if options.snapshot.unwrap_or(!options.tailing) {
            Some(engine.snapshot().await?)
        } else {
            None
        };
        Ok(RangeIterator::create(
            &self.inner,
            engine,
            snapshot,
            self.inner.executor.clone(),
            &options,
            range,
        ))
    }

    /// Looks up many keys in one grouped engine read.
    ///
    /// Returns a [`BufferPack`] with one slot per key, in input order.
    /// Absent keys pack as absent slots, and so do keys whose individual
    /// lookup failed inside the engine. Duplicated keys are permitted and
    /// resolved independently.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn get_many(&self, keys: Vec<Bytes>, options: GetManyOptions) -> Result<BufferPack> {
        let engine = self.inner.engine()?;
        self.inner
            .executor
            .submit(async move {
                let column = options.column.unwrap_or(ColumnId::DEFAULT);
                let read = ReadOptions {
                    fill_cache: options.fill_cache,
                };
                let values = if options.snapshot {
                    let snapshot = engine.snapshot().await?;
                    snapshot.multi_get(column, &keys, &read).await?
                } else {
                    engine.multi_get(column, &keys, &read).await?
                };
                let mut pack = BufferPack::new();
                for value in &values {
                    pack.push(value.as_deref())?;
                }
                Ok(pack)
            })
            .join()
            .await
    }

    /// Applies a write batch atomically.
    ///
    /// The batch itself is untouched and may be written again or extended
    /// afterwards. There is no per-operation outcome: the batch succeeds or
    /// fails as a whole.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn write(&self, batch: &WriteBatch, options: WriteOptions) -> Result<()> {
        let engine = self.inner.engine()?;
        let ops = batch.ops().to_vec();
        let engine_options = common::WriteOptions {
            sync: options.sync,
            low_priority: options.low_priority,
        };
        self.inner
            .executor
            .submit(async move { engine.write(ops, &engine_options).await.map_err(Error::from) })
            .join()
            .await
    }

    /// Deletes every key in the configured range, in chunked batches.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn clear(&self, options: ClearOptions) -> Result<()> {
        let engine = self.inner.engine()?;
        let range = encode_bounds(&options.gt, &options.gte, &options.lt, &options.lte)?;
        self.inner
            .executor
            .submit(async move {
                let column = options.column.unwrap_or(ColumnId::DEFAULT);
                let mut cursor = engine
                    .cursor(
                        column,
                        CursorOptions {
                            range,
                            fill_cache: false,
                            tailing: false,
                        },
                    )
                    .await?;
                if options.reverse {
                    cursor.seek_to_last().await?;
                } else {
                    cursor.seek_to_first().await?;
                }

                let mut remaining = options.limit;
                let mut pending: Vec<BatchOp> = Vec::new();
                let mut pending_bytes = 0usize;
                while cursor.valid() && remaining != 0 {
                    if remaining > 0 {
                        remaining -= 1;
                    }
                    let Some(key) = cursor.key() else { break };
                    pending_bytes += key.len();
                    pending.push(BatchOp::Delete {
                        column: Some(column),
                        key,
                    });
                    if pending_bytes >= CLEAR_BATCH_BYTES {
                        engine
                            .write(std::mem::take(&mut pending), &Default::default())
                            .await?;
                        pending_bytes = 0;
                    }
                    if options.reverse {
                        cursor.prev().await?;
                    } else {
                        cursor.next().await?;
                    }
                }
                cursor.status()?;
                if !pending.is_empty() {
                    engine.write(pending, &Default::default()).await?;
                }
                Ok(())
            })
            .join()
            .await
    }

    /// Returns the unmerged operands pending for a key, oldest first.
    pub async fn merge_operands(
        &self,
        key: Bytes,
        column: Option<ColumnId>,
    ) -> Result<Vec<Bytes>> {
        let engine = self.inner.engine()?;
        self.inner
            .executor
            .submit(async move {
                engine
                    .merge_operands(column.unwrap_or(ColumnId::DEFAULT), key)
                    .await
                    .map_err(Error::from)
            })
            .join()
            .await
    }

    /// Reads an engine property, or `None` when the engine does not expose
    /// it.
    pub async fn property(&self, name: &str, column: Option<ColumnId>) -> Result<Option<String>> {
        let engine = self.inner.engine()?;
        Ok(engine
            .property(column.unwrap_or(ColumnId::DEFAULT), name)
            .await?)
    }

    /// A stable identifier for the opened location.
    pub async fn identity(&self) -> Result<String> {
        Ok(self.inner.engine()?.identity().await?)
    }

    /// The sequence number of the most recently applied operation.
    pub async fn latest_sequence(&self) -> Result<u64> {
        Ok(self.inner.engine()?.latest_sequence().await?)
    }

    /// Creates an already-open database over the given engine.
    #[cfg(test)]
    pub(crate) fn with_engine(engine: Arc<dyn Engine>) -> Result<Self> {
        let db = Self::new(Config::default())?;
        *db.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(engine);
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use common::{EngineConfig, EngineError, FailingEngine, InMemoryEngine, MergeOperatorKind};

    use super::*;

    static NEXT_LOCATION: AtomicU64 = AtomicU64::new(1);

    fn test_config() -> Config {
        Config {
            engine: EngineConfig {
                location: format!("db-test-{}", NEXT_LOCATION.fetch_add(1, Ordering::Relaxed)),
                ..EngineConfig::default()
            },
            worker_threads: None,
        }
    }

    async fn open_db() -> Database {
        let db = Database::new(test_config()).unwrap();
        db.open().await.unwrap();
        db
    }

    async fn put(db: &Database, key: &str, value: &str) {
        let mut batch = WriteBatch::new();
        batch.put(Bytes::from(key.to_string()), Bytes::from(value.to_string()));
        db.write(&batch, WriteOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn should_open_and_report_default_column() {
        // given
        let db = Database::new(test_config()).unwrap();

        // when
        let columns = db.open().await.unwrap();

        // then
        assert_eq!(columns, vec!["default"]);
        assert!(db.is_open());
    }

    #[tokio::test]
    async fn should_return_existing_columns_on_second_open() {
        // given
        let db = open_db().await;

        // when
        let columns = db.open().await.unwrap();

        // then
        assert_eq!(columns, vec!["default"]);
    }

    #[tokio::test]
    async fn should_close_idempotently() {
        // given
        let db = open_db().await;

        // when
        db.close().await.unwrap();
        let second = db.close().await;

        // then
        assert!(second.is_ok());
        assert!(!db.is_open());
    }

    #[tokio::test]
    async fn should_succeed_closing_a_never_opened_database() {
        // given
        let db = Database::new(test_config()).unwrap();

        // when / then
        assert!(db.close().await.is_ok());
    }

    #[tokio::test]
    async fn should_fail_open_when_location_is_held() {
        // given
        let config = test_config();
        let first = Database::new(config.clone()).unwrap();
        first.open().await.unwrap();

        // when
        let second = Database::new(config).unwrap();
        let result = second.open().await;

        // then
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn should_fail_open_of_missing_location_without_create() {
        // given
        let mut config = test_config();
        config.engine.create_if_missing = false;

        // when
        let db = Database::new(config).unwrap();
        let result = db.open().await;

        // then
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn should_reopen_after_close() {
        // given
        let config = test_config();
        let db = Database::new(config.clone()).unwrap();
        db.open().await.unwrap();
        put(&db, "key", "value").await;
        db.close().await.unwrap();

        // when
        let reopened = Database::new(config).unwrap();
        reopened.open().await.unwrap();
        let pack = reopened
            .get_many(vec![Bytes::from("key")], GetManyOptions::default())
            .await
            .unwrap();

        // then
        assert_eq!(pack.unpack().unwrap(), vec![Some(Bytes::from("value"))]);
    }

    #[tokio::test]
    async fn should_reject_operations_before_open() {
        // given
        let db = Database::new(test_config()).unwrap();

        // when
        let result = db
            .get_many(vec![Bytes::from("key")], GetManyOptions::default())
            .await;

        // then
        assert_eq!(result.unwrap_err(), Error::NotOpen);
    }

    #[tokio::test]
    async fn should_pack_get_many_results_in_input_order() {
        // given
        let db = open_db().await;
        put(&db, "a", "1").await;
        put(&db, "c", "3").await;

        // when
        let pack = db
            .get_many(
                vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")],
                GetManyOptions::default(),
            )
            .await
            .unwrap();

        // then: the absent middle key packs as a sentinel slot
        assert_eq!(pack.sizes()[1], crate::codec::ABSENT);
        assert_eq!(
            pack.unpack().unwrap(),
            vec![Some(Bytes::from("1")), None, Some(Bytes::from("3"))]
        );
    }

    #[tokio::test]
    async fn should_resolve_duplicate_keys_independently() {
        // given
        let db = open_db().await;
        put(&db, "a", "1").await;

        // when
        let pack = db
            .get_many(
                vec![Bytes::from("a"), Bytes::from("a")],
                GetManyOptions::default(),
            )
            .await
            .unwrap();

        // then
        assert_eq!(
            pack.unpack().unwrap(),
            vec![Some(Bytes::from("1")), Some(Bytes::from("1"))]
        );
    }

    #[tokio::test]
    async fn should_get_many_without_snapshot() {
        // given
        let db = open_db().await;
        put(&db, "a", "1").await;

        // when
        let pack = db
            .get_many(
                vec![Bytes::from("a")],
                GetManyOptions {
                    snapshot: false,
                    ..GetManyOptions::default()
                },
            )
            .await
            .unwrap();

        // then
        assert_eq!(pack.unpack().unwrap(), vec![Some(Bytes::from("1"))]);
    }

    #[tokio::test]
    async fn should_apply_batch_operations_in_order() {
        // given
        let db = open_db().await;
        let mut batch = WriteBatch::new();
        batch.put(Bytes::from("a"), Bytes::from("1"));
        batch.put(Bytes::from("b"), Bytes::from("2"));
        batch.delete(Bytes::from("a"));
        batch.log_data(Bytes::from("marker"));

        // when
        db.write(&batch, WriteOptions::default()).await.unwrap();

        // then
        let pack = db
            .get_many(
                vec![Bytes::from("a"), Bytes::from("b")],
                GetManyOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            pack.unpack().unwrap(),
            vec![None, Some(Bytes::from("2"))]
        );
        assert_eq!(db.latest_sequence().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn should_merge_through_batch_write() {
        // given
        let mut config = test_config();
        config.engine.default_column.merge_operator = Some(MergeOperatorKind::MaxRev);
        let db = Database::new(config).unwrap();
        db.open().await.unwrap();

        let mut batch = WriteBatch::new();
        batch.merge(Bytes::from("key"), Bytes::from("4:old"));
        batch.merge(Bytes::from("key"), Bytes::from("11:new"));

        // when
        db.write(&batch, WriteOptions::default()).await.unwrap();

        // then
        let operands = db.merge_operands(Bytes::from("key"), None).await.unwrap();
        assert_eq!(operands, vec![Bytes::from("11:new")]);
    }

    #[tokio::test]
    async fn should_clear_entire_column() {
        // given
        let db = open_db().await;
        for key in ["a", "b", "c"] {
            put(&db, key, "v").await;
        }

        // when
        db.clear(ClearOptions::default()).await.unwrap();

        // then
        assert_eq!(
            db.property("num-keys", None).await.unwrap(),
            Some("0".to_string())
        );
    }

    #[tokio::test]
    async fn should_clear_bounded_range_only() {
        // given
        let db = open_db().await;
        for key in ["a", "b", "c", "d"] {
            put(&db, key, "v").await;
        }

        // when
        db.clear(ClearOptions {
            gte: Some(Bytes::from("b")),
            lte: Some(Bytes::from("c")),
            ..ClearOptions::default()
        })
        .await
        .unwrap();

        // then
        let pack = db
            .get_many(
                vec![
                    Bytes::from("a"),
                    Bytes::from("b"),
                    Bytes::from("c"),
                    Bytes::from("d"),
                ],
                GetManyOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            pack.unpack().unwrap(),
            vec![Some(Bytes::from("v")), None, None, Some(Bytes::from("v"))]
        );
    }

    #[tokio::test]
    async fn should_clear_at_most_limit_keys_from_chosen_end() {
        // given
        let db = open_db().await;
        for key in ["a", "b", "c", "d"] {
            put(&db, key, "v").await;
        }

        // when: reverse clear with limit removes from the upper end
        db.clear(ClearOptions {
            reverse: true,
            limit: 2,
            ..ClearOptions::default()
        })
        .await
        .unwrap();

        // then
        let pack = db
            .get_many(
                vec![
                    Bytes::from("a"),
                    Bytes::from("b"),
                    Bytes::from("c"),
                    Bytes::from("d"),
                ],
                GetManyOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            pack.unpack().unwrap(),
            vec![Some(Bytes::from("v")), Some(Bytes::from("v")), None, None]
        );
    }

    #[tokio::test]
    async fn should_expose_identity_and_properties() {
        // given
        let db = open_db().await;
        put(&db, "a", "1").await;

        // then
        assert!(db.identity().await.unwrap().starts_with("mem-"));
        assert_eq!(
            db.property("num-keys", None).await.unwrap(),
            Some("1".to_string())
        );
        assert!(db.property("no-such", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_resolve_configured_columns_by_name() {
        // given
        let mut config = test_config();
        config
            .engine
            .columns
            .insert("events".to_string(), Default::default());
        let db = Database::new(config).unwrap();

        // when
        let columns = db.open().await.unwrap();

        // then
        assert_eq!(columns, vec!["default", "events"]);
        assert_eq!(db.column("events").unwrap(), ColumnId(1));
        assert!(matches!(
            db.column("missing"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn should_write_to_separate_column_families() {
        // given
        let mut config = test_config();
        config
            .engine
            .columns
            .insert("events".to_string(), Default::default());
        let db = Database::new(config).unwrap();
        db.open().await.unwrap();
        let events = db.column("events").unwrap();

        let mut batch = WriteBatch::new();
        batch.put_in(events, Bytes::from("key"), Bytes::from("scoped"));

        // when
        db.write(&batch, WriteOptions::default()).await.unwrap();

        // then
        let in_default = db
            .get_many(vec![Bytes::from("key")], GetManyOptions::default())
            .await
            .unwrap();
        assert_eq!(in_default.unpack().unwrap(), vec![None]);

        let in_events = db
            .get_many(
                vec![Bytes::from("key")],
                GetManyOptions {
                    column: Some(events),
                    ..GetManyOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            in_events.unpack().unwrap(),
            vec![Some(Bytes::from("scoped"))]
        );
    }

    #[tokio::test]
    async fn should_close_attached_iterators_on_database_close() {
        // given
        let db = open_db().await;
        put(&db, "a", "1").await;
        let first = db.iterator(IteratorOptions::default()).await.unwrap();
        let second = db.iterator(IteratorOptions::default()).await.unwrap();

        // when
        db.close().await.unwrap();

        // then
        assert!(first.is_closed().await);
        assert!(second.is_closed().await);

        // closing an already-closed iterator stays a no-op
        assert!(first.close().await.is_ok());
    }

    #[tokio::test]
    async fn should_surface_engine_close_failure() {
        // given
        let location = format!("db-test-fail-{}", NEXT_LOCATION.fetch_add(1, Ordering::Relaxed));
        let inner = Arc::new(
            InMemoryEngine::open(&location, true, false, Vec::new()).unwrap(),
        );
        let failing = FailingEngine::wrap(inner);
        failing.fail_close_once(EngineError::Storage("fence stuck".to_string()));
        let db = Database::with_engine(failing).unwrap();

        // when
        let result = db.close().await;

        // then
        assert_eq!(
            result.unwrap_err(),
            Error::Storage("fence stuck".to_string())
        );
    }

    #[tokio::test]
    async fn should_swallow_flush_failure_but_still_close() {
        // given
        let location = format!("db-test-fail-{}", NEXT_LOCATION.fetch_add(1, Ordering::Relaxed));
        let inner = Arc::new(
            InMemoryEngine::open(&location, true, false, Vec::new()).unwrap(),
        );
        let failing = FailingEngine::wrap(inner);
        failing.fail_flush_wal(EngineError::Storage("log gone".to_string()));
        let db = Database::with_engine(failing).unwrap();

        // when / then
        assert!(db.close().await.is_ok());
    }

    #[tokio::test]
    async fn should_propagate_write_failure_as_storage_error() {
        // given
        let location = format!("db-test-fail-{}", NEXT_LOCATION.fetch_add(1, Ordering::Relaxed));
        let inner = Arc::new(
            InMemoryEngine::open(&location, true, false, Vec::new()).unwrap(),
        );
        let failing = FailingEngine::wrap(inner);
        failing.fail_write(EngineError::Storage("disk full".to_string()));
        let db = Database::with_engine(failing).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(Bytes::from("k"), Bytes::from("v"));

        // when
        let result = db.write(&batch, WriteOptions::default()).await;

        // then
        assert_eq!(result.unwrap_err(), Error::Storage("disk full".to_string()));
    }
}
