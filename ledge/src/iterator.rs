//! Range iteration over a column family.

use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use common::{BytesRange, ColumnId, Cursor, CursorOptions, Engine, EngineSnapshot};
use tokio::sync::Mutex;

use crate::codec::BufferPack;
use crate::config::IteratorOptions;
use crate::db::{Closable, DbInner};
use crate::error::{Error, Result};
use crate::executor::TaskExecutor;

/// The smallest key strictly greater than `key`.
fn key_successor(key: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(key.len() + 1);
    buf.extend_from_slice(key);
    buf.put_u8(0x00);
    buf.freeze()
}

/// Encodes user bounds into an engine key range.
///
/// The engine range is always inclusive-start / exclusive-end, so the
/// inclusive upper bound `lte` becomes an exclusive bound on the key's
/// successor, and the exclusive lower bound `gt` an inclusive bound on the
/// successor.
pub(crate) fn encode_bounds(
    gt: &Option<Bytes>,
    gte: &Option<Bytes>,
    lt: &Option<Bytes>,
    lte: &Option<Bytes>,
) -> Result<BytesRange> {
    if gt.is_some() && gte.is_some() {
        return Err(Error::InvalidInput(
            "gt and gte are mutually exclusive".to_string(),
        ));
    }
    if lt.is_some() && lte.is_some() {
        return Err(Error::InvalidInput(
            "lt and lte are mutually exclusive".to_string(),
        ));
    }

    let start = match (gte, gt) {
        (Some(key), _) => Included(key.clone()),
        (None, Some(key)) => Included(key_successor(key)),
        (None, None) => Unbounded,
    };
    let end = match (lt, lte) {
        (Some(key), _) => Excluded(key.clone()),
        (None, Some(key)) => Excluded(key_successor(key)),
        (None, None) => Unbounded,
    };
    Ok(BytesRange::new(start, end))
}

/// One batch of records pulled from a [`RangeIterator`].
#[derive(Debug)]
pub struct FetchBatch {
    /// Packed slots, two per record: key then value. Whichever side the
    /// iterator was configured to drop packs as an absent slot.
    pub pack: BufferPack,
    /// True when the iterator yielded its final record: the range is
    /// exhausted or the record limit was reached. A `false` means the next
    /// call resumes where this batch stopped.
    pub finished: bool,
}

struct IterState {
    engine: Arc<dyn Engine>,
    snapshot: Option<Arc<dyn EngineSnapshot>>,
    column: ColumnId,
    range: BytesRange,
    reverse: bool,
    keys: bool,
    values: bool,
    limit: i64,
    count: i64,
    fill_cache: bool,
    tailing: bool,
    high_water_mark: usize,
    /// Lazily initialized on the first seek or batch fetch, so a tailing
    /// iterator observes writes committed before its first positioning.
    cursor: Option<Box<dyn Cursor>>,
    did_seek: bool,
    /// Set by a seek; the next advance is skipped so the seeked record is
    /// the first one yielded.
    fresh_seek: bool,
    closed: bool,
}

impl IterState {
    async fn ensure_cursor(&mut self) -> Result<&mut Box<dyn Cursor>> {
        if self.cursor.is_none() {
            let options = CursorOptions {
                range: self.range.clone(),
                fill_cache: self.fill_cache,
                tailing: self.tailing,
            };
            let cursor = match &self.snapshot {
                Some(snapshot) => snapshot.cursor(self.column, options).await?,
                None => self.engine.cursor(self.column, options).await?,
            };
            self.cursor = Some(cursor);
        }
        // Populated right above.
        self.cursor
            .as_mut()
            .ok_or_else(|| Error::Internal("cursor initialization failed".to_string()))
    }

    async fn seek(&mut self, target: &[u8]) -> Result<()> {
        debug_assert!(!self.closed, "seek on a closed iterator");
        if self.closed {
            return Err(Error::NotOpen);
        }
        self.did_seek = true;
        self.fresh_seek = true;

        if !self.range.contains(target) {
            // Engines clamp out-of-range seeks inconsistently at range
            // edges, so park the cursor past the end ourselves: the
            // iterator is exhausted, never repositioned into the range.
            let cursor = self.ensure_cursor().await?;
            cursor.seek_to_last().await?;
            if cursor.valid() {
                cursor.next().await?;
            }
            return Ok(());
        }

        let reverse = self.reverse;
        let cursor = self.ensure_cursor().await?;
        if reverse {
            cursor.seek_for_prev(target).await?;
        } else {
            cursor.seek(target).await?;
        }
        Ok(())
    }

    async fn seek_to_range(&mut self) -> Result<()> {
        self.did_seek = true;
        self.fresh_seek = true;
        let reverse = self.reverse;
        let cursor = self.ensure_cursor().await?;
        if reverse {
            cursor.seek_to_last().await?;
        } else {
            cursor.seek_to_first().await?;
        }
        Ok(())
    }

    /// Counts a record against the limit. Returns false once the limit is
    /// reached; a negative limit never is.
    fn increment(&mut self) -> bool {
        if self.limit < 0 {
            return true;
        }
        self.count += 1;
        self.count <= self.limit
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn next_batch(&mut self, max_count: usize) -> Result<FetchBatch> {
        if self.closed {
            return Err(Error::NotOpen);
        }
        self.ensure_cursor().await?;
        if !self.did_seek {
            self.seek_to_range().await?;
        }

        let mut pack = BufferPack::new();
        let mut produced = 0usize;
        let mut bytes_read = 0usize;
        let mut finished = false;

        loop {
            if self.fresh_seek {
                self.fresh_seek = false;
            } else {
                let reverse = self.reverse;
                let cursor = self.ensure_cursor().await?;
                if reverse {
                    cursor.prev().await?;
                } else {
                    cursor.next().await?;
                }
            }

            let entry = {
                let cursor = self.ensure_cursor().await?;
                if cursor.valid() {
                    Some((cursor.key(), cursor.value()))
                } else {
                    cursor.status()?;
                    None
                }
            };
            let (key, value) = match entry {
                Some(entry) if self.increment() => entry,
                _ => {
                    finished = true;
                    break;
                }
            };

            if self.keys {
                bytes_read += key.as_ref().map_or(0, |k| k.len());
                pack.push(key.as_deref())?;
            } else {
                pack.push(None)?;
            }
            if self.values {
                bytes_read += value.as_ref().map_or(0, |v| v.len());
                pack.push(value.as_deref())?;
            } else {
                pack.push(None)?;
            }
            produced += 1;

            if produced >= max_count || bytes_read > self.high_water_mark {
                break;
            }
        }

        Ok(FetchBatch { pack, finished })
    }

    fn close(&mut self) {
        self.closed = true;
        self.cursor = None;
        // Last holder of the snapshot releases the pinned view.
        self.snapshot = None;
    }
}

pub(crate) struct IterShared {
    db: Weak<DbInner>,
    id: u64,
    executor: Arc<TaskExecutor>,
    state: Mutex<IterState>,
}

#[async_trait]
impl Closable for IterShared {
    async fn close(&self) -> Result<()> {
        self.state.lock().await.close();
        Ok(())
    }
}

/// An iterator over a key range of one column family.
///
/// The iterator is created unpositioned. An explicit [`seek`] establishes a
/// position; otherwise the first [`next_batch`] starts from the range's
/// first record in traversal order. Batch fetches run on the database's
/// task executor. Callers must not overlap operations on the same iterator;
/// the iterator does not serialize competing batch fetches beyond keeping
/// its state consistent.
///
/// [`seek`]: RangeIterator::seek
/// [`next_batch`]: RangeIterator::next_batch
pub struct RangeIterator {
    shared: Arc<IterShared>,
}

impl RangeIterator {
    pub(crate) fn create(
        db: &Arc<DbInner>,
        engine: Arc<dyn Engine>,
        snapshot: Option<Arc<dyn EngineSnapshot>>,
        executor: Arc<TaskExecutor>,
        options: &IteratorOptions,
        range: BytesRange,
    ) -> Self {
        let state = IterState {
            engine,
            snapshot,
            column: options.column.unwrap_or(ColumnId::DEFAULT),
            range,
            reverse: options.reverse,
            keys: options.keys,
            values: options.values,
            limit: options.limit,
            count: 0,
            fill_cache: options.fill_cache,
            tailing: options.tailing,
            high_water_mark: options.high_water_mark_bytes,
            cursor: None,
            did_seek: false,
            fresh_seek: false,
            closed: false,
        };
        let shared = Arc::new(IterShared {
            db: Arc::downgrade(db),
            id: db.next_resource_id(),
            executor,
            state: Mutex::new(state),
        });
        db.attach_resource(shared.id, shared.clone());
        Self { shared }
    }

    /// Positions the iterator at `target`, or at the nearest in-range record
    /// in traversal order. A target outside the iterator's bounds exhausts
    /// the iterator.
    pub async fn seek(&self, target: impl AsRef<[u8]>) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        state.seek(target.as_ref()).await
    }

    /// Fetches up to `max_count` records into a packed batch.
    ///
    /// Stops early once the accumulated payload crosses the iterator's high
    /// water mark; the crossing record is still included. Runs on the task
    /// executor.
    pub async fn next_batch(&self, max_count: usize) -> Result<FetchBatch> {
        {
            let state = self.shared.state.lock().await;
            debug_assert!(!state.closed, "next_batch on a closed iterator");
            if state.closed {
                return Err(Error::NotOpen);
            }
        }
        let shared = Arc::clone(&self.shared);
        self.shared
            .executor
            .submit(async move {
                let mut state = shared.state.lock().await;
                state.next_batch(max_count).await
            })
            .join()
            .await
    }

    /// Closes the iterator, releasing its cursor and any pinned snapshot,
    /// and detaches it from the owning database. Idempotent, and safe to
    /// call before the first seek.
    pub async fn close(&self) -> Result<()> {
        self.shared.state.lock().await.close();
        if let Some(db) = self.shared.db.upgrade() {
            db.detach_resource(self.shared.id);
        }
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.shared.state.lock().await.closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use common::EngineConfig;

    use crate::config::{Config, GetManyOptions, WriteOptions};
    use crate::db::Database;
    use crate::WriteBatch;

    use super::*;

    static NEXT_LOCATION: AtomicU64 = AtomicU64::new(1);

    async fn seeded_db(keys: &[&str]) -> Database {
        let db = Database::new(Config {
            engine: EngineConfig {
                location: format!(
                    "iter-test-{}",
                    NEXT_LOCATION.fetch_add(1, Ordering::Relaxed)
                ),
                ..EngineConfig::default()
            },
            worker_threads: None,
        })
        .unwrap();
        db.open().await.unwrap();

        let mut batch = WriteBatch::new();
        for key in keys {
            batch.put(
                Bytes::from(key.to_string()),
                Bytes::from(format!("value-{}", key)),
            );
        }
        db.write(&batch, WriteOptions::default()).await.unwrap();
        db
    }

    /// Unpacks a batch into its (key, value) pairs.
    fn records(batch: &FetchBatch) -> Vec<(Option<Bytes>, Option<Bytes>)> {
        let entries = batch.pack.unpack().unwrap();
        assert_eq!(entries.len() % 2, 0);
        entries
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    fn keys_of(batch: &FetchBatch) -> Vec<Bytes> {
        records(batch)
            .into_iter()
            .map(|(key, _)| key.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn should_scan_full_range_in_key_order() {
        // given
        let db = seeded_db(&["a", "b", "c"]).await;
        let iter = db.iterator(IteratorOptions::default()).await.unwrap();

        // when
        let batch = iter.next_batch(100).await.unwrap();

        // then
        assert!(batch.finished);
        assert_eq!(
            records(&batch),
            vec![
                (Some(Bytes::from("a")), Some(Bytes::from("value-a"))),
                (Some(Bytes::from("b")), Some(Bytes::from("value-b"))),
                (Some(Bytes::from("c")), Some(Bytes::from("value-c"))),
            ]
        );
    }

    #[tokio::test]
    async fn should_honor_bound_inclusivity() {
        // given
        let db = seeded_db(&["a", "b", "c", "d"]).await;
        let iter = db
            .iterator(IteratorOptions {
                gt: Some(Bytes::from("a")),
                lte: Some(Bytes::from("c")),
                ..IteratorOptions::default()
            })
            .await
            .unwrap();

        // when
        let batch = iter.next_batch(100).await.unwrap();

        // then: 'a' excluded, 'c' included
        assert_eq!(keys_of(&batch), vec![Bytes::from("b"), Bytes::from("c")]);
    }

    #[tokio::test]
    async fn should_traverse_in_reverse_order() {
        // given
        let db = seeded_db(&["a", "b", "c"]).await;
        let iter = db
            .iterator(IteratorOptions {
                reverse: true,
                ..IteratorOptions::default()
            })
            .await
            .unwrap();

        // when
        let batch = iter.next_batch(100).await.unwrap();

        // then
        assert_eq!(
            keys_of(&batch),
            vec![Bytes::from("c"), Bytes::from("b"), Bytes::from("a")]
        );
        assert!(batch.finished);
    }

    #[tokio::test]
    async fn should_stop_at_record_limit() {
        // given
        let db = seeded_db(&["a", "b", "c", "d"]).await;
        let iter = db
            .iterator(IteratorOptions {
                limit: 2,
                ..IteratorOptions::default()
            })
            .await
            .unwrap();

        // when
        let batch = iter.next_batch(100).await.unwrap();

        // then: the limit counts records over the iterator's lifetime
        assert_eq!(keys_of(&batch), vec![Bytes::from("a"), Bytes::from("b")]);
        assert!(batch.finished);
    }

    #[tokio::test]
    async fn should_pack_absent_slots_for_suppressed_sides() {
        // given
        let db = seeded_db(&["a"]).await;
        let iter = db
            .iterator(IteratorOptions {
                values: false,
                ..IteratorOptions::default()
            })
            .await
            .unwrap();

        // when
        let batch = iter.next_batch(100).await.unwrap();

        // then
        assert_eq!(records(&batch), vec![(Some(Bytes::from("a")), None)]);
    }

    #[tokio::test]
    async fn should_resume_across_partial_batches() {
        // given
        let db = seeded_db(&["a", "b", "c"]).await;
        let iter = db.iterator(IteratorOptions::default()).await.unwrap();

        // when
        let first = iter.next_batch(2).await.unwrap();
        let second = iter.next_batch(2).await.unwrap();

        // then
        assert_eq!(keys_of(&first), vec![Bytes::from("a"), Bytes::from("b")]);
        assert!(!first.finished);
        assert_eq!(keys_of(&second), vec![Bytes::from("c")]);
        assert!(second.finished);
    }

    #[tokio::test]
    async fn should_include_record_that_crosses_high_water_mark() {
        // given: each value is 16 bytes, so the second record crosses a
        // 24-byte cap and still lands in the batch
        let db = seeded_db(&[]).await;
        let mut batch = WriteBatch::new();
        for key in ["a", "b", "c"] {
            batch.put(Bytes::from(key), Bytes::from(vec![0u8; 16]));
        }
        db.write(&batch, WriteOptions::default()).await.unwrap();

        let iter = db
            .iterator(IteratorOptions {
                keys: false,
                high_water_mark_bytes: 24,
                ..IteratorOptions::default()
            })
            .await
            .unwrap();

        // when
        let first = iter.next_batch(100).await.unwrap();
        let second = iter.next_batch(100).await.unwrap();

        // then
        assert_eq!(records(&first).len(), 2);
        assert!(!first.finished);
        assert_eq!(records(&second).len(), 1);
        assert!(second.finished);
    }

    #[tokio::test]
    async fn should_resume_from_seek_target() {
        // given
        let db = seeded_db(&["a", "b", "c", "d"]).await;
        let iter = db.iterator(IteratorOptions::default()).await.unwrap();

        // when: the seeked record is the first one yielded
        iter.seek("b").await.unwrap();
        let batch = iter.next_batch(100).await.unwrap();

        // then
        assert_eq!(
            keys_of(&batch),
            vec![Bytes::from("b"), Bytes::from("c"), Bytes::from("d")]
        );
    }

    #[tokio::test]
    async fn should_seek_to_nearest_record_in_traversal_order() {
        // given: no exact match for the target
        let db = seeded_db(&["a", "c"]).await;
        let forward = db.iterator(IteratorOptions::default()).await.unwrap();
        let backward = db
            .iterator(IteratorOptions {
                reverse: true,
                ..IteratorOptions::default()
            })
            .await
            .unwrap();

        // when
        forward.seek("b").await.unwrap();
        backward.seek("b").await.unwrap();

        // then
        assert_eq!(keys_of(&forward.next_batch(1).await.unwrap()), vec![Bytes::from("c")]);
        assert_eq!(keys_of(&backward.next_batch(1).await.unwrap()), vec![Bytes::from("a")]);
    }

    #[tokio::test]
    async fn should_exhaust_on_out_of_bounds_seek() {
        // given
        let db = seeded_db(&["a", "b", "c"]).await;
        let iter = db
            .iterator(IteratorOptions {
                lte: Some(Bytes::from("b")),
                ..IteratorOptions::default()
            })
            .await
            .unwrap();

        // when: the target lies past the iterator's upper bound
        iter.seek("c").await.unwrap();
        let batch = iter.next_batch(100).await.unwrap();

        // then: exhausted, never repositioned back into the range
        assert!(batch.finished);
        assert!(batch.pack.is_empty());
    }

    #[tokio::test]
    async fn should_reject_conflicting_bounds_at_creation() {
        // given
        let db = seeded_db(&[]).await;

        // when
        let result = db
            .iterator(IteratorOptions {
                gt: Some(Bytes::from("a")),
                gte: Some(Bytes::from("a")),
                ..IteratorOptions::default()
            })
            .await;

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn should_pin_view_against_later_writes_by_default() {
        // given
        let db = seeded_db(&["a"]).await;
        let pinned = db.iterator(IteratorOptions::default()).await.unwrap();
        let tailing = db
            .iterator(IteratorOptions {
                tailing: true,
                ..IteratorOptions::default()
            })
            .await
            .unwrap();

        // when: a write lands after both iterators were created
        let mut batch = WriteBatch::new();
        batch.put(Bytes::from("b"), Bytes::from("late"));
        db.write(&batch, WriteOptions::default()).await.unwrap();

        // then
        assert_eq!(keys_of(&pinned.next_batch(100).await.unwrap()), vec![Bytes::from("a")]);
        assert_eq!(
            keys_of(&tailing.next_batch(100).await.unwrap()),
            vec![Bytes::from("a"), Bytes::from("b")]
        );
    }

    #[tokio::test]
    async fn should_close_idempotently_and_detach() {
        // given
        let db = seeded_db(&["a"]).await;
        let iter = db.iterator(IteratorOptions::default()).await.unwrap();

        // when
        iter.close().await.unwrap();
        iter.close().await.unwrap();

        // then: the database closes cleanly with the iterator gone
        assert!(iter.is_closed().await);
        assert!(db.close().await.is_ok());
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "next_batch on a closed iterator")]
    async fn should_panic_on_fetch_after_close_in_debug() {
        let db = seeded_db(&["a"]).await;
        let iter = db.iterator(IteratorOptions::default()).await.unwrap();
        iter.close().await.unwrap();

        let _ = iter.next_batch(1).await;
    }

    #[tokio::test]
    async fn should_read_latest_data_through_get_many_while_iterating() {
        // given: iteration holds a pinned view, point reads do not reuse it
        let db = seeded_db(&["a"]).await;
        let _iter = db.iterator(IteratorOptions::default()).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.put(Bytes::from("a"), Bytes::from("updated"));
        db.write(&batch, WriteOptions::default()).await.unwrap();

        // when
        let pack = db
            .get_many(vec![Bytes::from("a")], GetManyOptions::default())
            .await
            .unwrap();

        // then
        assert_eq!(pack.unpack().unwrap(), vec![Some(Bytes::from("updated"))]);
    }

    #[test]
    fn should_encode_inclusive_bounds_directly() {
        // given
        let gte = Some(Bytes::from("a"));
        let lt = Some(Bytes::from("m"));

        // when
        let range = encode_bounds(&None, &gte, &lt, &None).unwrap();

        // then
        assert!(range.contains(b"a"));
        assert!(range.contains(b"l"));
        assert!(!range.contains(b"m"));
    }

    #[test]
    fn should_encode_exclusive_lower_bound_as_successor() {
        // when
        let range = encode_bounds(&Some(Bytes::from("a")), &None, &None, &None).unwrap();

        // then
        assert!(!range.contains(b"a"));
        assert!(range.contains(b"a\x00"));
        assert!(range.contains(b"b"));
    }

    #[test]
    fn should_encode_inclusive_upper_bound_as_successor() {
        // when
        let range = encode_bounds(&None, &None, &None, &Some(Bytes::from("m"))).unwrap();

        // then
        assert!(range.contains(b"m"));
        assert!(!range.contains(b"m\x00"));
        assert!(!range.contains(b"n"));
    }

    #[test]
    fn should_reject_conflicting_lower_bounds() {
        // when
        let result = encode_bounds(
            &Some(Bytes::from("a")),
            &Some(Bytes::from("b")),
            &None,
            &None,
        );

        // then
        assert_eq!(
            result.unwrap_err(),
            Error::InvalidInput("gt and gte are mutually exclusive".to_string())
        );
    }

    #[test]
    fn should_reject_conflicting_upper_bounds() {
        // when
        let result = encode_bounds(
            &None,
            &None,
            &Some(Bytes::from("y")),
            &Some(Bytes::from("z")),
        );

        // then
        assert!(result.is_err());
    }
}
