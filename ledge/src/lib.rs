//! Client layer over an embedded ordered key-value engine.
//!
//! A [`Database`] owns one opened engine location and hands out the
//! resources built on top of it: [`RangeIterator`]s for bounded scans,
//! [`WriteBatch`]es for atomic multi-operation writes, and grouped point
//! reads via [`Database::get_many`]. Engine work runs on a
//! [`TaskExecutor`], off the calling context, and batched results cross the
//! API as flat [`BufferPack`]s.
//!
//! Opening and closing are idempotent. Closing a database tears down its
//! attached resources first, and [`close_remaining`] closes every database
//! still open in the process.

mod batch;
mod codec;
mod config;
mod db;
mod error;
mod executor;
mod iterator;
mod shutdown;

pub use batch::{BatchRecord, WriteBatch};
pub use codec::{BufferPack, ABSENT};
pub use config::{
    ClearOptions, Config, GetManyOptions, IterateOptions, IteratorOptions, WriteOptions,
};
pub use db::{Closable, Database};
pub use error::{Error, Result};
pub use executor::{TaskExecutor, TaskHandle};
pub use iterator::{FetchBatch, RangeIterator};
pub use shutdown::close_remaining;
