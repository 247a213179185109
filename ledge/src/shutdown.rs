//! Process-wide registry of open databases.
//!
//! Every successful open registers the database here, and a clean close
//! deregisters it. An embedder tearing down the process calls
//! [`close_remaining`] to close whatever is still open, in unspecified
//! order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use crate::db::{Database, DbInner};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static Mutex<HashMap<u64, Weak<DbInner>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, Weak<DbInner>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn register(inner: &Arc<DbInner>) -> u64 {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(token, Arc::downgrade(inner));
    token
}

pub(crate) fn deregister(token: u64) {
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&token);
}

/// Closes every database that is still open.
///
/// Close failures are logged and swallowed so one stuck database does not
/// keep the rest open. Databases closed concurrently are skipped; closing is
/// idempotent either way.
pub async fn close_remaining() {
    let remaining: Vec<Weak<DbInner>> = {
        let mut map = registry()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.drain().map(|(_, weak)| weak).collect()
    };
    for weak in remaining {
        let Some(inner) = weak.upgrade() else {
            continue;
        };
        let db = Database { inner };
        if let Err(error) = db.close().await {
            tracing::warn!(%error, location = %db.location(), "failed to close database at shutdown");
        }
    }
}

