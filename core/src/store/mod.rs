pub mod sled_store;

pub use sled_store::SledSessionStore;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::prelude::{CoreError, CoreResult};

/// Default record lifetime: two days, refreshed on every write.
pub const DEFAULT_TTL: Duration = Duration::from_secs(172_800);

/// Per-session cache key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    Config,
    Dataset,
    FrameList,
    FrameData,
    VisibleTable,
    FilterState,
    FigureIdx,
    Figure,
    Hover,
    FigureRef,
    FigureLayout,
    TaskId,
    SelectedData,
}

impl CacheKey {
    fn as_str(self) -> &'static str {
        match self {
            CacheKey::Config => "CONFIG",
            CacheKey::Dataset => "DATASET",
            CacheKey::FrameList => "FRAME_LIST",
            CacheKey::FrameData => "FRAME_DATA",
            CacheKey::VisibleTable => "VIS_TABLE",
            CacheKey::FilterState => "FILTER_STATE",
            CacheKey::FigureIdx => "FIGURE_IDX",
            CacheKey::Figure => "FIGURE",
            CacheKey::Hover => "HOVER",
            CacheKey::FigureRef => "FIGURE_REF",
            CacheKey::FigureLayout => "FIGURE_LAYOUT",
            CacheKey::TaskId => "TASK_ID",
            CacheKey::SelectedData => "SELECTED_DATA",
        }
    }
}

/// Backend contract for the durable session store. Values are opaque
/// blobs; structure is owned by callers. Single-key reads and writes are
/// atomic, nothing spans keys.
pub trait SessionStore: Send + Sync {
    fn put(&self, key: &str, value: &[u8], ttl: Duration) -> CoreResult<()>;
    fn fetch(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;
    /// Removes expired records, returning how many were dropped.
    fn sweep(&self) -> CoreResult<usize>;
}

/// Explicitly constructed cache handle, passed to whichever component
/// needs session state. Encodes values as JSON under
/// `<session>/<KEY>[/<subkey>]` key strings.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key_str(session: &str, key: CacheKey, subkey: Option<&str>) -> String {
        match subkey {
            Some(sub) => format!("{}/{}/{}", session, key.as_str(), sub),
            None => format!("{}/{}", session, key.as_str()),
        }
    }

    pub fn set_json<T: Serialize>(
        &self,
        session: &str,
        key: CacheKey,
        subkey: Option<&str>,
        value: &T,
    ) -> CoreResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|err| CoreError::Store(format!("encoding {:?}: {}", key, err)))?;
        self.store
            .put(&Self::key_str(session, key, subkey), &bytes, self.ttl)
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        session: &str,
        key: CacheKey,
        subkey: Option<&str>,
    ) -> CoreResult<Option<T>> {
        match self.store.fetch(&Self::key_str(session, key, subkey))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|err| CoreError::Store(format!("decoding {:?}: {}", key, err))),
            None => Ok(None),
        }
    }

    pub fn sweep(&self) -> CoreResult<usize> {
        self.store.sweep()
    }

    /// The session's live buffering task id; 0 before any invalidation.
    pub fn task_id(&self, session: &str) -> CoreResult<u64> {
        Ok(self
            .get_json::<u64>(session, CacheKey::TaskId, None)?
            .unwrap_or(0))
    }

    /// Increments the task id, superseding any in-flight buffer run.
    pub fn bump_task_id(&self, session: &str) -> CoreResult<u64> {
        let next = self.task_id(session)? + 1;
        self.set_json(session, CacheKey::TaskId, None, &next)?;
        Ok(next)
    }

    /// Highest buffered frame position, -1 when nothing is ready.
    pub fn ready_index(&self, session: &str) -> CoreResult<i64> {
        Ok(self
            .get_json::<i64>(session, CacheKey::FigureIdx, None)?
            .unwrap_or(-1))
    }

    pub fn set_ready_index(&self, session: &str, index: i64) -> CoreResult<()> {
        self.set_json(session, CacheKey::FigureIdx, None, &index)
    }
}
