use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::prelude::{CoreError, CoreResult};

use super::SessionStore;

/// Sled-backed durable session store.
///
/// Every record is prefixed with its expiry deadline (unix seconds, big
/// endian) so stale entries can be dropped lazily on read or in bulk by
/// `sweep`.
pub struct SledSessionStore {
    db: sled::Db,
}

impl SledSessionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let db = sled::open(path)
            .map_err(|err| CoreError::Store(format!("opening store: {}", err)))?;
        Ok(Self { db })
    }

    /// Temporary store for tests.
    pub fn open_temp() -> CoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|err| CoreError::Store(format!("opening temp store: {}", err)))?;
        Ok(Self { db })
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }

    fn encode(value: &[u8], ttl: Duration) -> Vec<u8> {
        let deadline = Self::now_secs().saturating_add(ttl.as_secs());
        let mut record = Vec::with_capacity(8 + value.len());
        record.extend_from_slice(&deadline.to_be_bytes());
        record.extend_from_slice(value);
        record
    }

    fn decode(record: &[u8]) -> Option<Vec<u8>> {
        let deadline_bytes: [u8; 8] = record.get(..8)?.try_into().ok()?;
        let deadline = u64::from_be_bytes(deadline_bytes);
        if deadline <= Self::now_secs() {
            return None;
        }
        Some(record[8..].to_vec())
    }
}

impl SessionStore for SledSessionStore {
    fn put(&self, key: &str, value: &[u8], ttl: Duration) -> CoreResult<()> {
        self.db
            .insert(key.as_bytes(), Self::encode(value, ttl))
            .map_err(|err| CoreError::Store(format!("writing {}: {}", key, err)))?;
        Ok(())
    }

    fn fetch(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        let record = self
            .db
            .get(key.as_bytes())
            .map_err(|err| CoreError::Store(format!("reading {}: {}", key, err)))?;
        match record {
            Some(bytes) => match Self::decode(&bytes) {
                Some(value) => Ok(Some(value)),
                None => {
                    let _ = self.db.remove(key.as_bytes());
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn sweep(&self) -> CoreResult<usize> {
        let mut removed = 0;
        for entry in self.db.iter() {
            let (key, value) =
                entry.map_err(|err| CoreError::Store(format!("sweeping: {}", err)))?;
            if Self::decode(&value).is_none() {
                self.db
                    .remove(&key)
                    .map_err(|err| CoreError::Store(format!("sweeping: {}", err)))?;
                removed += 1;
            }
        }
        self.db
            .flush()
            .map_err(|err| CoreError::Store(format!("flushing: {}", err)))?;
        Ok(removed)
    }
}
