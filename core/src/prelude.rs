/// Common error type for core operations.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("store failure: {0}")]
    Store(String),
    #[error("dataset failure: {0}")]
    Dataset(String),
    #[error("config failure: {0}")]
    Config(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("session not initialized: {0}")]
    MissingState(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;

pub use crate::config::{KeyConfig, KeyKind, UiConfig};
pub use crate::filter::{filter_table, FilterSpec, Visibility, VisibilityMask};
pub use crate::frames::{next_position, FrameSequence};
pub use crate::store::{CacheKey, SessionCache, SessionStore, SledSessionStore};
pub use crate::table::{Column, DetectionTable};
