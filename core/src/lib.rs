//! Session filtering, frame buffering, and 3-D figure assembly for the Rust
//! DetView platform.
//!
//! The modules mirror the legacy dashboard pipeline while providing
//! structured configuration, a durable session cache, and well-defined
//! buffering stages.

pub mod buffer;
pub mod config;
pub mod dataset;
pub mod figure;
pub mod filter;
pub mod frames;
pub mod playback;
pub mod prelude;
pub mod session;
pub mod store;
pub mod table;
pub mod telemetry;

pub use prelude::{CoreError, CoreResult};
