use serde::{Deserialize, Serialize};

use crate::prelude::{CoreError, CoreResult};
use crate::table::DetectionTable;

/// Sorted distinct frame keys of the active dataset; positions index into
/// this sequence and define the slider domain `[0, len - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSequence {
    keys: Vec<f64>,
}

impl FrameSequence {
    pub fn from_table(table: &DetectionTable, slider_key: &str) -> CoreResult<Self> {
        let keys = table.distinct_numeric_sorted(slider_key).ok_or_else(|| {
            CoreError::InvalidInput(format!("unknown slider key {}", slider_key))
        })?;
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[f64] {
        &self.keys
    }

    pub fn key_at(&self, position: usize) -> Option<f64> {
        self.keys.get(position).copied()
    }

    pub fn last_position(&self) -> Option<usize> {
        self.keys.len().checked_sub(1)
    }
}

/// Wraparound step shared by manual prev/next and the autoplay timer:
/// `(current + direction) mod (max + 1)`, so playback loops instead of
/// stopping at either boundary.
pub fn next_position(current: usize, max: usize, direction: i64) -> usize {
    let span = max as i64 + 1;
    (current as i64 + direction).rem_euclid(span) as usize
}

/// Autoplay tick: holds in place while the current position is past the
/// buffered ready index so playback cannot outrun the background buffer.
pub fn advance_autoplay(current: usize, max: usize, ready_index: i64) -> Option<usize> {
    if current as i64 > ready_index {
        None
    } else {
        Some(next_position(current, max, 1))
    }
}
