//! Sort validation for streaming operations.
//!
//! The overlap sweep requires candidates sorted by truncated row, then by
//! fractional column. Order is checked inline while streaming so the input
//! is never traversed twice.

use crate::error::{MatchupError, Result};
use crate::raster::PixelPos;

/// Inline sort validator for use within streaming loops.
///
/// Validates that:
/// 1. Rows are non-decreasing
/// 2. Within a row, columns are non-decreasing
#[derive(Debug, Default)]
pub struct SortValidator {
    prev: Option<(i64, f64)>,
    record_count: usize,
}

impl SortValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate that `pos` keeps the row/column order.
    #[inline]
    pub fn validate(&mut self, pos: PixelPos) -> Result<()> {
        self.record_count += 1;
        let row = pos.row();

        if let Some((prev_row, prev_x)) = self.prev {
            if row < prev_row {
                return Err(MatchupError::DataIntegrity(format!(
                    "candidates not sorted: row {} at candidate {} comes after row {}",
                    row, self.record_count, prev_row
                )));
            }
            if row == prev_row && pos.x < prev_x {
                return Err(MatchupError::DataIntegrity(format!(
                    "candidates not sorted: column {} at candidate {} comes after {} in row {}",
                    pos.x, self.record_count, prev_x, row
                )));
            }
        }

        self.prev = Some((row, pos.x));
        Ok(())
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.record_count = 0;
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }
}
