//! Overlap deduplication of match-up candidates.
//!
//! Candidates arrive sorted by row, then column. Each one is compared with
//! the active candidates whose macro-pixel windows overlap it; of two
//! overlapping candidates the one further away in time from its EO
//! acquisition is annotated `OVERLAPPING`. Annotated records stay in the
//! output stream.

use crate::error::Result;
use crate::raster::PixelPos;
use crate::record::Record;
use crate::streaming::{ActiveSet, SortValidator};
use crate::window::MacroPixelWindow;
use chrono::TimeDelta;
use log::debug;
use std::cmp::Ordering;

/// Exclusion reason for candidates shadowed by a closer-in-time neighbor.
pub const EXCLUSION_REASON_OVERLAPPING: &str = "OVERLAPPING";

/// Output records of one resolved reference point.
#[derive(Debug)]
struct Candidate {
    row: i64,
    window: MacroPixelWindow,
    time_difference: Option<TimeDelta>,
    /// False for candidates that were fully excluded on arrival.
    contending: bool,
    records: Vec<Record>,
}

impl Candidate {
    fn mark_overlapping(&mut self) -> usize {
        let mut marked = 0;
        for record in self.records.iter_mut().filter(|r| !r.is_excluded()) {
            record.set_exclusion_reason(EXCLUSION_REASON_OVERLAPPING);
            marked += 1;
        }
        marked
    }
}

/// Unknown time differences compare as larger than any known one.
fn compare_time_difference(a: Option<TimeDelta>, b: Option<TimeDelta>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Streaming plane-sweep selector.
///
/// # Memory Complexity
///
/// O(w) where w = candidates within `macro_pixel_size` rows of the current one.
#[derive(Debug)]
pub struct OverlapSelector {
    macro_pixel_size: usize,
    active: ActiveSet<Candidate>,
    validator: SortValidator,
    marked: usize,
}

impl OverlapSelector {
    pub fn new(macro_pixel_size: usize) -> Self {
        Self {
            macro_pixel_size,
            active: ActiveSet::new(),
            validator: SortValidator::new(),
            marked: 0,
        }
    }

    /// Add the records of one candidate and return the records that can no
    /// longer be affected by later candidates.
    ///
    /// Fails with a data-integrity error if candidates arrive out of order.
    pub fn push(
        &mut self,
        pixel_pos: PixelPos,
        time_difference: Option<TimeDelta>,
        records: Vec<Record>,
    ) -> Result<Vec<Record>> {
        self.validator.validate(pixel_pos)?;

        let mut incoming = Candidate {
            row: pixel_pos.row(),
            window: MacroPixelWindow::new(pixel_pos, self.macro_pixel_size),
            time_difference,
            contending: records.iter().any(|r| !r.is_excluded()),
            records,
        };

        if incoming.contending {
            let mut incoming_loses = false;
            for contender in self
                .active
                .iter_mut()
                .filter(|c| c.contending && c.window.overlaps(&incoming.window))
            {
                match compare_time_difference(incoming.time_difference, contender.time_difference) {
                    Ordering::Less => self.marked += contender.mark_overlapping(),
                    _ => incoming_loses = true,
                }
            }
            if incoming_loses {
                self.marked += incoming.mark_overlapping();
            }
        }

        let current_row = incoming.row;
        self.active.push(incoming);

        let n = self.macro_pixel_size as i64;
        let mut evicted = Vec::new();
        self.active
            .evict_while(|c| current_row - c.row > n, &mut evicted);
        Ok(evicted.into_iter().flat_map(|c| c.records).collect())
    }

    /// Flush every remaining candidate, in insertion order.
    pub fn finish(mut self) -> Vec<Record> {
        debug!(
            "overlap selection: {} candidates validated, {} records marked, max active {}",
            self.validator.record_count(),
            self.marked,
            self.active.max_active()
        );
        self.active.drain_all().flat_map(|c| c.records).collect()
    }

    /// Number of records annotated `OVERLAPPING` so far.
    pub fn marked(&self) -> usize {
        self.marked
    }
}
