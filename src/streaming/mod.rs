//! Streaming utilities shared by the reference reader, the overlap sweep
//! and the record writer:
//! - memchr-based TSV field parsing
//! - Sort validation of swept candidates
//! - itoa/ryu output formatting
//! - Active set management with automatic compaction
//!
//! The overlap sweep keeps O(k) memory where k = max candidates within
//! one macro-pixel height of the current row.

pub mod active_set;
pub mod output;
pub mod parsing;
pub mod validation;

pub use active_set::ActiveSet;
pub use output::RecordWriter;
pub use parsing::{parse_f64_field, parse_time_field, should_skip_line, split_fields, trim_line_end};
pub use validation::SortValidator;
