// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]

//! calmatch: match-up extraction for calibration and validation.
//!
//! Matches ground-truth point observations against remote-sensing raster
//! products and produces, per matching point, the N x N macro pixel of
//! band values around it, either aggregated into statistics or exploded
//! into one record per good pixel.
//!
//! # Features
//!
//! - **Spatio-temporal matching**: geolocation round-trip check, hour or
//!   local calendar-day time windows
//! - **Filtering**: good-pixel mask, good-record expression, overlap
//!   deduplication by a streaming plane sweep
//! - **Parallel processing**: several products at once on a Rayon pool
//!
//! # Example
//!
//! ```rust,no_run
//! use calmatch::prelude::*;
//!
//! let config = MatchupConfig::from_path("matchup.json").unwrap();
//! let raster = MemoryRaster::from_path("scene.json").unwrap();
//! let mut points = TsvRecordSource::from_path("insitu.txt").unwrap();
//!
//! let output = extract(&mut points, &raster, &config, &NoExpressions).unwrap();
//! println!("{}", output.stats);
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod overlap;
pub mod parallel;
pub mod pipeline;
pub mod position;
pub mod raster;
pub mod record;
pub mod reference;
pub mod stats;
pub mod streaming;
pub mod time;
pub mod transform;
pub mod window;

// Re-export commonly used types
pub use config::{MatchupConfig, Mode};
pub use error::{MatchupError, Result};
pub use pipeline::{extract, MatchupOutput, MatchupStats, Pipeline};
pub use record::{AttributeValue, GeoPos, Header, Record};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{MatchupConfig, Mode};
    pub use crate::error::{MatchupError, Result};
    pub use crate::filter::{ExpressionCompiler, NoExpressions, Predicate};
    pub use crate::parallel::{extract_products, ProductOutcome};
    pub use crate::pipeline::{extract, MatchupOutput, MatchupStats, Pipeline};
    pub use crate::raster::{GridGeoCoding, MemoryRaster, PixelPos, RasterSource};
    pub use crate::record::{AttributeValue, GeoPos, Header, Record};
    pub use crate::reference::{ReferenceSource, TsvRecordSource, VecRecordSource};
    pub use crate::stats::AggregatedNumber;
    pub use crate::streaming::RecordWriter;
    pub use crate::time::TimeCriterion;
}
