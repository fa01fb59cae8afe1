//! Run configuration for a match-up extraction.
//!
//! A [`MatchupConfig`] is plain data, built once per run and passed by
//! reference to every stage. It is usually deserialised from JSON and must
//! pass [`MatchupConfig::validate`] before any record is processed.

use crate::error::{MatchupError, Result};
use crate::time::TimeCriterion;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Default edge length of the macro pixel.
pub const DEFAULT_MACRO_PIXEL_SIZE: usize = 5;

/// Largest accepted macro pixel edge length.
pub const MAX_MACRO_PIXEL_SIZE: usize = 1024;

/// Default sigma-clipping coefficient.
pub const DEFAULT_FILTERED_MEAN_COEFFICIENT: f64 = 1.5;

/// Default round-trip geolocation tolerance in pixels.
pub const DEFAULT_PIXEL_DISPLACEMENT_TOLERANCE: f64 = 5.0;

/// How macro-pixel arrays are turned into output records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One record per macro pixel with statistics per array attribute.
    #[default]
    Aggregate,
    /// One record per good pixel of the macro pixel.
    Explode,
}

/// Configuration of one match-up run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchupConfig {
    /// Edge length N of the N x N macro pixel.
    pub macro_pixel_size: usize,
    pub mode: Mode,
    /// Maximum EO/reference time difference in hours.
    pub max_time_difference_hours: Option<f64>,
    /// Calendar-day window: number of extra local days accepted on each side.
    pub max_calendar_day_difference: Option<u32>,
    pub good_pixel_expression: Option<String>,
    pub good_record_expression: Option<String>,
    /// Sigma-clipping coefficient k; 0 disables clipping.
    pub filtered_mean_coefficient: f64,
    pub filter_overlapping: bool,
    pub copy_input: bool,
    /// Maximum forward/inverse geolocation displacement; negative disables the check.
    pub pixel_displacement_tolerance: f64,
}

impl Default for MatchupConfig {
    fn default() -> Self {
        Self {
            macro_pixel_size: DEFAULT_MACRO_PIXEL_SIZE,
            mode: Mode::Aggregate,
            max_time_difference_hours: None,
            max_calendar_day_difference: None,
            good_pixel_expression: None,
            good_record_expression: None,
            filtered_mean_coefficient: DEFAULT_FILTERED_MEAN_COEFFICIENT,
            filter_overlapping: false,
            copy_input: true,
            pixel_displacement_tolerance: DEFAULT_PIXEL_DISPLACEMENT_TOLERANCE,
        }
    }
}

impl MatchupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a configuration from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: MatchupConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MatchupConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the signed single-value time convention: non-negative values
    /// are hours, negative values select a calendar-day window.
    ///
    /// Fails with a configuration error for NaN or infinite values.
    pub fn with_signed_max_time_difference(mut self, value: f64) -> Result<Self> {
        let criterion = TimeCriterion::from_signed(value).ok_or_else(|| {
            MatchupError::Config(format!(
                "max time difference must be a finite number, got {}",
                value
            ))
        })?;
        match criterion {
            TimeCriterion::Hours(h) => {
                self.max_time_difference_hours = Some(h);
                self.max_calendar_day_difference = None;
            }
            TimeCriterion::CalendarDays(d) => {
                self.max_time_difference_hours = None;
                self.max_calendar_day_difference = Some(d);
            }
        }
        Ok(self)
    }

    /// The configured time criterion, if any.
    pub fn time_criterion(&self) -> Option<TimeCriterion> {
        match (self.max_time_difference_hours, self.max_calendar_day_difference) {
            (Some(h), _) => Some(TimeCriterion::Hours(h)),
            (None, Some(d)) => Some(TimeCriterion::CalendarDays(d)),
            (None, None) => None,
        }
    }

    /// Good-pixel expression, ignoring blank strings.
    pub fn good_pixel_expression(&self) -> Option<&str> {
        non_blank(self.good_pixel_expression.as_deref())
    }

    /// Good-record expression, ignoring blank strings.
    pub fn good_record_expression(&self) -> Option<&str> {
        non_blank(self.good_record_expression.as_deref())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_MACRO_PIXEL_SIZE).contains(&self.macro_pixel_size) {
            return Err(MatchupError::Config(format!(
                "macro_pixel_size must be in 1..={}, got {}",
                MAX_MACRO_PIXEL_SIZE, self.macro_pixel_size
            )));
        }
        if !self.filtered_mean_coefficient.is_finite() || self.filtered_mean_coefficient < 0.0 {
            return Err(MatchupError::Config(format!(
                "filtered_mean_coefficient must be a finite value >= 0, got {}",
                self.filtered_mean_coefficient
            )));
        }
        if let Some(hours) = self.max_time_difference_hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(MatchupError::Config(format!(
                    "max_time_difference_hours must be a finite value >= 0, got {}",
                    hours
                )));
            }
            if self.max_calendar_day_difference.is_some() {
                return Err(MatchupError::Config(
                    "max_time_difference_hours and max_calendar_day_difference are mutually exclusive"
                        .to_string(),
                ));
            }
        }
        if self.pixel_displacement_tolerance.is_nan() {
            return Err(MatchupError::Config(
                "pixel_displacement_tolerance must be a number".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|e| !e.trim().is_empty())
}
