//! Pixel time model and temporal match-up windows.

use chrono::{DateTime, TimeDelta, Utc};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Linear per-scanline time model of a raster product.
///
/// `time(y) = start + floor(y) * (end - start) / (height - 1)`, computed in
/// whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelTimeProvider {
    start_ms: i64,
    span_ms: i64,
    last_line: i64,
}

impl PixelTimeProvider {
    /// Build a time model. Returns `None` if a bound is missing or the
    /// raster has fewer than two scanlines.
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        height: usize,
    ) -> Option<Self> {
        let (start, end) = (start?, end?);
        if height < 2 {
            return None;
        }
        Some(Self {
            start_ms: start.timestamp_millis(),
            span_ms: end.timestamp_millis() - start.timestamp_millis(),
            last_line: height as i64 - 1,
        })
    }

    /// Time of the scanline containing pixel row `y`.
    pub fn time(&self, y: f64) -> DateTime<Utc> {
        let line = y.floor() as i128;
        let offset = (line * self.span_ms as i128).div_euclid(self.last_line as i128);
        from_millis(self.start_ms + offset as i64)
    }
}

/// Convert epoch milliseconds to a UTC timestamp, saturating at chrono's range.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(if ms < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Criterion deciding whether an EO time is close enough to a reference time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeCriterion {
    /// EO time within reference time +/- the given number of hours (inclusive).
    Hours(f64),
    /// EO time within the reference's local solar calendar day, extended by
    /// the given number of extra days on each side.
    CalendarDays(u32),
}

impl TimeCriterion {
    /// Interpret the signed single-field convention: a non-negative value is
    /// an hour tolerance, a negative value `-n` selects the calendar-day
    /// window with `n - 1` extra days (so `-1` is the same local day).
    /// Returns `None` for NaN and infinite values.
    pub fn from_signed(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        if value >= 0.0 {
            Some(TimeCriterion::Hours(value))
        } else {
            let days = value.abs().round().clamp(1.0, u32::MAX as f64) as u32;
            Some(TimeCriterion::CalendarDays(days - 1))
        }
    }

    /// Inclusive admissible EO time range for a reference taken at `time`
    /// and longitude `lon`.
    pub fn window(&self, time: DateTime<Utc>, lon: f64) -> (DateTime<Utc>, DateTime<Utc>) {
        let (min, max) = self.window_millis(time.timestamp_millis(), lon);
        (from_millis(min), from_millis(max))
    }

    fn window_millis(&self, t: i64, lon: f64) -> (i64, i64) {
        match *self {
            TimeCriterion::Hours(hours) => {
                let delta = (hours * HOUR_MS as f64).round() as i64;
                (t.saturating_sub(delta), t.saturating_add(delta))
            }
            TimeCriterion::CalendarDays(extra_days) => {
                let midnight = local_midnight_utc(t, lon);
                let extra = extra_days as i64 * DAY_MS;
                (midnight - extra, midnight + DAY_MS + extra)
            }
        }
    }

    /// True if `eo_time` lies inside the admissible window.
    pub fn accepts(&self, reference_time: DateTime<Utc>, lon: f64, eo_time: DateTime<Utc>) -> bool {
        let (min, max) = self.window(reference_time, lon);
        eo_time >= min && eo_time <= max
    }
}

/// UTC instant of the local solar midnight starting the day that contains `t_ms`.
///
/// Local solar time is UTC shifted by `lon / 15` hours, truncated to whole
/// milliseconds.
pub fn local_midnight_utc(t_ms: i64, lon: f64) -> i64 {
    let shift = (lon * 24.0 / 360.0 * HOUR_MS as f64) as i64;
    let local = t_ms + shift;
    t_ms - local.rem_euclid(DAY_MS)
}

/// Absolute difference of two timestamps.
#[inline]
pub fn abs_difference(a: DateTime<Utc>, b: DateTime<Utc>) -> TimeDelta {
    (a - b).abs()
}
