//! Spatio-temporal resolution of reference records onto a raster.

use crate::raster::{PixelPos, RasterSource};
use crate::record::Record;
use crate::time::{PixelTimeProvider, TimeCriterion};
use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use std::cmp::Ordering;

/// A reference record resolved to a raster position.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelPosRecord {
    pixel_pos: PixelPos,
    record: Record,
    eo_time: Option<DateTime<Utc>>,
}

impl PixelPosRecord {
    pub fn new(pixel_pos: PixelPos, record: Record, eo_time: Option<DateTime<Utc>>) -> Self {
        Self {
            pixel_pos,
            record,
            eo_time,
        }
    }

    #[inline]
    pub fn pixel_pos(&self) -> PixelPos {
        self.pixel_pos
    }

    #[inline]
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    /// Time of the scanline the record was found on, if the raster has a time model.
    #[inline]
    pub fn eo_time(&self) -> Option<DateTime<Utc>> {
        self.eo_time
    }

    #[inline]
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.record.time()
    }

    /// |reference time - EO time| if both are known.
    pub fn time_difference(&self) -> Option<TimeDelta> {
        match (self.reference_time(), self.eo_time) {
            (Some(r), Some(e)) => Some((r - e).abs()),
            _ => None,
        }
    }
}

/// Order by truncated row, then by fractional column.
///
/// Rows are compared as integers because geolocation introduces small
/// sub-pixel differences in y for points on the same scanline.
pub fn compare_row_col(a: &PixelPos, b: &PixelPos) -> Ordering {
    a.row()
        .cmp(&b.row())
        .then_with(|| a.x.total_cmp(&b.x))
}

/// Resolves reference records to pixel positions on one raster product.
pub struct PixelPosProvider<'a> {
    raster: &'a dyn RasterSource,
    time_provider: Option<PixelTimeProvider>,
    criterion: Option<TimeCriterion>,
    product_bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
    displacement_tolerance: f64,
}

impl<'a> PixelPosProvider<'a> {
    pub fn new(
        raster: &'a dyn RasterSource,
        criterion: Option<TimeCriterion>,
        displacement_tolerance: f64,
    ) -> Self {
        let time_provider =
            PixelTimeProvider::new(raster.start_time(), raster.end_time(), raster.height());
        let product_bounds = match (raster.start_time(), raster.end_time()) {
            (Some(s), Some(e)) if s <= e => Some((s, e)),
            (Some(s), Some(e)) => Some((e, s)),
            _ => None,
        };
        Self {
            raster,
            time_provider,
            criterion,
            product_bounds,
            displacement_tolerance,
        }
    }

    #[inline]
    pub fn time_provider(&self) -> Option<&PixelTimeProvider> {
        self.time_provider.as_ref()
    }

    /// Resolve one reference record. `None` means the record does not
    /// match this product, which is not an error.
    pub fn resolve(&self, record: Record) -> Option<PixelPosRecord> {
        let criterion = match (self.criterion, record.time(), record.location()) {
            (Some(c), Some(t), Some(loc)) => Some((c, t, loc.lon)),
            _ => None,
        };

        if let Some((c, t, lon)) = criterion {
            // no time model: the criterion cannot be satisfied
            self.time_provider.as_ref()?;
            let (min, max) = c.window(t, lon);
            if let Some((start, end)) = self.product_bounds {
                if min > end || max < start {
                    return None;
                }
            }
            let pixel_pos = self.spatially_valid_pixel_pos(&record)?;
            let eo_time = self.eo_time(pixel_pos)?;
            if eo_time < min || eo_time > max {
                return None;
            }
            return Some(PixelPosRecord::new(pixel_pos, record, Some(eo_time)));
        }

        let pixel_pos = self.spatially_valid_pixel_pos(&record)?;
        let eo_time = self.eo_time(pixel_pos);
        Some(PixelPosRecord::new(pixel_pos, record, eo_time))
    }

    fn eo_time(&self, pixel_pos: PixelPos) -> Option<DateTime<Utc>> {
        self.time_provider.map(|p| p.time(pixel_pos.y))
    }

    fn spatially_valid_pixel_pos(&self, record: &Record) -> Option<PixelPos> {
        let location = record.location()?;
        let pixel_pos = self.raster.pixel_pos(location)?;
        if !pixel_pos.is_valid() || !self.raster.contains(pixel_pos) {
            return None;
        }
        if self.displacement_tolerance < 0.0 {
            return Some(pixel_pos);
        }
        let geo = self.raster.geo_pos(pixel_pos)?;
        let round_trip = self.raster.pixel_pos(geo)?;
        let dx = (pixel_pos.x - round_trip.x).abs();
        let dy = (pixel_pos.y - round_trip.y).abs();
        if dx.max(dy) < self.displacement_tolerance {
            Some(pixel_pos)
        } else {
            debug!(
                "record {} rejected: geolocation round trip displaced by {:.2} pixels",
                record.id(),
                dx.max(dy)
            );
            None
        }
    }

    /// Resolve all records and sort the matches by row, then column.
    pub fn compute_pixel_pos_records<I>(&self, records: I) -> Vec<PixelPosRecord>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut resolved: Vec<PixelPosRecord> =
            records.into_iter().filter_map(|r| self.resolve(r)).collect();
        resolved.sort_by(|a, b| compare_row_col(&a.pixel_pos, &b.pixel_pos));
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::raster::{GridGeoCoding, MemoryRaster, Rect};
    use crate::record::GeoPos;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 0).unwrap()
    }

    /// 10x10 raster, 0.5 degree grid, one scanline per second.
    fn raster() -> MemoryRaster {
        MemoryRaster::new(
            "scene",
            10,
            10,
            GridGeoCoding {
                lat0: 12.0,
                lon0: 18.0,
                lat_step: -0.5,
                lon_step: 0.5,
            },
        )
        .with_time(t0(), t0() + TimeDelta::seconds(9))
    }

    fn reference(id: u64, lat: f64, lon: f64, time: Option<DateTime<Utc>>) -> Record {
        Record::new(id, Some(GeoPos::new(lat, lon)), time, vec![])
    }

    #[test]
    fn test_spatial_resolution_without_time() {
        let r = raster();
        let p = PixelPosProvider::new(&r, None, 5.0);
        let pp = p.resolve(reference(1, 10.0, 20.0, None)).unwrap();
        assert_eq!(pp.pixel_pos(), PixelPos::new(4.0, 4.0));
        assert_eq!(pp.eo_time(), Some(t0() + TimeDelta::seconds(4)));
        assert!(pp.time_difference().is_none());
    }

    #[test]
    fn test_rejects_outside_raster_and_missing_location() {
        let r = raster();
        let p = PixelPosProvider::new(&r, None, 5.0);
        assert!(p.resolve(reference(1, 20.0, 20.0, None)).is_none());
        assert!(p.resolve(reference(2, 10.0, 17.9, None)).is_none());
        assert!(p.resolve(Record::new(3, None, None, vec![])).is_none());
    }

    #[test]
    fn test_temporal_boundary_inclusive() {
        let r = raster();
        let p = PixelPosProvider::new(&r, Some(TimeCriterion::Hours(1.0)), 5.0);
        // row 4 has EO time t0 + 4 s
        let eo = t0() + TimeDelta::seconds(4);
        let at_edge = eo - TimeDelta::hours(1);
        assert!(p.resolve(reference(1, 10.0, 20.0, Some(at_edge))).is_some());
        let beyond = at_edge - TimeDelta::milliseconds(1);
        assert!(p.resolve(reference(2, 10.0, 20.0, Some(beyond))).is_none());
    }

    #[test]
    fn test_range_prefilter() {
        let r = raster();
        let p = PixelPosProvider::new(&r, Some(TimeCriterion::Hours(1.0)), 5.0);
        let late = t0() + TimeDelta::hours(3);
        assert!(p.resolve(reference(1, 10.0, 20.0, Some(late))).is_none());
    }

    #[test]
    fn test_reference_without_time_skips_temporal_test() {
        let r = raster();
        let p = PixelPosProvider::new(&r, Some(TimeCriterion::Hours(0.0)), 5.0);
        assert!(p.resolve(reference(1, 10.0, 20.0, None)).is_some());
    }

    #[test]
    fn test_no_time_model_rejects_timed_reference() {
        let mut r = raster();
        r.start_time = None;
        let p = PixelPosProvider::new(&r, Some(TimeCriterion::Hours(24.0)), 5.0);
        assert!(p.time_provider().is_none());
        assert!(p.resolve(reference(1, 10.0, 20.0, Some(t0()))).is_none());
        let spatial_only = PixelPosProvider::new(&r, None, 5.0);
        let pp = spatial_only.resolve(reference(2, 10.0, 20.0, Some(t0()))).unwrap();
        assert!(pp.eo_time().is_none());
    }

    #[test]
    fn test_calendar_day_criterion() {
        let r = raster();
        let p = PixelPosProvider::new(&r, Some(TimeCriterion::CalendarDays(0)), 5.0);
        // 12:00 UTC at 20E is 13:20 local, the local day starts at 22:40 UTC the day before
        let same_day = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
        assert!(p.resolve(reference(1, 10.0, 20.0, Some(same_day))).is_some());
        let next_day = Utc.with_ymd_and_hms(2020, 6, 2, 12, 0, 0).unwrap();
        assert!(p.resolve(reference(2, 10.0, 20.0, Some(next_day))).is_none());
    }

    /// Geocoding whose inverse lands far away from the forward position.
    struct Folded(MemoryRaster);

    impl RasterSource for Folded {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn width(&self) -> usize {
            self.0.width()
        }
        fn height(&self) -> usize {
            self.0.height()
        }
        fn start_time(&self) -> Option<DateTime<Utc>> {
            None
        }
        fn end_time(&self) -> Option<DateTime<Utc>> {
            None
        }
        fn band_names(&self) -> Vec<String> {
            Vec::new()
        }
        fn pixel_pos(&self, geo: GeoPos) -> Option<PixelPos> {
            self.0.pixel_pos(geo)
        }
        fn geo_pos(&self, pixel: PixelPos) -> Option<GeoPos> {
            self.0.geo_pos(PixelPos::new(pixel.x + 6.0, pixel.y))
        }
        fn read_band(&self, band: usize, rect: Rect) -> Result<Vec<f64>> {
            self.0.read_band(band, rect)
        }
    }

    #[test]
    fn test_round_trip_displacement_rejected() {
        let r = Folded(raster());
        let strict = PixelPosProvider::new(&r, None, 5.0);
        assert!(strict.resolve(reference(1, 10.0, 20.0, None)).is_none());
        let lenient = PixelPosProvider::new(&r, None, 7.0);
        assert!(lenient.resolve(reference(1, 10.0, 20.0, None)).is_some());
        let disabled = PixelPosProvider::new(&r, None, -1.0);
        assert!(disabled.resolve(reference(1, 10.0, 20.0, None)).is_some());
    }

    #[test]
    fn test_batch_sorted_by_row_then_column() {
        let r = raster();
        let p = PixelPosProvider::new(&r, None, 5.0);
        let records = vec![
            reference(1, 9.0, 19.0, None),  // row 6, col 2
            reference(2, 10.8, 21.0, None), // row 2.4, col 6
            reference(3, 10.9, 19.5, None), // row 2.2, col 3
            reference(4, 50.0, 0.0, None),  // outside
        ];
        let ids: Vec<u64> = p
            .compute_pixel_pos_records(records)
            .iter()
            .map(|pp| pp.record().id())
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_compare_row_col_truncates_rows() {
        let a = PixelPos::new(5.0, 3.9);
        let b = PixelPos::new(4.0, 3.1);
        assert_eq!(compare_row_col(&a, &b), Ordering::Greater);
        assert_eq!(compare_row_col(&b, &a), Ordering::Less);
    }
}
