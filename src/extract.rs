//! Macro-pixel extraction.
//!
//! Turns a resolved [`PixelPosRecord`] into an output record holding the
//! N x N samples around the match-up position: pixel coordinates, pixel
//! center geolocation, the good-pixel mask and one array per band.
//! Pixels of the window that fall outside the raster are present as
//! missing samples and are never good.

use crate::error::{MatchupError, Result};
use crate::filter::Predicate;
use crate::position::PixelPosRecord;
use crate::raster::{PixelPos, RasterSource};
use crate::record::{AttributeValue, Header, Record};
use crate::window::MacroPixelWindow;
use std::sync::Arc;

pub const SOURCE_NAME_ATT_NAME: &str = "source_name";
pub const PIXEL_X_ATT_NAME: &str = "pixel_x";
pub const PIXEL_Y_ATT_NAME: &str = "pixel_y";
pub const PIXEL_LAT_ATT_NAME: &str = "pixel_lat";
pub const PIXEL_LON_ATT_NAME: &str = "pixel_lon";
pub const PIXEL_TIME_ATT_NAME: &str = "pixel_time";
pub const PIXEL_MASK_ATT_NAME: &str = "pixel_mask";

const DERIVED_ATT_NAMES: [&str; 7] = [
    SOURCE_NAME_ATT_NAME,
    PIXEL_X_ATT_NAME,
    PIXEL_Y_ATT_NAME,
    PIXEL_LAT_ATT_NAME,
    PIXEL_LON_ATT_NAME,
    PIXEL_TIME_ATT_NAME,
    PIXEL_MASK_ATT_NAME,
];

/// Header of extracted records for a reference header and a raster product.
pub fn output_header(reference: &Header, raster: &dyn RasterSource, copy_input: bool) -> Header {
    let mut names: Vec<String> = Vec::new();
    if copy_input {
        names.extend(reference.attribute_names().iter().cloned());
    }
    names.extend(DERIVED_ATT_NAMES.iter().map(|s| s.to_string()));
    names.extend(raster.band_names());
    Header::for_output(names, true, reference.has_time())
}

/// Header seen by the good-pixel expression: one scalar attribute per band.
pub fn pixel_header(raster: &dyn RasterSource) -> Header {
    Header::new(raster.band_names(), false, false)
}

/// Reads macro pixels from one raster product.
pub struct MacroPixelExtractor<'a> {
    raster: &'a dyn RasterSource,
    header: Arc<Header>,
    band_count: usize,
    macro_pixel_size: usize,
    copy_input: bool,
    good_pixel: Option<Box<dyn Predicate>>,
}

impl<'a> MacroPixelExtractor<'a> {
    pub fn new(
        raster: &'a dyn RasterSource,
        header: Arc<Header>,
        macro_pixel_size: usize,
        copy_input: bool,
        good_pixel: Option<Box<dyn Predicate>>,
    ) -> Self {
        Self {
            band_count: raster.band_names().len(),
            raster,
            header,
            macro_pixel_size,
            copy_input,
            good_pixel,
        }
    }

    #[inline]
    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    /// Index of the good-pixel mask attribute in extracted records.
    pub fn mask_index(&self) -> Option<usize> {
        self.header.attribute_index(PIXEL_MASK_ATT_NAME)
    }

    /// Extract the macro pixel of one candidate.
    ///
    /// Fails if a band read fails or returns the wrong number of samples.
    pub fn extract(&self, candidate: &PixelPosRecord) -> Result<Record> {
        let window = MacroPixelWindow::new(candidate.pixel_pos(), self.macro_pixel_size);
        let n = window.len();
        let clipped = self.raster.bounds().intersection(&window.rect());

        let mut bands: Vec<Vec<f64>> = Vec::with_capacity(self.band_count);
        for band in 0..self.band_count {
            let mut samples = vec![f64::NAN; n];
            if let Some(rect) = clipped {
                let data = self.raster.read_band(band, rect)?;
                if data.len() != rect.area() {
                    return Err(MatchupError::DataIntegrity(format!(
                        "product '{}' returned {} samples for a {}x{} read of band {}",
                        self.raster.name(),
                        data.len(),
                        rect.width,
                        rect.height,
                        band
                    )));
                }
                for (j, value) in data.into_iter().enumerate() {
                    let x = rect.x + (j % rect.width) as i64;
                    let y = rect.y + (j / rect.width) as i64;
                    let i = (y - window.y0) as usize * window.size + (x - window.x0) as usize;
                    samples[i] = value;
                }
            }
            bands.push(samples);
        }

        let mut xs = Vec::with_capacity(n);
        let mut ys = Vec::with_capacity(n);
        let mut lats = Vec::with_capacity(n);
        let mut lons = Vec::with_capacity(n);
        let mut mask = Vec::with_capacity(n);
        for (i, (x, y)) in window.pixels().enumerate() {
            xs.push(x);
            ys.push(y);
            let inside = clipped.is_some_and(|r| r.contains(x, y));
            let geo = if inside {
                self.raster
                    .geo_pos(PixelPos::new(x as f64 + 0.5, y as f64 + 0.5))
            } else {
                None
            };
            lats.push(geo.map_or(f64::NAN, |g| g.lat));
            lons.push(geo.map_or(f64::NAN, |g| g.lon));
            mask.push(i64::from(inside && self.is_good_pixel(&bands, i)));
        }

        let reference = candidate.record();
        let mut values = Vec::with_capacity(self.header.len());
        if self.copy_input {
            values.extend(reference.values().iter().cloned());
        }
        values.push(AttributeValue::Text(self.raster.name().to_string()));
        values.push(AttributeValue::IntArray(xs));
        values.push(AttributeValue::IntArray(ys));
        values.push(AttributeValue::FloatArray(lats));
        values.push(AttributeValue::FloatArray(lons));
        values.push(
            candidate
                .eo_time()
                .map_or(AttributeValue::Missing, AttributeValue::Time),
        );
        values.push(AttributeValue::IntArray(mask));
        values.extend(bands.into_iter().map(AttributeValue::FloatArray));

        Ok(Record::new(reference.id(), reference.location(), reference.time(), values)
            .with_annotation_slots(self.header.annotation_names().len()))
    }

    fn is_good_pixel(&self, bands: &[Vec<f64>], i: usize) -> bool {
        match &self.good_pixel {
            None => true,
            Some(predicate) => {
                let values = bands
                    .iter()
                    .map(|b| AttributeValue::Float(b[i]))
                    .collect();
                predicate.test(&Record::new(i as u64, None, None, values))
            }
        }
    }
}
