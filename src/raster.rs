//! Raster product access.
//!
//! The match-up core only sees rasters through [`RasterSource`]: scene
//! dimensions and time bounds, band names, forward/inverse geolocation and
//! rectangular band reads. [`MemoryRaster`] is an in-memory product on a
//! regular lat/lon grid, used by the command line tool and by tests.

use crate::error::{MatchupError, Result};
use crate::record::GeoPos;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A (possibly fractional) raster position; `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPos {
    pub x: f64,
    pub y: f64,
}

impl PixelPos {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Truncated integer row, the primary sort key of match-up candidates.
    #[inline]
    pub fn row(&self) -> i64 {
        self.y as i64
    }

    /// Truncated integer column.
    #[inline]
    pub fn col(&self) -> i64 {
        self.x as i64
    }
}

/// Integer pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Overlapping part of two rectangles, `None` if they are disjoint.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width as i64).min(other.x + other.width as i64);
        let y1 = (self.y + self.height as i64).min(other.y + other.height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as usize, (y1 - y0) as usize))
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x + self.width as i64
            && y < self.y + self.height as i64
    }
}

/// A raster product with geolocation, time bounds and readable bands.
///
/// `read_band` is the only blocking operation; failures are fatal for the
/// product being processed and are not retried.
pub trait RasterSource {
    fn name(&self) -> &str;
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn start_time(&self) -> Option<DateTime<Utc>>;
    fn end_time(&self) -> Option<DateTime<Utc>>;
    fn band_names(&self) -> Vec<String>;

    /// Forward geolocation; `None` if the position cannot be geolocated.
    fn pixel_pos(&self, geo: GeoPos) -> Option<PixelPos>;

    /// Inverse geolocation; `None` if the pixel cannot be geolocated.
    fn geo_pos(&self, pixel: PixelPos) -> Option<GeoPos>;

    /// Read `rect` (fully inside the raster) of band `band` in row-major order.
    fn read_band(&self, band: usize, rect: Rect) -> Result<Vec<f64>>;

    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    fn contains(&self, pixel: PixelPos) -> bool {
        pixel.x >= 0.0
            && pixel.y >= 0.0
            && pixel.x < self.width() as f64
            && pixel.y < self.height() as f64
    }
}

/// Regular lat/lon grid geocoding. `(lat0, lon0)` is the outer corner of pixel (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeoCoding {
    pub lat0: f64,
    pub lon0: f64,
    pub lat_step: f64,
    pub lon_step: f64,
}

impl GridGeoCoding {
    pub fn pixel_pos(&self, geo: GeoPos) -> PixelPos {
        PixelPos::new(
            (geo.lon - self.lon0) / self.lon_step,
            (geo.lat - self.lat0) / self.lat_step,
        )
    }

    pub fn geo_pos(&self, pixel: PixelPos) -> GeoPos {
        GeoPos::new(
            self.lat0 + pixel.y * self.lat_step,
            self.lon0 + pixel.x * self.lon_step,
        )
    }
}

/// One band of a [`MemoryRaster`], row-major, NaN for no-data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryBand {
    pub name: String,
    pub data: Vec<f64>,
}

/// In-memory raster product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRaster {
    pub name: String,
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub geocoding: GridGeoCoding,
    #[serde(default)]
    pub bands: Vec<MemoryBand>,
}

impl MemoryRaster {
    pub fn new(
        name: impl Into<String>,
        width: usize,
        height: usize,
        geocoding: GridGeoCoding,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            start_time: None,
            end_time: None,
            geocoding,
            bands: Vec::new(),
        }
    }

    pub fn with_time(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Add a band. Fails if the sample count does not match the raster size.
    pub fn with_band(mut self, name: impl Into<String>, data: Vec<f64>) -> Result<Self> {
        let band = MemoryBand {
            name: name.into(),
            data,
        };
        self.check_band(&band)?;
        self.bands.push(band);
        Ok(self)
    }

    /// Load a raster description from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let raster: MemoryRaster = serde_json::from_reader(BufReader::new(file))?;
        raster.validate()?;
        Ok(raster)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raster: MemoryRaster = serde_json::from_str(json)?;
        raster.validate()?;
        Ok(raster)
    }

    fn check_band(&self, band: &MemoryBand) -> Result<()> {
        if band.data.len() != self.width * self.height {
            return Err(MatchupError::DataIntegrity(format!(
                "band '{}' of product '{}' has {} samples, expected {}x{}",
                band.name,
                self.name,
                band.data.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.geocoding.lat_step == 0.0 || self.geocoding.lon_step == 0.0 {
            return Err(MatchupError::Config(format!(
                "product '{}' has a degenerate geocoding",
                self.name
            )));
        }
        self.bands.iter().try_for_each(|b| self.check_band(b))
    }
}

impl RasterSource for MemoryRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    fn pixel_pos(&self, geo: GeoPos) -> Option<PixelPos> {
        let p = self.geocoding.pixel_pos(geo);
        p.is_valid().then_some(p)
    }

    fn geo_pos(&self, pixel: PixelPos) -> Option<GeoPos> {
        let g = self.geocoding.geo_pos(pixel);
        g.is_valid().then_some(g)
    }

    fn read_band(&self, band: usize, rect: Rect) -> Result<Vec<f64>> {
        let data = &self
            .bands
            .get(band)
            .ok_or_else(|| MatchupError::Raster {
                product: self.name.clone(),
                message: format!("no band with index {}", band),
            })?
            .data;
        if self.bounds().intersection(&rect) != Some(rect) {
            return Err(MatchupError::Raster {
                product: self.name.clone(),
                message: format!("rectangle {:?} outside raster bounds", rect),
            });
        }
        let mut out = Vec::with_capacity(rect.area());
        for y in rect.y..rect.y + rect.height as i64 {
            let row_start = y as usize * self.width + rect.x as usize;
            let row = data
                .get(row_start..row_start + rect.width)
                .ok_or_else(|| MatchupError::Raster {
                    product: self.name.clone(),
                    message: format!("band {} is truncated at row {}", band, y),
                })?;
            out.extend_from_slice(row);
        }
        Ok(out)
    }
}
