//! Reference point sources.
//!
//! A [`ReferenceSource`] yields a header followed by a stream of records.
//! [`TsvRecordSource`] reads tab-separated point files: the first
//! non-comment line names the columns, latitude/longitude and time columns
//! are recognised by name, `#` lines and blank lines are ignored.

use crate::error::{MatchupError, Result};
use crate::record::{AttributeValue, GeoPos, Header, Record};
use crate::streaming::{parse_f64_field, parse_time_field, should_skip_line, split_fields, trim_line_end};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Column names recognised as latitude (case-insensitive).
pub const LAT_NAMES: [&str; 3] = ["lat", "latitude", "northing"];
/// Column names recognised as longitude (case-insensitive).
pub const LON_NAMES: [&str; 4] = ["lon", "long", "longitude", "easting"];
/// Column names recognised as time (case-insensitive).
pub const TIME_NAMES: [&str; 2] = ["time", "date"];

/// A stream of reference records sharing one header.
pub trait ReferenceSource {
    fn header(&self) -> &Header;

    /// Next record, `None` at end of input.
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Collect all remaining records of a source.
pub fn read_all(source: &mut dyn ReferenceSource) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(record) = source.next_record()? {
        records.push(record);
    }
    Ok(records)
}

fn find_column(names: &[String], candidates: &[&str]) -> Option<usize> {
    names
        .iter()
        .position(|n| candidates.iter().any(|c| n.trim().eq_ignore_ascii_case(c)))
}

/// Type of a non-time column, fixed by its first non-empty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Number,
    Text,
}

/// Tab-separated reference point reader.
///
/// Record ids are the 1-based line numbers of the records in the input.
pub struct TsvRecordSource<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    buffer: Vec<u8>,
    header: Header,
    lat_index: Option<usize>,
    lon_index: Option<usize>,
    time_index: Option<usize>,
    column_types: Vec<Option<ColumnType>>,
}

impl TsvRecordSource<File> {
    /// Open a point file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file)
    }
}

impl<R: Read> TsvRecordSource<R> {
    /// Create a reader and consume the header line.
    pub fn new(reader: R) -> Result<Self> {
        let mut source = Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buffer: Vec::with_capacity(1024),
            header: Header::new(Vec::new(), false, false),
            lat_index: None,
            lon_index: None,
            time_index: None,
            column_types: Vec::new(),
        };

        if !source.next_line()? {
            return Err(MatchupError::Parse {
                line: source.line_number,
                message: "missing header line".to_string(),
            });
        }
        let names: Vec<String> = split_fields(trim_line_end(&source.buffer))
            .into_iter()
            .map(|f| String::from_utf8_lossy(f).trim().to_string())
            .collect();

        source.lat_index = find_column(&names, &LAT_NAMES);
        source.lon_index = find_column(&names, &LON_NAMES);
        source.time_index = find_column(&names, &TIME_NAMES);
        source.column_types = vec![None; names.len()];
        let has_location = source.lat_index.is_some() && source.lon_index.is_some();
        source.header = Header::new(names, has_location, source.time_index.is_some());
        Ok(source)
    }

    /// Read the next non-skipped line into the buffer. Returns false at EOF.
    fn next_line(&mut self) -> Result<bool> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(false);
            }
            self.line_number += 1;
            if !should_skip_line(trim_line_end(&self.buffer)) {
                return Ok(true);
            }
        }
    }

    fn parse_error(&self, message: String) -> MatchupError {
        MatchupError::Parse {
            line: self.line_number,
            message,
        }
    }

    fn parse_record(&mut self) -> Result<Record> {
        let line = std::mem::take(&mut self.buffer);
        let fields = split_fields(trim_line_end(&line));
        if fields.len() != self.header.len() {
            return Err(self.parse_error(format!(
                "expected {} columns, got {}",
                self.header.len(),
                fields.len()
            )));
        }

        let mut values = Vec::with_capacity(fields.len());
        let mut time = None;
        for (i, field) in fields.iter().enumerate() {
            let text = String::from_utf8_lossy(field);
            let text = text.trim();
            if text.is_empty() {
                values.push(AttributeValue::Missing);
                continue;
            }
            if Some(i) == self.time_index {
                let t = parse_time_field(text)
                    .ok_or_else(|| self.parse_error(format!("invalid time value '{}'", text)))?;
                time = Some(t);
                values.push(AttributeValue::Time(t));
                continue;
            }
            let number = parse_f64_field(field);
            let column_type = *self.column_types[i].get_or_insert(if number.is_some() {
                ColumnType::Number
            } else {
                ColumnType::Text
            });
            values.push(match column_type {
                ColumnType::Number => AttributeValue::Float(number.unwrap_or(f64::NAN)),
                ColumnType::Text => AttributeValue::Text(text.to_string()),
            });
        }

        let location = match (self.lat_index, self.lon_index) {
            (Some(lat), Some(lon)) => Some(self.parse_location(&values, lat, lon)?),
            _ => None,
        };

        self.buffer = line;
        Ok(Record::new(self.line_number as u64, location, time, values))
    }

    fn parse_location(&self, values: &[AttributeValue], lat: usize, lon: usize) -> Result<GeoPos> {
        let (Some(lat), Some(lon)) = (values[lat].as_f64(), values[lon].as_f64()) else {
            return Err(self.parse_error("lat and lon values are not well-formed numbers".to_string()));
        };
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=360.0).contains(&lon) {
            return Err(self.parse_error(format!(
                "lat {} and lon {} out of range [-90..90] or [-180..360]",
                lat, lon
            )));
        }
        Ok(GeoPos::new(lat, lon))
    }

    /// Get an iterator over all remaining records.
    pub fn records(self) -> TsvRecordIter<R> {
        TsvRecordIter { source: self }
    }
}

impl<R: Read> ReferenceSource for TsvRecordSource<R> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        if !self.next_line()? {
            return Ok(None);
        }
        self.parse_record().map(Some)
    }
}

/// Iterator over TSV reference records.
pub struct TsvRecordIter<R: Read> {
    source: TsvRecordSource<R>,
}

impl<R: Read> Iterator for TsvRecordIter<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.next_record().transpose()
    }
}

/// In-memory reference source.
#[derive(Debug)]
pub struct VecRecordSource {
    header: Header,
    records: std::vec::IntoIter<Record>,
}

impl VecRecordSource {
    pub fn new(header: Header, records: Vec<Record>) -> Self {
        Self {
            header,
            records: records.into_iter(),
        }
    }
}

impl ReferenceSource for VecRecordSource {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.records.next())
    }
}
