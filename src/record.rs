//! Header and record data model shared by every stage of a match-up run.

use crate::stats::AggregatedNumber;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::fmt;

/// Name of the annotation that records why a record is not an accepted match-up.
pub const ANNOTATION_EXCLUSION_REASON: &str = "exclusion_reason";

/// Position of the exclusion reason within the annotations of pipeline output.
pub const EXCLUSION_REASON_INDEX: usize = 0;

/// A geographical point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True if both coordinates are finite numbers.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl fmt::Display for GeoPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lat={}, lon={})", self.lat, self.lon)
    }
}

/// Ordered attribute and annotation names of one record stream.
///
/// A header is built once per run and shared by all records of that run.
#[derive(Debug, Clone)]
pub struct Header {
    attribute_names: Vec<String>,
    annotation_names: Vec<String>,
    has_location: bool,
    has_time: bool,
    index: FxHashMap<String, usize>,
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.attribute_names == other.attribute_names
            && self.annotation_names == other.annotation_names
            && self.has_location == other.has_location
            && self.has_time == other.has_time
    }
}

impl Header {
    /// Create a header without annotations, as produced by reference sources.
    pub fn new(attribute_names: Vec<String>, has_location: bool, has_time: bool) -> Self {
        let index = attribute_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            attribute_names,
            annotation_names: Vec::new(),
            has_location,
            has_time,
            index,
        }
    }

    /// Create a header for pipeline output, carrying the exclusion reason annotation.
    pub fn for_output(attribute_names: Vec<String>, has_location: bool, has_time: bool) -> Self {
        let mut header = Self::new(attribute_names, has_location, has_time);
        header.annotation_names = vec![ANNOTATION_EXCLUSION_REASON.to_string()];
        header
    }

    #[inline]
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    #[inline]
    pub fn annotation_names(&self) -> &[String] {
        &self.annotation_names
    }

    #[inline]
    pub fn has_location(&self) -> bool {
        self.has_location
    }

    #[inline]
    pub fn has_time(&self) -> bool {
        self.has_time
    }

    /// Look up the index of an attribute by its exact name.
    #[inline]
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attribute_names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attribute_names.is_empty()
    }
}

/// One attribute value of a record.
///
/// Array variants hold the N x N samples of a macro pixel in row-major
/// order. NaN marks a missing floating point sample.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    Aggregated(AggregatedNumber),
}

impl AttributeValue {
    /// Numeric view of a scalar value. Aggregated numbers yield their
    /// sigma-clipped mean.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Aggregated(a) => Some(a.filtered_mean),
            _ => None,
        }
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            AttributeValue::IntArray(_) | AttributeValue::FloatArray(_)
        )
    }

    /// Length of an array value, `None` for scalars.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            AttributeValue::IntArray(v) => Some(v.len()),
            AttributeValue::FloatArray(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Scalar element `i` of an array value; scalars are returned unchanged.
    pub fn element(&self, i: usize) -> AttributeValue {
        match self {
            AttributeValue::IntArray(v) => v
                .get(i)
                .map_or(AttributeValue::Missing, |x| AttributeValue::Int(*x)),
            AttributeValue::FloatArray(v) => v
                .get(i)
                .map_or(AttributeValue::Missing, |x| AttributeValue::Float(*x)),
            other => other.clone(),
        }
    }
}

/// A reference observation or a match-up derived from one.
///
/// Everything but the annotations is fixed at construction. Annotations
/// are owned by the record and change only through `&mut Record`, so a
/// record has exactly one writer at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: u64,
    location: Option<GeoPos>,
    time: Option<DateTime<Utc>>,
    values: Vec<AttributeValue>,
    annotations: Vec<String>,
}

impl Record {
    pub fn new(
        id: u64,
        location: Option<GeoPos>,
        time: Option<DateTime<Utc>>,
        values: Vec<AttributeValue>,
    ) -> Self {
        Self {
            id,
            location,
            time,
            values,
            annotations: Vec::new(),
        }
    }

    /// Attach `count` empty annotation slots.
    pub fn with_annotation_slots(mut self, count: usize) -> Self {
        self.annotations = vec![String::new(); count];
        self
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn location(&self) -> Option<GeoPos> {
        self.location
    }

    #[inline]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    #[inline]
    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    #[inline]
    pub fn value(&self, index: usize) -> Option<&AttributeValue> {
        self.values.get(index)
    }

    #[inline]
    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    /// Derive a record with the same id, location, time and annotations but new values.
    pub fn derive(&self, values: Vec<AttributeValue>) -> Record {
        Record {
            id: self.id,
            location: self.location,
            time: self.time,
            values,
            annotations: self.annotations.clone(),
        }
    }

    /// The exclusion reason, empty if the record is (still) accepted.
    #[inline]
    pub fn exclusion_reason(&self) -> &str {
        self.annotations
            .get(EXCLUSION_REASON_INDEX)
            .map_or("", String::as_str)
    }

    #[inline]
    pub fn is_excluded(&self) -> bool {
        !self.exclusion_reason().is_empty()
    }

    /// Set the exclusion reason in place. Records without annotation slots gain one.
    pub fn set_exclusion_reason(&mut self, reason: &str) {
        if self.annotations.len() <= EXCLUSION_REASON_INDEX {
            self.annotations.resize(EXCLUSION_REASON_INDEX + 1, String::new());
        }
        self.annotations[EXCLUSION_REASON_INDEX] = reason.to_string();
    }
}
