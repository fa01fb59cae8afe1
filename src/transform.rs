//! Aggregation and explosion of macro-pixel records.

use crate::config::Mode;
use crate::error::{MatchupError, Result};
use crate::filter::EXCLUSION_REASON_ALL_MASKED;
use crate::record::{AttributeValue, Record};
use crate::stats::{aggregate, aggregate_ints};

/// Turns one extracted record into its output records according to [`Mode`].
#[derive(Debug, Clone, Copy)]
pub struct RecordTransformer {
    mode: Mode,
    mask_index: Option<usize>,
    coefficient: f64,
}

impl RecordTransformer {
    /// `mask_index` is the attribute holding the good-pixel mask, if any.
    pub fn new(mode: Mode, mask_index: Option<usize>, coefficient: f64) -> Self {
        Self {
            mode,
            mask_index,
            coefficient,
        }
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Transform a record. Records without array attributes pass through.
    pub fn transform(&self, record: Record) -> Result<Vec<Record>> {
        if common_array_len(&record)?.is_none() {
            return Ok(vec![record]);
        }
        match self.mode {
            Mode::Aggregate => Ok(vec![self.aggregate(&record)?]),
            Mode::Explode => self.explode(&record),
        }
    }

    /// Replace every array attribute by its statistics.
    ///
    /// A window without any good pixel is kept and annotated `ALL_MASKED`.
    pub fn aggregate(&self, record: &Record) -> Result<Record> {
        common_array_len(record)?;
        let mask = self.mask(record);
        let values = record
            .values()
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let mask = if Some(i) == self.mask_index { None } else { mask };
                match value {
                    AttributeValue::IntArray(v) => {
                        AttributeValue::Aggregated(aggregate_ints(v, mask, self.coefficient))
                    }
                    AttributeValue::FloatArray(v) => {
                        AttributeValue::Aggregated(aggregate(v, mask, self.coefficient))
                    }
                    other => other.clone(),
                }
            })
            .collect();

        let mut out = record.derive(values);
        if mask.is_some_and(|m| m.iter().all(|&g| g == 0)) && !out.is_excluded() {
            out.set_exclusion_reason(EXCLUSION_REASON_ALL_MASKED);
        }
        Ok(out)
    }

    /// One record per pixel, array attributes replaced by their element.
    ///
    /// The mask becomes a scalar attribute of every pixel record; dropping
    /// bad pixels is left to [`good_pixel_filter`](crate::filter::good_pixel_filter).
    pub fn explode(&self, record: &Record) -> Result<Vec<Record>> {
        let Some(len) = common_array_len(record)? else {
            return Ok(vec![record.clone()]);
        };
        let out = (0..len)
            .map(|i| record.derive(record.values().iter().map(|v| v.element(i)).collect()))
            .collect();
        Ok(out)
    }

    fn mask<'r>(&self, record: &'r Record) -> Option<&'r [i64]> {
        match self.mask_index.and_then(|i| record.value(i)) {
            Some(AttributeValue::IntArray(m)) => Some(m.as_slice()),
            _ => None,
        }
    }
}

/// Common length of all array attributes, `None` if the record has none.
///
/// Differing or zero lengths are data-integrity errors.
pub fn common_array_len(record: &Record) -> Result<Option<usize>> {
    let mut common: Option<usize> = None;
    for (i, len) in record
        .values()
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.array_len().map(|len| (i, len)))
    {
        if len == 0 {
            return Err(MatchupError::DataIntegrity(format!(
                "record {}: attribute {} is an empty array",
                record.id(),
                i
            )));
        }
        match common {
            None => common = Some(len),
            Some(c) if c != len => {
                return Err(MatchupError::DataIntegrity(format!(
                    "record {}: attribute {} has {} elements, expected {}",
                    record.id(),
                    i,
                    len,
                    c
                )));
            }
            Some(_) => {}
        }
    }
    Ok(common)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::good_pixel_filter;
    use crate::record::GeoPos;

    fn window_record(values: Vec<f64>, mask: Vec<i64>) -> Record {
        Record::new(
            7,
            Some(GeoPos::new(1.0, 2.0)),
            None,
            vec![
                AttributeValue::Text("scene".into()),
                AttributeValue::IntArray(mask),
                AttributeValue::FloatArray(values),
            ],
        )
        .with_annotation_slots(1)
    }

    fn aggregated(value: &AttributeValue) -> &crate::stats::AggregatedNumber {
        match value {
            AttributeValue::Aggregated(a) => a,
            other => panic!("not aggregated: {:?}", other),
        }
    }

    #[test]
    fn test_aggregate_constant_window() {
        let t = RecordTransformer::new(Mode::Aggregate, Some(1), 0.0);
        let out = t.transform(window_record(vec![5.0; 9], vec![1; 9])).unwrap();
        assert_eq!(out.len(), 1);
        let a = aggregated(&out[0].values()[2]);
        assert_eq!(a.mean, 5.0);
        assert_eq!(a.stddev, 0.0);
        assert_eq!(a.good_count, 9);
        assert_eq!(a.total_count, 9);
        assert_eq!(out[0].values()[0], AttributeValue::Text("scene".into()));
        assert_eq!(out[0].id(), 7);
    }

    #[test]
    fn test_mask_not_applied_to_itself() {
        let t = RecordTransformer::new(Mode::Aggregate, Some(1), 0.0);
        let out = t
            .aggregate(&window_record(vec![1.0, 2.0, 3.0, 4.0], vec![1, 0, 0, 1]))
            .unwrap();
        let mask = aggregated(&out.values()[1]);
        assert_eq!(mask.good_count, 4);
        assert_eq!(mask.mean, 0.5);
        let band = aggregated(&out.values()[2]);
        assert_eq!(band.good_count, 2);
        assert_eq!(band.mean, 2.5);
        assert!(!out.is_excluded());
    }

    #[test]
    fn test_all_masked_is_soft_excluded() {
        let t = RecordTransformer::new(Mode::Aggregate, Some(1), 1.5);
        let out = t.aggregate(&window_record(vec![1.0; 4], vec![0; 4])).unwrap();
        assert_eq!(out.exclusion_reason(), EXCLUSION_REASON_ALL_MASKED);
        let band = aggregated(&out.values()[2]);
        assert_eq!(band.good_count, 0);
        assert_eq!(band.total_count, 4);
        assert!(band.mean.is_nan());
    }

    #[test]
    fn test_explode_keeps_good_pixels() {
        let t = RecordTransformer::new(Mode::Explode, Some(1), 1.5);
        let mut out = t
            .transform(window_record(vec![1.0, 2.0, 3.0, 4.0], vec![1, 0, 1, 1]))
            .unwrap();
        assert_eq!(out.len(), 4);

        let filter = good_pixel_filter(1);
        out.retain_mut(|r| filter.apply(r));
        let values: Vec<AttributeValue> = out.iter().map(|r| r.values()[2].clone()).collect();
        assert_eq!(
            values,
            vec![
                AttributeValue::Float(1.0),
                AttributeValue::Float(3.0),
                AttributeValue::Float(4.0)
            ]
        );
        assert!(out.iter().all(|r| r.id() == 7 && r.values()[1] == AttributeValue::Int(1)));
        assert!(out.iter().all(|r| r.location() == Some(GeoPos::new(1.0, 2.0))));
    }

    #[test]
    fn test_explode_without_mask_emits_every_pixel() {
        let t = RecordTransformer::new(Mode::Explode, None, 1.5);
        let r = Record::new(1, None, None, vec![AttributeValue::FloatArray(vec![0.5; 9])]);
        assert_eq!(t.explode(&r).unwrap().len(), 9);
    }

    #[test]
    fn test_scalar_record_passes_through() {
        let t = RecordTransformer::new(Mode::Explode, Some(0), 1.5);
        let r = Record::new(3, None, None, vec![AttributeValue::Float(1.0)]);
        assert_eq!(t.transform(r.clone()).unwrap(), vec![r]);
    }

    #[test]
    fn test_length_mismatch_is_data_integrity_error() {
        let t = RecordTransformer::new(Mode::Aggregate, Some(1), 1.5);
        let err = t
            .transform(window_record(vec![1.0; 9], vec![1; 4]))
            .unwrap_err();
        assert!(matches!(err, MatchupError::DataIntegrity(_)));

        let r = Record::new(1, None, None, vec![AttributeValue::IntArray(vec![])]);
        assert!(common_array_len(&r).is_err());
    }
}
