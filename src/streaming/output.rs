//! Labeled TSV output of match-up records.
//!
//! Uses itoa for integer formatting and ryu for float formatting
//! to avoid allocation in the hot path.

use crate::error::Result;
use crate::record::{AttributeValue, Header, Record};
use std::io::{BufWriter, Write};

/// Buffer size for RecordWriter (2MB default).
const DEFAULT_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Name of the leading record id column.
pub const ID_COLUMN: &str = "record_id";

pub const SUFFIX_MEAN: &str = "_mean";
pub const SUFFIX_SIGMA: &str = "_sigma";
pub const SUFFIX_N: &str = "_n";

/// Layout of time values.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Tab-separated record writer.
///
/// Writes the id column, one column per attribute (aggregated numbers are
/// expanded to `_mean`, `_sigma` and `_n` columns holding the sigma-clipped
/// mean, stddev and count) and one column per
/// annotation. With `accepted_only`, records carrying an exclusion reason
/// are skipped and annotation columns are omitted.
pub struct RecordWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
    ryu_buf: ryu::Buffer,
    accepted_only: bool,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output)
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
            ryu_buf: ryu::Buffer::new(),
            accepted_only: false,
        }
    }

    /// Skip excluded records and the annotation columns.
    pub fn accepted_only(mut self, yes: bool) -> Self {
        self.accepted_only = yes;
        self
    }

    /// Write the header line and all records.
    ///
    /// Aggregated columns are detected from the first record.
    pub fn write_all(&mut self, header: &Header, records: &[Record]) -> Result<usize> {
        self.write_header(header, records.first())?;
        let mut written = 0;
        for record in records {
            if self.write_record(record)? {
                written += 1;
            }
        }
        self.flush()?;
        Ok(written)
    }

    /// Write the column names. `sample` decides which attributes are aggregated.
    pub fn write_header(&mut self, header: &Header, sample: Option<&Record>) -> Result<()> {
        self.writer.write_all(ID_COLUMN.as_bytes())?;
        for (i, name) in header.attribute_names().iter().enumerate() {
            let aggregated = sample
                .and_then(|r| r.value(i))
                .is_some_and(|v| matches!(v, AttributeValue::Aggregated(_)));
            if aggregated {
                for suffix in [SUFFIX_MEAN, SUFFIX_SIGMA, SUFFIX_N] {
                    self.write_tab()?;
                    self.writer.write_all(name.as_bytes())?;
                    self.writer.write_all(suffix.as_bytes())?;
                }
            } else {
                self.write_tab()?;
                self.writer.write_all(name.as_bytes())?;
            }
        }
        if !self.accepted_only {
            for name in header.annotation_names() {
                self.write_tab()?;
                self.writer.write_all(name.as_bytes())?;
            }
        }
        self.write_newline()
    }

    /// Write one record line. Returns false if the record was skipped.
    pub fn write_record(&mut self, record: &Record) -> Result<bool> {
        if self.accepted_only && record.is_excluded() {
            return Ok(false);
        }
        self.write_int(record.id())?;
        for value in record.values() {
            self.write_tab()?;
            self.write_value(value)?;
        }
        if !self.accepted_only {
            for annotation in record.annotations() {
                self.write_tab()?;
                self.write_text(annotation)?;
            }
        }
        self.write_newline()?;
        Ok(true)
    }

    fn write_value(&mut self, value: &AttributeValue) -> Result<()> {
        match value {
            AttributeValue::Missing => Ok(()),
            AttributeValue::Int(v) => self.write_int(*v),
            AttributeValue::Float(v) => self.write_float(*v),
            AttributeValue::Text(s) => self.write_text(s),
            AttributeValue::Time(t) => {
                write!(self.writer, "{}", t.format(TIME_FORMAT))?;
                Ok(())
            }
            AttributeValue::IntArray(v) => {
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        self.writer.write_all(b",")?;
                    }
                    self.write_int(*x)?;
                }
                Ok(())
            }
            AttributeValue::FloatArray(v) => {
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        self.writer.write_all(b",")?;
                    }
                    self.write_float(*x)?;
                }
                Ok(())
            }
            AttributeValue::Aggregated(a) => {
                self.write_float(a.filtered_mean)?;
                self.write_tab()?;
                self.write_float(a.filtered_stddev)?;
                self.write_tab()?;
                self.write_int(a.filtered_count)
            }
        }
    }

    /// Write text with embedded tabs and line breaks replaced by spaces.
    #[inline]
    fn write_text(&mut self, text: &str) -> Result<()> {
        if text.contains(['\t', '\n', '\r']) {
            let cleaned = text.replace(['\t', '\n', '\r'], " ");
            self.writer.write_all(cleaned.as_bytes())?;
        } else {
            self.writer.write_all(text.as_bytes())?;
        }
        Ok(())
    }

    #[inline]
    fn write_tab(&mut self) -> Result<()> {
        self.writer.write_all(b"\t")?;
        Ok(())
    }

    #[inline]
    fn write_newline(&mut self) -> Result<()> {
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    #[inline]
    fn write_int<I: itoa::Integer>(&mut self, n: I) -> Result<()> {
        self.writer.write_all(self.itoa_buf.format(n).as_bytes())?;
        Ok(())
    }

    #[inline]
    fn write_float(&mut self, f: f64) -> Result<()> {
        self.writer.write_all(self.ryu_buf.format(f).as_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::aggregate;
    use chrono::{TimeZone, Utc};

    fn header() -> Header {
        Header::for_output(vec!["site".into(), "chl".into()], true, false)
    }

    fn render(accepted_only: bool, records: &[Record]) -> String {
        let mut output = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut output).accepted_only(accepted_only);
            writer.write_all(&header(), records).unwrap();
        }
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_aggregated_columns_expanded() {
        let rec = Record::new(
            3,
            None,
            None,
            vec![
                AttributeValue::Text("a".into()),
                AttributeValue::Aggregated(aggregate(&[1.0, 3.0], None, 0.0)),
            ],
        )
        .with_annotation_slots(1);
        let text = render(false, &[rec]);
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("record_id\tsite\tchl_mean\tchl_sigma\tchl_n\texclusion_reason")
        );
        assert_eq!(lines.next(), Some("3\ta\t2.0\t1.4142135623730951\t2\t"));
    }

    #[test]
    fn test_aggregated_columns_are_sigma_clipped() {
        let rec = Record::new(
            1,
            None,
            None,
            vec![
                AttributeValue::Text("b".into()),
                AttributeValue::Aggregated(aggregate(&[0.2, 1.2, 1.2, 1.4, 1.8], None, 1.5)),
            ],
        )
        .with_annotation_slots(1);
        let text = render(false, &[rec]);
        let line = text.lines().nth(1).unwrap();
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields[0], "1");
        assert!((fields[2].parse::<f64>().unwrap() - 1.4).abs() < 1e-9);
        assert!((fields[3].parse::<f64>().unwrap() - 0.28284271247).abs() < 1e-9);
        assert_eq!(fields[4], "4");
    }

    #[test]
    fn test_arrays_times_and_missing() {
        let t = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 0).unwrap();
        let rec = Record::new(
            1,
            None,
            None,
            vec![AttributeValue::Time(t), AttributeValue::FloatArray(vec![0.5, f64::NAN])],
        );
        let mut output = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut output);
            writer.write_record(&rec).unwrap();
            writer
                .write_record(&Record::new(2, None, None, vec![AttributeValue::Missing]))
                .unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "1\t2020-06-01 10:00:00\t0.5,NaN\n2\t\n"
        );
    }

    #[test]
    fn test_accepted_only_skips_excluded() {
        let ok = Record::new(1, None, None, vec![AttributeValue::Int(1), AttributeValue::Float(2.0)])
            .with_annotation_slots(1);
        let mut excluded = ok.derive(vec![AttributeValue::Int(2), AttributeValue::Float(3.0)]);
        excluded.set_exclusion_reason("OVERLAPPING");

        let text = render(true, &[ok.clone(), excluded.clone()]);
        assert_eq!(text, "record_id\tsite\tchl\n1\t1\t2.0\n");

        let text = render(false, &[ok, excluded]);
        assert!(text.ends_with("1\t2\t3.0\tOVERLAPPING\n"));
    }

    #[test]
    fn test_text_sanitized() {
        let rec = Record::new(1, None, None, vec![AttributeValue::Text("a\tb".into())]);
        let mut output = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut output);
            writer.write_record(&rec).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(output, b"1\ta b\n");
    }
}
