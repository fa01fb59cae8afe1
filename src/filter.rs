//! Expression-based record filtering.
//!
//! Predicates are compiled by an external [`ExpressionCompiler`]; this
//! module only applies them. A [`RecordFilter`] is either hard (drops
//! records) or soft (annotates the exclusion reason and keeps the record).

use crate::error::{MatchupError, Result};
use crate::record::{AttributeValue, Header, Record};

/// Exclusion reason set by the good-record expression.
pub const EXCLUSION_REASON_EXPRESSION: &str = "RECORD_EXPRESSION";

/// Exclusion reason for aggregated windows without any good pixel.
pub const EXCLUSION_REASON_ALL_MASKED: &str = "ALL_MASKED";

/// A compiled boolean condition over records.
pub trait Predicate: Send + Sync {
    fn test(&self, record: &Record) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    #[inline]
    fn test(&self, record: &Record) -> bool {
        self(record)
    }
}

/// Compiles expression text against a header into a predicate.
///
/// Compile failures are configuration errors and must be reported as
/// [`MatchupError::Expression`].
pub trait ExpressionCompiler: Send + Sync {
    fn compile(&self, expression: &str, header: &Header) -> Result<Box<dyn Predicate>>;
}

/// Compiler for runs without an expression language: every expression is rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExpressions;

impl ExpressionCompiler for NoExpressions {
    fn compile(&self, expression: &str, _header: &Header) -> Result<Box<dyn Predicate>> {
        Err(MatchupError::Expression {
            expression: expression.to_string(),
            message: "no expression compiler is available".to_string(),
        })
    }
}

/// Filtering policy applied to a record.
pub enum RecordFilter {
    /// Drop records failing the predicate.
    Hard(Box<dyn Predicate>),
    /// Annotate records failing the predicate with `tag`, keep them in the stream.
    Soft {
        predicate: Box<dyn Predicate>,
        tag: &'static str,
    },
}

impl std::fmt::Debug for RecordFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordFilter::Hard(_) => f.write_str("Hard"),
            RecordFilter::Soft { tag, .. } => write!(f, "Soft({})", tag),
        }
    }
}

impl RecordFilter {
    pub fn hard(predicate: impl Predicate + 'static) -> Self {
        RecordFilter::Hard(Box::new(predicate))
    }

    pub fn soft(predicate: impl Predicate + 'static, tag: &'static str) -> Self {
        RecordFilter::Soft {
            predicate: Box::new(predicate),
            tag,
        }
    }

    /// Apply the filter. Returns `false` if the record must be dropped.
    ///
    /// A soft filter writes the exclusion reason of `record` in place, and
    /// only if it is still empty.
    pub fn apply(&self, record: &mut Record) -> bool {
        match self {
            RecordFilter::Hard(predicate) => predicate.test(record),
            RecordFilter::Soft { predicate, tag } => {
                if !record.is_excluded() && !predicate.test(record) {
                    record.set_exclusion_reason(tag);
                }
                true
            }
        }
    }
}

/// Hard filter dropping exploded pixel records whose mask element at
/// `mask_index` is zero. Records without a scalar mask value pass.
pub fn good_pixel_filter(mask_index: usize) -> RecordFilter {
    RecordFilter::hard(move |record: &Record| match record.value(mask_index) {
        Some(AttributeValue::Int(m)) => *m != 0,
        _ => true,
    })
}

/// Ordered list of filters applied to each candidate record.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<RecordFilter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: RecordFilter) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run all filters in order; stops at the first hard rejection.
    pub fn accept(&self, record: &mut Record) -> bool {
        self.filters.iter().all(|f| f.apply(record))
    }
}
