//! Match-up pipeline for one raster product.
//!
//! Stages, in order: pixel position resolution, macro-pixel extraction
//! with the good-pixel mask, aggregation or explosion, the hard
//! good-pixel filter (explode only), the good-record soft filter and the
//! optional overlap selection. Every record that
//! leaves the pipeline carries the `exclusion_reason` annotation; an
//! accepted match-up is a record whose reason is empty.

use crate::config::{MatchupConfig, Mode};
use crate::error::{MatchupError, Result};
use crate::extract::{output_header, pixel_header, MacroPixelExtractor};
use crate::filter::{
    good_pixel_filter, ExpressionCompiler, FilterChain, RecordFilter, EXCLUSION_REASON_EXPRESSION,
};
use crate::overlap::OverlapSelector;
use crate::position::PixelPosProvider;
use crate::raster::RasterSource;
use crate::record::{Header, Record};
use crate::reference::{read_all, ReferenceSource};
use crate::transform::RecordTransformer;
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

/// Counters of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchupStats {
    /// Reference records read.
    pub reference_records: usize,
    /// Records resolved onto the raster.
    pub resolved: usize,
    /// Output records, including soft-excluded ones.
    pub emitted: usize,
    /// Output records without exclusion reason.
    pub accepted: usize,
    /// Output records annotated as overlapping.
    pub overlapping: usize,
}

impl fmt::Display for MatchupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reference records, {} resolved, {} emitted, {} accepted, {} overlapping",
            self.reference_records, self.resolved, self.emitted, self.accepted, self.overlapping
        )
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct MatchupOutput {
    pub header: Arc<Header>,
    pub records: Vec<Record>,
    pub stats: MatchupStats,
}

impl MatchupOutput {
    /// Iterate over accepted match-ups only.
    pub fn accepted(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| !r.is_excluded())
    }
}

/// A validated configuration bound to an expression compiler.
pub struct Pipeline<'c> {
    config: MatchupConfig,
    compiler: &'c dyn ExpressionCompiler,
}

impl<'c> Pipeline<'c> {
    /// Validate the configuration. Fails with a configuration error.
    pub fn new(config: MatchupConfig, compiler: &'c dyn ExpressionCompiler) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, compiler })
    }

    #[inline]
    pub fn config(&self) -> &MatchupConfig {
        &self.config
    }

    /// Run the pipeline for one product.
    ///
    /// Expressions are compiled against the product's headers before any
    /// reference record is read, so configuration errors surface first.
    pub fn run(
        &self,
        reference: &mut dyn ReferenceSource,
        raster: &dyn RasterSource,
    ) -> Result<MatchupOutput> {
        let config = &self.config;
        let reference_header = reference.header().clone();
        if !reference_header.has_location() {
            return Err(MatchupError::Config(
                "reference records have no location columns".to_string(),
            ));
        }

        let header = Arc::new(output_header(&reference_header, raster, config.copy_input));
        let good_pixel = config
            .good_pixel_expression()
            .map(|e| self.compiler.compile(e, &pixel_header(raster)))
            .transpose()?;
        let good_record = config
            .good_record_expression()
            .map(|e| self.compiler.compile(e, &header))
            .transpose()?;

        info!(
            "Extracting match-ups from '{}' ({}x{}, {} bands), macro pixel {}x{}, mode {:?}",
            raster.name(),
            raster.width(),
            raster.height(),
            raster.band_names().len(),
            config.macro_pixel_size,
            config.macro_pixel_size,
            config.mode
        );

        let references = read_all(reference)?;
        let mut stats = MatchupStats {
            reference_records: references.len(),
            ..MatchupStats::default()
        };

        let provider = PixelPosProvider::new(
            raster,
            config.time_criterion(),
            config.pixel_displacement_tolerance,
        );
        let candidates = provider.compute_pixel_pos_records(references);
        stats.resolved = candidates.len();
        debug!(
            "{} of {} reference records resolved on '{}'",
            stats.resolved,
            stats.reference_records,
            raster.name()
        );

        let extractor = MacroPixelExtractor::new(
            raster,
            Arc::clone(&header),
            config.macro_pixel_size,
            config.copy_input,
            good_pixel,
        );
        let transformer = RecordTransformer::new(
            config.mode,
            extractor.mask_index(),
            config.filtered_mean_coefficient,
        );
        let mut filters = FilterChain::new();
        if let (Mode::Explode, Some(mask_index)) = (config.mode, extractor.mask_index()) {
            filters.push(good_pixel_filter(mask_index));
        }
        if let Some(predicate) = good_record {
            filters.push(RecordFilter::Soft {
                predicate,
                tag: EXCLUSION_REASON_EXPRESSION,
            });
        }
        let mut overlap = config
            .filter_overlapping
            .then(|| OverlapSelector::new(config.macro_pixel_size));

        let mut records = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let extracted = extractor.extract(candidate)?;
            let mut outputs = transformer.transform(extracted)?;
            outputs.retain_mut(|r| filters.accept(r));
            match overlap.as_mut() {
                Some(selector) => records.extend(selector.push(
                    candidate.pixel_pos(),
                    candidate.time_difference(),
                    outputs,
                )?),
                None => records.extend(outputs),
            }
        }
        if let Some(selector) = overlap {
            stats.overlapping = selector.marked();
            records.extend(selector.finish());
        }

        stats.emitted = records.len();
        stats.accepted = records.iter().filter(|r| !r.is_excluded()).count();
        info!("Product '{}': {}", raster.name(), stats);

        Ok(MatchupOutput {
            header,
            records,
            stats,
        })
    }
}

/// Validate `config`, then run one product through the pipeline.
pub fn extract(
    reference: &mut dyn ReferenceSource,
    raster: &dyn RasterSource,
    config: &MatchupConfig,
    compiler: &dyn ExpressionCompiler,
) -> Result<MatchupOutput> {
    Pipeline::new(config.clone(), compiler)?.run(reference, raster)
}
