//! Parallel processing of several raster products using Rayon.
//!
//! Each product runs the full pipeline on a pool thread against its own
//! copy of the reference records. Outcomes are sent through a channel and
//! handed to a single consumer on the calling thread, in completion order.

use crate::config::MatchupConfig;
use crate::error::Result;
use crate::filter::ExpressionCompiler;
use crate::pipeline::{MatchupOutput, Pipeline};
use crate::raster::RasterSource;
use crate::record::{Header, Record};
use crate::reference::VecRecordSource;
use crossbeam_channel::unbounded;
use log::warn;

/// Result of one product.
#[derive(Debug)]
pub struct ProductOutcome {
    /// Position of the product in the input slice.
    pub index: usize,
    pub product: String,
    pub result: Result<MatchupOutput>,
}

/// Run the pipeline for every product concurrently.
///
/// The configuration is validated once up front; a product failure is
/// reported in its own outcome and does not stop the others.
pub fn extract_products<R, F>(
    reference_header: &Header,
    references: &[Record],
    rasters: &[R],
    config: &MatchupConfig,
    compiler: &dyn ExpressionCompiler,
    mut consumer: F,
) -> Result<()>
where
    R: RasterSource + Sync,
    F: FnMut(ProductOutcome),
{
    let pipeline = Pipeline::new(config.clone(), compiler)?;
    let pipeline = &pipeline;
    let (tx, rx) = unbounded::<ProductOutcome>();

    rayon::in_place_scope(|scope| {
        for (index, raster) in rasters.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let mut source = VecRecordSource::new(reference_header.clone(), references.to_vec());
                let result = pipeline.run(&mut source, raster);
                let outcome = ProductOutcome {
                    index,
                    product: raster.name().to_string(),
                    result,
                };
                if tx.send(outcome).is_err() {
                    warn!("Outcome of product '{}' dropped", raster.name());
                }
            });
        }
        drop(tx);

        for outcome in rx.iter() {
            consumer(outcome);
        }
    });

    Ok(())
}
