//! calmatch: match-up extraction for calibration and validation
//!
//! Usage: calmatch <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use calmatch::config::{MatchupConfig, Mode};
use calmatch::error::{MatchupError, Result};
use calmatch::filter::NoExpressions;
use calmatch::parallel::{extract_products, ProductOutcome};
use calmatch::raster::MemoryRaster;
use calmatch::reference::{read_all, ReferenceSource, TsvRecordSource};
use calmatch::streaming::RecordWriter;

#[derive(Parser)]
#[command(name = "calmatch")]
#[command(version)]
#[command(about = "Match-up extraction of in-situ points against raster products", long_about = None)]
struct Cli {
    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Aggregate,
    Explode,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Aggregate => Mode::Aggregate,
            ModeArg::Explode => Mode::Explode,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract macro pixels around reference points from raster products
    Extract {
        /// JSON match-up configuration (defaults apply if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Tab-separated reference point file
        #[arg(short, long)]
        reference: PathBuf,

        /// JSON raster product (repeat for several products)
        #[arg(long, required = true)]
        raster: Vec<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the macro pixel size
        #[arg(short = 'n', long)]
        macro_pixel_size: Option<usize>,

        /// Override the output mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Maximum time difference; hours if >= 0, calendar days if < 0
        #[arg(long, allow_hyphen_values = true)]
        max_time_difference: Option<f64>,

        /// Mark overlapping macro pixels
        #[arg(long)]
        filter_overlapping: bool,

        /// Write accepted match-ups only, without annotation columns
        #[arg(long)]
        accepted_only: bool,

        /// Print per-product statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Validate a configuration and print it with all defaults applied
    Config {
        /// JSON match-up configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // Configure thread pool if --threads specified
    if let Some(n) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
            error!("Failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Extract {
            config,
            reference,
            raster,
            output,
            macro_pixel_size,
            mode,
            max_time_difference,
            filter_overlapping,
            accepted_only,
            stats,
        } => load_config(config).and_then(|mut cfg| {
            if let Some(n) = macro_pixel_size {
                cfg.macro_pixel_size = n;
            }
            if let Some(m) = mode {
                cfg.mode = m.into();
            }
            if let Some(v) = max_time_difference {
                cfg = cfg.with_signed_max_time_difference(v)?;
            }
            cfg.filter_overlapping |= filter_overlapping;
            run_extract(cfg, reference, raster, output, accepted_only, stats)
        }),
        Commands::Config { config } => load_config(config).and_then(run_config),
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> Result<MatchupConfig> {
    match path {
        Some(p) => MatchupConfig::from_path(p),
        None => Ok(MatchupConfig::default()),
    }
}

fn run_config(config: MatchupConfig) -> Result<()> {
    config.validate()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &config)?;
    writeln!(handle)?;
    Ok(())
}

fn run_extract(
    config: MatchupConfig,
    reference_path: PathBuf,
    raster_paths: Vec<PathBuf>,
    output: Option<PathBuf>,
    accepted_only: bool,
    stats: bool,
) -> Result<()> {
    config.validate()?;

    let mut source = TsvRecordSource::from_path(&reference_path)?;
    let reference_header = source.header().clone();
    let references = read_all(&mut source)?;
    info!(
        "Read {} reference records from {}",
        references.len(),
        reference_path.display()
    );

    let rasters = raster_paths
        .iter()
        .map(MemoryRaster::from_path)
        .collect::<Result<Vec<_>>>()?;

    let mut outcomes: Vec<ProductOutcome> = Vec::with_capacity(rasters.len());
    extract_products(
        &reference_header,
        &references,
        &rasters,
        &config,
        &NoExpressions,
        |outcome| outcomes.push(outcome),
    )?;
    outcomes.sort_by_key(|o| o.index);

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = RecordWriter::new(sink).accepted_only(accepted_only);

    let mut failed = Vec::new();
    let mut header_written: Option<calmatch::Header> = None;
    for outcome in outcomes {
        let out = match outcome.result {
            Ok(out) => out,
            Err(e) if e.is_configuration_error() => return Err(e),
            Err(e) => {
                error!("Product '{}' failed: {}", outcome.product, e);
                failed.push(outcome.product);
                continue;
            }
        };
        if stats {
            eprintln!("{}\t{}", outcome.product, out.stats);
        }
        match &header_written {
            None => {
                writer.write_header(&out.header, out.records.first())?;
                header_written = Some((*out.header).clone());
            }
            Some(h) if *h != *out.header => {
                error!(
                    "Product '{}' skipped: its columns differ from the first product",
                    outcome.product
                );
                failed.push(outcome.product);
                continue;
            }
            Some(_) => {}
        }
        for record in &out.records {
            writer.write_record(record)?;
        }
    }
    writer.flush()?;

    if failed.is_empty() {
        Ok(())
    } else {
        Err(MatchupError::Raster {
            product: failed.join(", "),
            message: "extraction failed".to_string(),
        })
    }
}
