//! Fit a focus curve to one night's guide-camera focus sweep
//!
//! Usage:
//! ```text
//! cargo run --release --features fits --bin focus_curve -- \
//!     --mjd 59800 --min-seqno 120 --max-seqno 180
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use focus::config::FocusConfig;
use focus::discovery::{discover_exposures, DEFAULT_GCAM_ROOT};
use focus::fwhm::FwhmMethod;
use focus::pipeline::FocusPipeline;
use shared::image_proc::detection::ThresholdDetector;

/// Command line arguments for focus curve fitting
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fit FWHM against M2 piston for a guide-camera focus sweep",
    long_about = None
)]
struct Args {
    /// Observing night (SJD) whose exposures are analysed
    #[arg(long)]
    mjd: u32,

    /// Root of the guide camera archive
    #[arg(long, default_value = DEFAULT_GCAM_ROOT)]
    root: PathBuf,

    /// First sequence number of the sweep (needs --max-seqno)
    #[arg(long)]
    min_seqno: Option<u32>,

    /// Last sequence number of the sweep (needs --min-seqno)
    #[arg(long)]
    max_seqno: Option<u32>,

    /// Number of extraction workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Sigma clipping threshold within each M2 position
    #[arg(long)]
    clip_sigma: Option<f64>,

    /// Offset added to the fitted best focus
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<f64>,

    /// FWHM derivation: axis-ratio or weighted-std
    #[arg(long)]
    fwhm_method: Option<FwhmMethod>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the JSON report here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn focus_config(&self) -> Result<FocusConfig> {
        let mut config = match &self.config {
            Some(path) => FocusConfig::load_from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => FocusConfig::default(),
        };

        if self.min_seqno.is_some() || self.max_seqno.is_some() {
            config.min_seqno = self.min_seqno;
            config.max_seqno = self.max_seqno;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(sigma) = self.clip_sigma {
            config.clip.sigma = sigma;
        }
        if let Some(offset) = self.offset {
            config.offset = offset;
        }
        if let Some(method) = self.fwhm_method {
            config.fwhm_method = method;
        }
        Ok(config)
    }
}

#[cfg(feature = "fits")]
fn exposure_loader() -> Result<focus::fits_loader::FitsExposureLoader> {
    Ok(focus::fits_loader::FitsExposureLoader::default())
}

#[cfg(not(feature = "fits"))]
fn exposure_loader() -> Result<focus::exposure::InMemoryLoader> {
    anyhow::bail!("focus_curve was built without FITS support; rebuild with --features fits")
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = args.focus_config()?;
    if config.min_seqno.is_some() != config.max_seqno.is_some() {
        log::warn!("only one sequence number bound given; analysing every exposure");
    }

    let paths = discover_exposures(&args.root, args.mjd)
        .with_context(|| format!("failed to list exposures for {}", args.mjd))?;
    if paths.is_empty() {
        anyhow::bail!(
            "no guide frames found under {}",
            args.root.join(args.mjd.to_string()).display()
        );
    }
    let identifiers: Vec<String> = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();

    let loader = exposure_loader()?;
    let detector = ThresholdDetector::new(config.extraction.detector_config())
        .context("invalid extraction settings")?;

    let pipeline = FocusPipeline::new(config, &detector, &loader);
    let report = pipeline
        .run(&identifiers)
        .with_context(|| format!("focus analysis of {} failed", args.mjd))?;

    println!("Focus sweep {}", args.mjd);
    println!("{report}");

    if let Some(path) = &args.output {
        report
            .save_to_file(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        log::info!("report written to {}", path.display());
    }

    Ok(())
}
