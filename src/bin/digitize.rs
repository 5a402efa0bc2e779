//! Command-line front end: digitise every image in a directory into CSV
//! traces and overlay PNGs (spec.md §6). The GUI that the reference system
//! ships is out of scope; this is the crate's only bundled caller.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ecg_digitizer::batch;
use ecg_digitizer::config::{Configuration, Layout};
use ecg_digitizer::lead::Lead;

/// Digitise scanned paper 12-lead ECGs into voltage CSVs and trace overlays.
#[derive(Parser, Debug)]
#[command(name = "digitize", version, about)]
struct Args {
    /// Directory of input ECG images (jpg/png).
    input_dir: PathBuf,

    /// Directory to write <name>.csv and <name>_trace.png into.
    output_dir: PathBuf,

    /// Panel layout rows.
    #[arg(long, default_value_t = 3)]
    rows: u32,

    /// Panel layout columns.
    #[arg(long, default_value_t = 4)]
    cols: u32,

    /// Comma-separated rhythm strip leads, top to bottom (e.g. "II,V1").
    #[arg(long, default_value = "")]
    rhythm: String,

    /// The calibration pulse is printed at the right of each row.
    #[arg(long, default_value_t = false)]
    rp_at_right: bool,

    /// Use the Cabrera lead ordering (inverts aVR).
    #[arg(long, default_value_t = false)]
    cabrera: bool,

    /// Resample every lead to exactly this many observations.
    #[arg(long)]
    interpolation: Option<u32>,

    /// Load the configuration from a saved JSON file instead of the flags
    /// above (written previously via `Configuration::save`).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn build_config(args: &Args) -> Result<Configuration> {
    if let Some(path) = &args.config {
        return Configuration::load(path).map_err(anyhow::Error::msg).context("loading --config file");
    }
    let rhythm: Vec<Lead> = args
        .rhythm
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Lead>().map_err(anyhow::Error::msg))
        .collect::<Result<_>>()
        .context("parsing --rhythm")?;

    Configuration::new(Layout::new(args.rows, args.cols), rhythm, args.rp_at_right, args.cabrera, args.interpolation)
        .map_err(anyhow::Error::msg)
        .context("building configuration from flags")
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = build_config(&args)?;

    let inputs: Vec<PathBuf> = fs::read_dir(&args.input_dir)
        .with_context(|| format!("reading input directory {:?}", args.input_dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();

    let cancel = Arc::new(AtomicBool::new(false));
    let results = batch::run(&inputs, &args.output_dir, &config, None, cancel);
    batch::log_summary(&results);

    let failures = results.iter().filter(|(_, err)| err.is_some()).count();
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
