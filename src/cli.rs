use clap::{Args, Parser, Subcommand};
use lazy_static::lazy_static;
use log::{error, info};
use std::path::{Path, PathBuf};

use crate::generation_search::{SearchSettings, LIKELIHOOD_STOP_RATIO, MAX_GENERATIONS};
use crate::likelihood::ApproximationOrder;

lazy_static! {
    /// Stores the full version string we plan to use.
    /// # Examples
    /// * `0.3.0-6bb9635-dirty` - while on a dirty branch
    /// * `0.3.0-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));
}

#[derive(Clone, Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about,
    after_help = "Estimates the number of generations since the most recent common ancestor of a mutation
from the lengths of the ancestral haplotype shared by its carriers.")]
pub struct Settings {
    #[clap(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    #[clap(global = true)]
    pub verbosity: u8
}

#[derive(Clone, Subcommand)]
pub enum Command {
    /// Estimate the age of a mutation from a model file
    Run(RunSettings),
    /// Compute the recombination fraction between two positions from a genetic map
    Rate(RateSettings)
}

#[derive(Args, Clone)]
pub struct RunSettings {
    /// Input model file (optionally gzipped)
    #[clap(required = true)]
    #[clap(short = 'i')]
    #[clap(long = "input")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub input_filename: PathBuf,

    /// Output summary file with the estimate (optional, csv/tsv)
    #[clap(long = "summary-file")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub summary_filename: Option<PathBuf>,

    /// Output likelihood of every evaluated generation (optional, csv/tsv)
    #[clap(long = "profile-file")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub profile_filename: Option<PathBuf>,

    /// Number of threads to use for likelihood evaluation
    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Depth of the frequent allele alternatives in the likelihood
    #[clap(long = "approximation-order")]
    #[clap(value_name = "ORDER")]
    #[clap(default_value = "3")]
    #[clap(value_parser = clap::value_parser!(u8).range(1..=3))]
    #[clap(help_heading = Some("Search"))]
    pub approximation_order: u8,

    /// Stops the search once the maximum likelihood exceeds the current one by this factor
    #[clap(long = "stop-ratio")]
    #[clap(value_name = "RATIO")]
    #[clap(default_value_t = LIKELIHOOD_STOP_RATIO)]
    #[clap(help_heading = Some("Search"))]
    pub stop_ratio: f64,

    /// Fails if the search is still running at this generation count
    #[clap(long = "max-generations")]
    #[clap(value_name = "GENERATIONS")]
    #[clap(default_value_t = MAX_GENERATIONS)]
    #[clap(help_heading = Some("Search"))]
    pub max_generations: u32
}

impl RunSettings {
    /// Builds the search configuration from the CLI settings
    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            order: ApproximationOrder::from_level(self.approximation_order).unwrap_or_default(),
            stop_ratio: self.stop_ratio,
            max_generations: self.max_generations,
            threads: self.threads,
            cancel_flag: None
        }
    }
}

#[derive(Args, Clone)]
pub struct RateSettings {
    /// Genetic map with recombination rates, HapMap format (optionally gzipped)
    #[clap(required = true)]
    #[clap(short = 'm')]
    #[clap(long = "map")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub map_filename: PathBuf,

    /// First position (bp)
    #[clap(required = true)]
    #[clap(long = "position1")]
    #[clap(value_name = "POS")]
    pub position1: i64,

    /// Second position (bp)
    #[clap(required = true)]
    #[clap(long = "position2")]
    #[clap(value_name = "POS")]
    pub position2: i64
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
fn check_required_filename(filename: &Path, label: &str) {
    if !filename.exists() {
        error!("{} does not exist: \"{}\"", label, filename.display());
        std::process::exit(exitcode::NOINPUT);
    } else {
        info!("{}: \"{}\"", label, filename.display());
    }
}

/// Checks an optional output file, only logging it
fn log_optional_filename(filename: &Option<PathBuf>, label: &str) {
    if let Some(filename) = filename {
        info!("{}: \"{}\"", label, filename.display());
    }
}

pub fn get_raw_settings() -> Settings {
    Settings::parse()
}

/// Do some additional checks here, we may increase these as we go.
/// Also can modify settings if needed since we're passing it around.
/// # Arguments
/// * `settings` - the raw settings, nothing has been checked other than what clap does for us.
pub fn check_settings(mut settings: Settings) -> Settings {
    info!("EstiAge version: {}", &*FULL_VERSION);
    match &mut settings.command {
        Command::Run(run_settings) => {
            check_required_filename(&run_settings.input_filename, "Model file");
            log_optional_filename(&run_settings.summary_filename, "Summary file");
            log_optional_filename(&run_settings.profile_filename, "Profile file");

            // 0 is an alias for "use 1 thread"
            if run_settings.threads == 0 {
                run_settings.threads = 1;
            }
            info!("Processing threads: {}", run_settings.threads);

            if !(run_settings.stop_ratio > 1.0) {
                error!("--stop-ratio must be greater than 1, found {}", run_settings.stop_ratio);
                std::process::exit(exitcode::USAGE);
            }
            if run_settings.max_generations == 0 {
                error!("--max-generations must be at least 1");
                std::process::exit(exitcode::USAGE);
            }

            info!("Generation search:");
            info!("\tApproximation order: {}", run_settings.approximation_order);
            info!("\tStop ratio: {}", run_settings.stop_ratio);
            info!("\tMaximum generations: {}", run_settings.max_generations);
        },
        Command::Rate(rate_settings) => {
            check_required_filename(&rate_settings.map_filename, "Genetic map");
            info!("Positions: {} - {}", rate_settings.position1, rate_settings.position2);
        }
    };
    settings
}
