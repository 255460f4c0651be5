use estiage::cli::{Command, RateSettings, RunSettings, Settings, check_settings, get_raw_settings};
use estiage::data_types::model::{FormatError, Model};
use estiage::generation_search::{EstimateResult, EstimationError, find_max_likelihood};
use estiage::recombination_map::{RateEstimate, RecombinationMap};
use estiage::writers::profile_writer::ProfileWriter;
use estiage::writers::summary_writer::SummaryWriter;

use log::{LevelFilter, debug, error, info};
use std::sync::Arc;
use std::time::Instant;

fn main() {
    // get the settings
    let settings: Settings = get_raw_settings();
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };

    // immediately setup logging first
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    // okay, now we can check all the other settings
    let cli_settings: Settings = check_settings(settings);
    match &cli_settings.command {
        Command::Run(run_settings) => run_estimate(run_settings),
        Command::Rate(rate_settings) => run_rate(rate_settings)
    };
}

/// Loads the model, searches for the most likely generation count, and writes the outputs
/// # Arguments
/// * `run_settings` - the checked settings for the `run` subcommand
fn run_estimate(run_settings: &RunSettings) {
    let start_time = Instant::now();

    let model: Model = match Model::from_path(&run_settings.input_filename) {
        Ok(m) => m,
        Err(FormatError::Io(e)) => {
            error!("Error while reading {:?}: {}", run_settings.input_filename, e);
            std::process::exit(exitcode::IOERR);
        },
        Err(e) => {
            error!("Error while parsing {:?}: {}", run_settings.input_filename, e);
            std::process::exit(exitcode::DATAERR);
        }
    };
    let arc_model: Arc<Model> = Arc::new(model);

    let result: EstimateResult = match find_max_likelihood(&arc_model, &run_settings.search_settings()) {
        Ok(r) => r,
        Err(EstimationError::Convergence { limit, diagnostics }) => {
            error!("Maximum number of iterations [{}] reached, end markers (individual left right):", limit);
            for record in diagnostics.iter() {
                error!("{}", record);
            }
            std::process::exit(exitcode::SOFTWARE);
        },
        Err(e) => {
            error!("Error during generation search: {}", e);
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    // the estimate itself always goes to stdout
    println!("{}", result);
    debug!("Likelihood table holds {} generations", result.likelihoods().len());

    if let Some(ref filename) = run_settings.summary_filename {
        info!("Saving estimate summary to {:?}...", filename);
        let written = SummaryWriter::new(filename)
            .and_then(|mut writer| writer.write_result(&run_settings.input_filename, &result));
        if let Err(e) = written {
            error!("Error while writing summary file: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    }

    if let Some(ref filename) = run_settings.profile_filename {
        info!("Saving likelihood profile to {:?}...", filename);
        let written = ProfileWriter::new(filename)
            .and_then(|mut writer| writer.write_profile(&result));
        if let Err(e) = written {
            error!("Error while writing profile file: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    }

    info!("Estimate finished successfully after {} seconds.", start_time.elapsed().as_secs_f64());
}

/// Computes the recombination fraction between two positions from a genetic map
/// # Arguments
/// * `rate_settings` - the checked settings for the `rate` subcommand
fn run_rate(rate_settings: &RateSettings) {
    let mut recombination_map: RecombinationMap = match RecombinationMap::from_path(
        &rate_settings.map_filename, rate_settings.position1, rate_settings.position2
    ) {
        Ok(m) => m,
        Err(e) => {
            error!("Error while loading genetic map: {}", e);
            std::process::exit(exitcode::DATAERR);
        }
    };

    println!(
        "Measuring recombination fraction between [{}] and [{}] from file : {}",
        rate_settings.position1, rate_settings.position2, rate_settings.map_filename.display()
    );
    match RateEstimate::from_map(&mut recombination_map, rate_settings.position1, rate_settings.position2) {
        Ok(estimate) => println!("{}", estimate),
        Err(e) => {
            error!("Error while computing recombination rate: {}", e);
            std::process::exit(exitcode::DATAERR);
        }
    };
}
