use crate::data_types::model::{EndMarkerRecord, Model};
use crate::likelihood::{total_likelihood, ApproximationOrder};

use log::{debug, info, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use threadpool::ThreadPool;

/// The search stops once the running maximum exceeds the current likelihood by this factor
pub const LIKELIHOOD_STOP_RATIO: f64 = 10000.0;
/// Hard cap on the number of generations evaluated
pub const MAX_GENERATIONS: u32 = 50000;
/// Cumulative mass that defines the lower credible bound
pub const LOWER_QUANTILE: f64 = 0.025;
/// Cumulative mass that defines the upper credible bound
pub const UPPER_QUANTILE: f64 = 0.975;
/// Number of generations between progress messages
const UPDATE_SPEED: u32 = 1000;
/// Generations queued per worker thread in each parallel batch
const JOBS_PER_THREAD: u32 = 4;

#[derive(thiserror::Error, Debug)]
pub enum EstimationError {
    #[error("maximum number of iterations [{limit}] reached without the likelihood dropping below the stop ratio")]
    Convergence { limit: u32, diagnostics: Vec<EndMarkerRecord> },
    #[error("search cancelled before generation {generation}")]
    Cancelled { generation: u32 },
    #[error("likelihood worker failed: {0}")]
    WorkerFailure(String)
}

/// Controls for the generation search
#[derive(Clone, Debug)]
pub struct SearchSettings {
    /// Depth of the frequent allele alternatives
    pub order: ApproximationOrder,
    /// Ratio between the running maximum and the current likelihood that ends the search
    pub stop_ratio: f64,
    /// Generation count at which the search gives up
    pub max_generations: u32,
    /// Number of likelihood workers, 1 evaluates on the calling thread
    pub threads: usize,
    /// If set to true by another thread, the search stops at the next generation
    pub cancel_flag: Option<Arc<AtomicBool>>
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            order: ApproximationOrder::default(),
            stop_ratio: LIKELIHOOD_STOP_RATIO,
            max_generations: MAX_GENERATIONS,
            threads: 1,
            cancel_flag: None
        }
    }
}

impl SearchSettings {
    fn is_cancelled(&self) -> bool {
        self.cancel_flag.as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// One row of the likelihood profile
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProfilePoint {
    pub generation: u32,
    pub likelihood: f64,
    pub log_likelihood: f64,
    /// Fraction of the total mass at or below this generation
    pub cumulative_mass: f64
}

/// Outcome of a completed search
#[derive(Clone, Debug, PartialEq)]
pub struct EstimateResult {
    /// Generation with the largest likelihood, earliest wins only if strictly larger
    max_generation: u32,
    /// Last generation evaluated by the search
    end_generation: u32,
    /// 0 if unset
    lower_bound: u32,
    /// 0 if unset
    upper_bound: u32,
    /// Natural log of the maximum likelihood
    log_likelihood: f64,
    /// Likelihood of generations 1..=end_generation
    likelihoods: Vec<f64>
}

impl EstimateResult {
    pub fn max_generation(&self) -> u32 {
        self.max_generation
    }

    pub fn end_generation(&self) -> u32 {
        self.end_generation
    }

    /// First generation where the cumulative mass exceeds 2.5%
    pub fn lower_bound(&self) -> Option<u32> {
        if self.lower_bound > 0 { Some(self.lower_bound) } else { None }
    }

    /// First generation where the cumulative mass exceeds 97.5%, None if it never does
    pub fn upper_bound(&self) -> Option<u32> {
        if self.upper_bound > 0 { Some(self.upper_bound) } else { None }
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Likelihood of each generation, index 0 is generation 1
    pub fn likelihoods(&self) -> &[f64] {
        &self.likelihoods
    }

    /// The likelihood table with the log value and cumulative mass of each generation
    pub fn profile(&self) -> Vec<ProfilePoint> {
        let total: f64 = sequential_sum(&self.likelihoods);
        let mut cumulative: f64 = 0.0;
        self.likelihoods.iter()
            .enumerate()
            .map(|(i, &likelihood)| {
                cumulative += likelihood / total;
                ProfilePoint {
                    generation: i as u32 + 1,
                    likelihood,
                    log_likelihood: likelihood.ln(),
                    cumulative_mass: cumulative
                }
            })
            .collect()
    }
}

impl fmt::Display for EstimateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f, "n = {}, nend = {}, ninf = {}, nsup = {}, likelihood = {}",
            self.max_generation, self.end_generation, self.lower_bound, self.upper_bound,
            format_decimal(self.log_likelihood)
        )
    }
}

/// Formats a value for the result line: a trailing `.0` on integral values,
/// `E` notation outside [1e-3, 1e7), and `Infinity`/`NaN` for non-finite values.
fn format_decimal(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }

    let magnitude: f64 = value.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let plain: String = format!("{}", value);
        if plain.contains('.') { plain } else { format!("{plain}.0") }
    } else {
        let scientific: String = format!("{:e}", value);
        match scientific.split_once('e') {
            Some((mantissa, exponent)) if !mantissa.contains('.') => format!("{mantissa}.0E{exponent}"),
            Some((mantissa, exponent)) => format!("{mantissa}E{exponent}"),
            None => scientific
        }
    }
}

/// Left-to-right sum so the total matches the order used for the cumulative mass
fn sequential_sum(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |total, &value| total + value)
}

/// Finds the first generations whose cumulative likelihood mass exceeds each quantile.
/// Returns (lower, upper), with 0 for a bound that was never reached.
/// # Arguments
/// * `likelihoods` - likelihood of each generation, index 0 is generation 1
pub fn credible_interval(likelihoods: &[f64]) -> (u32, u32) {
    let total: f64 = sequential_sum(likelihoods);
    let mut cumulative: f64 = 0.0;
    let mut lower: u32 = 0;
    let mut upper: u32 = 0;
    for (i, &likelihood) in likelihoods.iter().enumerate() {
        let generation: u32 = i as u32 + 1;
        cumulative += likelihood / total;
        if cumulative > LOWER_QUANTILE && lower == 0 {
            lower = generation;
        }
        if cumulative > UPPER_QUANTILE {
            upper = generation;
            break;
        }
    }
    (lower, upper)
}

/// Lazily filled table of likelihoods by generation.
/// With a thread pool, generations are evaluated ahead of the search in batches.
struct LikelihoodTable {
    model: Arc<Model>,
    order: ApproximationOrder,
    max_generations: u32,
    pool: Option<ThreadPool>,
    batch_size: u32,
    /// index 0 is unused so the table is indexed by generation
    values: Vec<f64>
}

impl LikelihoodTable {
    fn new(model: Arc<Model>, settings: &SearchSettings) -> LikelihoodTable {
        let pool: Option<ThreadPool> = if settings.threads > 1 {
            info!("Starting likelihood pool with {} threads...", settings.threads);
            Some(ThreadPool::new(settings.threads))
        } else {
            None
        };
        LikelihoodTable {
            model,
            order: settings.order,
            max_generations: settings.max_generations,
            pool,
            batch_size: JOBS_PER_THREAD * settings.threads.max(1) as u32,
            values: vec![0.0]
        }
    }

    /// Returns the likelihood of `generation`, evaluating it (and possibly a batch after it) if needed.
    /// Generations must be requested in increasing order.
    fn get(&mut self, generation: u32) -> Result<f64, EstimationError> {
        while self.values.len() <= generation as usize {
            let start: u32 = self.values.len() as u32;
            match self.pool.as_ref() {
                None => {
                    self.values.push(total_likelihood(&self.model, start, self.order));
                },
                Some(pool) => {
                    let end: u32 = (start + self.batch_size - 1).min(self.max_generations).max(generation);
                    let batch = evaluate_batch(pool, &self.model, self.order, start, end)?;
                    self.values.extend(batch);
                }
            };
        }
        Ok(self.values[generation as usize])
    }

    /// Likelihoods of generations 1..=end_generation
    fn into_likelihoods(mut self, end_generation: u32) -> Vec<f64> {
        self.values.truncate(end_generation as usize + 1);
        self.values.remove(0);
        self.values
    }
}

/// Evaluates generations `start..=end` on the pool and returns them in generation order
fn evaluate_batch(
    pool: &ThreadPool, model: &Arc<Model>, order: ApproximationOrder, start: u32, end: u32
) -> Result<Vec<f64>, EstimationError> {
    let (tx, rx) = mpsc::channel();
    for generation in start..=end {
        let tx = tx.clone();
        let arc_model = model.clone();
        pool.execute(move || {
            let likelihood: f64 = total_likelihood(&arc_model, generation, order);
            tx.send((generation, likelihood)).expect("channel will be there waiting for the pool");
        });
    }
    // only the workers hold senders now, so a panic ends the receive loop instead of hanging
    drop(tx);

    let mut batch: Vec<f64> = vec![0.0; (end - start + 1) as usize];
    for _ in start..=end {
        let (generation, likelihood) = rx.recv().map_err(|e| {
            EstimationError::WorkerFailure(format!("{} (panics in pool: {})", e, pool.panic_count()))
        })?;
        batch[(generation - start) as usize] = likelihood;
    }
    Ok(batch)
}

/// Scans generation counts upward from 1 until the likelihood falls far below its running maximum.
/// The stop rule is always applied in generation order, so the parallel path returns the same result as the serial one.
/// # Arguments
/// * `model` - the trimmed model, shared with any worker threads
/// * `settings` - stop constants, approximation order, threading and cancellation
/// # Errors
/// * `EstimationError::Convergence` if `max_generations` is passed, with the end marker table for diagnosis
/// * `EstimationError::Cancelled` if the cancellation flag is raised
/// * `EstimationError::WorkerFailure` if a likelihood worker dies
pub fn find_max_likelihood(model: &Arc<Model>, settings: &SearchSettings) -> Result<EstimateResult, EstimationError> {
    info!(
        "Searching generations with approximation order {}, stop ratio {}, limit {}...",
        settings.order, settings.stop_ratio, settings.max_generations
    );
    let mut table = LikelihoodTable::new(model.clone(), settings);

    let mut generation: u32 = 1;
    if settings.is_cancelled() {
        return Err(EstimationError::Cancelled { generation });
    }
    let mut max_likelihood: f64 = table.get(generation)?;
    let mut max_generation: u32 = generation;
    let mut current: f64 = max_likelihood;
    trace!("Generation {}: {}", generation, current);

    // a NaN ratio fails the comparison and ends the search
    while max_likelihood / current < settings.stop_ratio {
        if current >= max_likelihood {
            max_likelihood = current;
            max_generation = generation;
        }

        generation += 1;
        if generation > settings.max_generations {
            return Err(EstimationError::Convergence {
                limit: settings.max_generations,
                diagnostics: model.end_marker_table()
            });
        }
        if settings.is_cancelled() {
            return Err(EstimationError::Cancelled { generation });
        }

        current = table.get(generation)?;
        trace!("Generation {}: {}", generation, current);
        if generation % UPDATE_SPEED == 0 {
            debug!("Evaluated {} generations, maximum so far at generation {}", generation, max_generation);
        }
    }

    let end_generation: u32 = generation;
    let likelihoods: Vec<f64> = table.into_likelihoods(end_generation);
    let (lower_bound, upper_bound) = credible_interval(&likelihoods);
    if upper_bound == 0 {
        warn!("Cumulative likelihood never exceeded {} before generation {}, upper bound is unset", UPPER_QUANTILE, end_generation);
    }
    info!("Search finished after {} generations.", end_generation);

    Ok(EstimateResult {
        max_generation,
        end_generation,
        lower_bound,
        upper_bound,
        log_likelihood: max_likelihood.ln(),
        likelihoods
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Every individual has weight 0, so the likelihood is the same at every generation
    const FLAT_MODEL: &str = "4 3 2
0.01 0.02 0.03
0.5 0.25 0.125
0.015 0.025
0.4 0.6
0.001 0
1 1 1 -1
1 1 -1
3 2 2 2 0
3 1 1 1 0
1 0 2 2 0
0 2 1 1 0
";

    fn load_fixture() -> Arc<Model> {
        Arc::new(Model::from_path(&PathBuf::from("./test_data/f508del.estinput")).unwrap())
    }

    #[test]
    fn test_regression_fixture() {
        let model = load_fixture();
        let result = find_max_likelihood(&model, &SearchSettings::default()).unwrap();
        assert_eq!(result.max_generation(), 149);
        assert_eq!(result.end_generation(), 294);
        assert_eq!(result.lower_bound(), Some(109));
        assert_eq!(result.upper_bound(), Some(209));
        assert!((result.log_likelihood() - (-114.29372603629017)).abs() < 1e-6);
        assert_eq!(result.likelihoods().len(), 294);
        assert!(result.to_string().starts_with("n = 149, nend = 294, ninf = 109, nsup = 209, likelihood = -114.29372"));

        let profile = result.profile();
        assert_eq!(profile.len(), 294);
        assert_eq!(profile[148].generation, 149);
        assert!((profile[148].log_likelihood - result.log_likelihood()).abs() < 1e-12);
        assert!((profile[293].cumulative_mass - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let model = load_fixture();
        let serial = find_max_likelihood(&model, &SearchSettings::default()).unwrap();
        for threads in [2, 3, 8].iter() {
            let settings = SearchSettings {
                threads: *threads,
                ..Default::default()
            };
            let parallel = find_max_likelihood(&model, &settings).unwrap();
            assert_eq!(parallel, serial);
        }
    }

    #[test]
    fn test_non_negative_likelihoods() {
        let model = load_fixture();
        for generation in (1..=MAX_GENERATIONS).step_by(97) {
            let likelihood = total_likelihood(&model, generation, ApproximationOrder::Third);
            assert!(likelihood >= 0.0, "generation {generation}: {likelihood}");
        }
    }

    #[test]
    fn test_convergence_failure() {
        let model: Arc<Model> = Arc::new(FLAT_MODEL.parse().unwrap());
        let settings = SearchSettings {
            max_generations: 200,
            ..Default::default()
        };
        match find_max_likelihood(&model, &settings) {
            Err(EstimationError::Convergence { limit, diagnostics }) => {
                assert_eq!(limit, 200);
                assert_eq!(diagnostics.len(), model.individual_count());
                assert_eq!(diagnostics[0], EndMarkerRecord { individual: 0, left: 4, right: 3 });
            },
            other => panic!("unexpected result: {other:?}")
        };

        // same outcome through the pool
        let settings = SearchSettings {
            max_generations: 200,
            threads: 4,
            ..Default::default()
        };
        assert!(matches!(find_max_likelihood(&model, &settings), Err(EstimationError::Convergence { limit: 200, .. })));
    }

    #[test]
    fn test_cancellation() {
        let model: Arc<Model> = Arc::new(FLAT_MODEL.parse().unwrap());
        let flag = Arc::new(AtomicBool::new(true));
        let settings = SearchSettings {
            cancel_flag: Some(flag.clone()),
            ..Default::default()
        };
        assert!(matches!(find_max_likelihood(&model, &settings), Err(EstimationError::Cancelled { generation: 1 })));

        // lowering the flag lets the search run again
        flag.store(false, Ordering::Relaxed);
        let settings = SearchSettings {
            cancel_flag: Some(flag),
            max_generations: 10,
            ..Default::default()
        };
        assert!(matches!(find_max_likelihood(&model, &settings), Err(EstimationError::Convergence { .. })));
    }

    #[test]
    fn test_stop_ratio() {
        let model = load_fixture();
        let settings = SearchSettings {
            stop_ratio: 10.0,
            ..Default::default()
        };
        let result = find_max_likelihood(&model, &settings).unwrap();
        // the maximum does not depend on where the scan stops, as long as it is past the peak
        assert_eq!(result.max_generation(), 149);
        assert!(result.end_generation() < 294);
        assert!(result.end_generation() > 149);
    }

    #[test]
    fn test_credible_interval() {
        assert_eq!(credible_interval(&[1.0, 1.0, 1.0, 1.0]), (1, 4));
        assert_eq!(credible_interval(&[0.01, 0.5, 0.48, 0.01]), (2, 3));
        // no mass at all leaves both bounds unset
        assert_eq!(credible_interval(&[0.0, 0.0]), (0, 0));
        assert_eq!(credible_interval(&[]), (0, 0));
    }

    #[test]
    fn test_unset_bounds() {
        let result = EstimateResult {
            max_generation: 1,
            end_generation: 1,
            lower_bound: 0,
            upper_bound: 0,
            log_likelihood: 0.0,
            likelihoods: vec![0.0]
        };
        assert_eq!(result.lower_bound(), None);
        assert_eq!(result.upper_bound(), None);
        assert_eq!(result.to_string(), "n = 1, nend = 1, ninf = 0, nsup = 0, likelihood = 0.0");
    }

    #[test]
    fn test_underflowed_likelihood_line() {
        let result = EstimateResult {
            max_generation: 1,
            end_generation: 2,
            lower_bound: 0,
            upper_bound: 0,
            log_likelihood: f64::NEG_INFINITY,
            likelihoods: vec![0.0, 0.0]
        };
        assert_eq!(result.to_string(), "n = 1, nend = 2, ninf = 0, nsup = 0, likelihood = -Infinity");
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(-114.29372603629017), "-114.29372603629017");
        assert_eq!(format_decimal(-12.0), "-12.0");
        assert_eq!(format_decimal(0.0), "0.0");
        assert_eq!(format_decimal(-0.0), "-0.0");
        assert_eq!(format_decimal(0.001), "0.001");
        assert_eq!(format_decimal(-1.5e-5), "-1.5E-5");
        assert_eq!(format_decimal(-1e-4), "-1.0E-4");
        assert_eq!(format_decimal(-12345678.0), "-1.2345678E7");
        assert_eq!(format_decimal(f64::INFINITY), "Infinity");
        assert_eq!(format_decimal(f64::NAN), "NaN");
    }
}
