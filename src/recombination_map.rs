use crate::probability::{centimorgans, kosambi_theta};

use flate2::bufread::MultiGzDecoder;
use log::{debug, info, warn};
use simple_error::bail;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Number of lines between progress messages while loading
const UPDATE_SPEED: u64 = 100000;

/// Recombination rates (cM/Mb) by position for a single chromosome, restricted to a window of interest
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecombinationMap {
    rates: BTreeMap<i64, f64>
}

impl RecombinationMap {
    /// Loads a HapMap-style genetic map, gzip is allowed.
    /// Files are expected to be split by chromosome, so the chromosome column is ignored.
    /// # Arguments
    /// * `filename` - tab-delimited file with a header, columns are chromosome, position, rate (cM/Mb), map (cM)
    /// * `first` - first position of interest
    /// * `last` - last position of interest
    /// # Errors
    /// * if the file cannot be opened or read
    /// * if no rate falls in or around the window
    pub fn from_path(filename: &Path, first: i64, last: i64) -> Result<RecombinationMap, Box<dyn std::error::Error>> {
        info!("Loading recombination rates from {:?} between {} and {}...", filename, first, last);
        let file: File = File::open(filename)?;
        let file_reader = BufReader::new(file);
        if filename.extension().unwrap_or_default() == "gz" {
            debug!("Detected gzip extension, loading genetic map with MultiGzDecoder...");
            let gz_decoder = MultiGzDecoder::new(file_reader);
            RecombinationMap::from_reader(gz_decoder, first, last)
        } else {
            RecombinationMap::from_reader(file_reader, first, last)
        }
    }

    /// Same as `from_path` but for any reader.
    /// Keeps the last point at or before `first`, every point after it, and the first point past `last`.
    /// Lines that fail to parse are skipped with a warning.
    pub fn from_reader<R: Read>(reader: R, first: i64, last: i64) -> Result<RecombinationMap, Box<dyn std::error::Error>> {
        let (first, last) = (first.min(last), first.max(last));
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut rates: BTreeMap<i64, f64> = BTreeMap::new();
        let mut previous: Option<(i64, f64)> = None;
        let mut lines_read: u64 = 0;
        for record_result in csv_reader.records() {
            let record = record_result?;
            lines_read += 1;
            if lines_read % UPDATE_SPEED == 0 {
                info!("Read {} genetic map lines...", lines_read);
            }

            let parsed: Option<(i64, f64)> = match (record.get(1), record.get(2)) {
                (Some(position), Some(rate)) => position.parse::<i64>().ok().zip(rate.parse::<f64>().ok()),
                _ => None
            };
            let (position, rate) = match parsed {
                Some(p) => p,
                None => {
                    warn!("Could not parse genetic map line {}: {:?}", lines_read + 1, record.iter().collect::<Vec<&str>>());
                    continue;
                }
            };

            if position > first {
                if let Some((previous_position, previous_rate)) = previous {
                    rates.insert(previous_position, previous_rate);
                }
            }
            if position > last {
                rates.insert(position, rate);
                debug!("Stopped loading at position {}", position);
                previous = None;
                break;
            }
            previous = Some((position, rate));
        }

        // the map ended inside the window
        if let Some((position, rate)) = previous {
            if position > first {
                rates.insert(position, rate);
            }
        }

        if rates.is_empty() {
            bail!("No recombination rates found around {}-{}", first, last);
        }
        let map = RecombinationMap { rates };
        if let (Some((lowest, lowest_rate)), Some((highest, highest_rate))) = (map.rates.first_key_value(), map.rates.last_key_value()) {
            info!("Loaded {} rates, first: {} ({}), last: {} ({})", map.len(), lowest, lowest_rate, highest, highest_rate);
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn rate_at(&self, position: i64) -> Option<f64> {
        self.rates.get(&position).copied()
    }

    /// Adds `position` to the map if absent and returns its rate.
    /// Positions outside the loaded range take the nearest end value, others are linearly interpolated.
    /// # Errors
    /// * if the map is empty
    pub fn add_position(&mut self, position: i64) -> Result<f64, Box<dyn std::error::Error>> {
        if let Some(rate) = self.rate_at(position) {
            return Ok(rate);
        }

        let left = self.rates.range(..position).next_back().map(|(&p, &r)| (p, r));
        let right = self.rates.range(position..).next().map(|(&p, &r)| (p, r));
        let rate: f64 = match (left, right) {
            (Some((left_position, left_rate)), Some((right_position, right_rate))) => {
                let gradient: f64 = (right_rate - left_rate) / (right_position - left_position) as f64;
                left_rate + gradient * (position - left_position) as f64
            },
            (None, Some((_, rate))) | (Some((_, rate)), None) => rate,
            (None, None) => bail!("Cannot add position {} to an empty recombination map", position)
        };
        self.rates.insert(position, rate);
        Ok(rate)
    }

    /// Mean recombination rate (cM/Mb) between two positions in any order.
    /// Integrates the rate with the trapezoid rule over every known point in between, adding the value at the last point once.
    pub fn mean_rate(&mut self, position1: i64, position2: i64) -> Result<f64, Box<dyn std::error::Error>> {
        self.add_position(position1)?;
        self.add_position(position2)?;
        let first: i64 = position1.min(position2);
        let last: i64 = position1.max(position2);

        let points: Vec<(i64, f64)> = self.rates.range(first..=last)
            .map(|(&p, &r)| (p, r))
            .collect();
        let mut rate_sum: f64 = 0.0;
        let mut right_rate: f64 = 0.0;
        for window in points.windows(2) {
            let (left_position, left_rate) = window[0];
            let (right_position, rate) = window[1];
            right_rate = rate;
            let mean: f64 = 0.5 * (right_rate + left_rate);
            rate_sum += (right_position - left_position) as f64 * mean;
        }
        rate_sum += right_rate;
        let distance: i64 = 1 + last - first;
        Ok(rate_sum / distance as f64)
    }
}

/// Recombination fraction between two positions derived from a genetic map
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateEstimate {
    /// `1 + position2 - position1`, signed
    pub distance_bp: i64,
    pub distance_mb: f64,
    /// Mean rate in cM/Mb
    pub rate: f64,
    pub centimorgans: f64,
    pub morgans: f64,
    /// Kosambi recombination fraction
    pub theta: f64
}

impl RateEstimate {
    /// Computes the recombination fraction between two positions, adding them to the map if needed
    pub fn from_map(map: &mut RecombinationMap, position1: i64, position2: i64) -> Result<RateEstimate, Box<dyn std::error::Error>> {
        let distance_bp: i64 = 1 + position2 - position1;
        let distance_mb: f64 = distance_bp as f64 * 0.000001;
        let rate: f64 = map.mean_rate(position1, position2)?;
        let centimorgans: f64 = centimorgans(rate, distance_mb);
        let morgans: f64 = centimorgans / 100.0;
        Ok(RateEstimate {
            distance_bp,
            distance_mb,
            rate,
            centimorgans,
            morgans,
            theta: kosambi_theta(morgans)
        })
    }
}

impl fmt::Display for RateEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "distance (b) : {}", self.distance_bp)?;
        writeln!(f, "distance (Mb) : {}", self.distance_mb)?;
        writeln!(f, "Rate : {}", self.rate)?;
        writeln!(f, "cM : {}", self.centimorgans)?;
        writeln!(f, "Morgans : {}", self.morgans)?;
        write!(f, "theta : {}", self.theta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn load_window() -> RecombinationMap {
        RecombinationMap::from_path(&PathBuf::from("./test_data/genetic_map_chr17.txt"), 50000, 53100).unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    #[test]
    fn test_load_window() {
        let map = load_window();
        // one point before the window, everything inside, one point after
        let positions: Vec<i64> = map.rates.keys().copied().collect();
        assert_eq!(positions, vec![41084, 51088, 52467, 53011, 53206]);
        assert_eq!(map.rate_at(53206), Some(2.487219));

        // reversed bounds load the same window
        let reversed = RecombinationMap::from_path(&PathBuf::from("./test_data/genetic_map_chr17.txt"), 53100, 50000).unwrap();
        assert_eq!(reversed, map);

        // a window past the end of the map keeps the tail
        let tail = RecombinationMap::from_path(&PathBuf::from("./test_data/genetic_map_chr17.txt"), 58000, 90000).unwrap();
        assert_eq!(tail.rates.keys().copied().collect::<Vec<i64>>(), vec![57026, 58275, 58449]);
    }

    #[test]
    fn test_empty_map() {
        let text = "Chromosome\tPosition(bp)\tRate(cM/Mb)\tMap(cM)\nchr17\t100\t1.0\t0.0\n";
        assert!(RecombinationMap::from_reader(text.as_bytes(), 500, 600).is_err());
    }

    #[test]
    fn test_add_position() {
        let mut map = load_window();
        // existing
        assert_eq!(map.add_position(52467).unwrap(), 2.573723);
        assert_eq!(map.len(), 5);

        // clamped on both ends
        assert_eq!(map.add_position(10).unwrap(), 3.748065);
        assert_eq!(map.add_position(60000).unwrap(), 2.487219);

        // interpolated
        let expected = 2.578174 + (2.573723 - 2.578174) / 1379.0 * 912.0;
        assert_close(map.add_position(52000).unwrap(), expected);
        assert_close(map.rate_at(52000).unwrap(), expected);
        assert_eq!(map.len(), 8);

        let mut empty = RecombinationMap::default();
        assert!(empty.add_position(5).is_err());
    }

    #[test]
    fn test_mean_rate() {
        let mut map = load_window();
        let expected = (544.0 * 0.5 * (2.532886 + 2.573723) + 2.532886) / 545.0;
        assert_close(map.mean_rate(52467, 53011).unwrap(), expected);
        assert_close(map.mean_rate(53011, 52467).unwrap(), expected);

        // a single point
        assert_close(map.mean_rate(52467, 52467).unwrap(), 0.0);
    }

    #[test]
    fn test_rate_estimate() {
        let mut map = load_window();
        let estimate = RateEstimate::from_map(&mut map, 52467, 53011).unwrap();
        assert_eq!(estimate.distance_bp, 545);
        assert_close(estimate.distance_mb, 545.0 * 0.000001);
        assert_close(estimate.centimorgans, estimate.rate * estimate.distance_mb);
        assert_close(estimate.morgans, estimate.centimorgans / 100.0);
        assert_close(estimate.theta, kosambi_theta(estimate.morgans));
        assert!(estimate.to_string().starts_with("distance (b) : 545\n"));
        assert_eq!(estimate.to_string().lines().count(), 6);
    }
}
