use crate::data_types::side::Side;

use flate2::bufread::MultiGzDecoder;
use log::{debug, info, warn};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use strum::IntoEnumIterator;

/// Sentinel for an allele that was not observed (or is not informative)
pub const MISSING_ALLELE: i32 = -1;

/// How the probability of a mutation depends on the observed alleles
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum_macros::Display)]
pub enum MutationModel {
    /// Any mutation is equally likely regardless of the allele distance
    #[strum(serialize = "uniform")]
    Uniform=0,
    /// Mutation probability decays with the repeat-count distance between alleles (microsatellites)
    #[strum(serialize = "stepwise")]
    Stepwise
}

/// The allele representation detected while parsing a model
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum_macros::Display)]
pub enum AlleleEncoding {
    /// Only missing alleles were encountered so far
    Undetermined,
    /// Alleles are repeat counts
    Microsatellite,
    /// Alleles are sequences (SNV, indel), stored as a hash of the observed text
    SequenceVariant
}

#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("error while reading model input: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: input ended early, expected {expected}")]
    MissingLine { line: usize, expected: &'static str },
    #[error("line {line}: expected at least {expected} fields, found {found}")]
    FieldCount { line: usize, expected: usize, found: usize },
    #[error("line {line}, field {field}: could not parse {value:?} as {expected}")]
    InvalidValue { line: usize, field: usize, value: String, expected: &'static str },
    #[error("line {line}: found {found} values but only {capacity} marker positions are available")]
    TooManyValues { line: usize, found: usize, capacity: usize },
    #[error("line {line}, field {field}: allele {value:?} mixes microsatellite and sequence variant encodings")]
    MixedAlleleEncoding { line: usize, field: usize, value: String },
    #[error("line {line}, field {field}: the stepwise mutation model cannot be used with non-microsatellite allele {value:?}")]
    StepwiseRequiresMicrosatellite { line: usize, field: usize, value: String }
}

/// One row of the end marker diagnostic table, end markers are 1-based and already clamped
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EndMarkerRecord {
    pub individual: usize,
    pub left: i32,
    pub right: i32
}

impl fmt::Display for EndMarkerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.individual, self.left, self.right)
    }
}

/// Wraps a buffered reader so every error can report the line it came from.
struct LineReader<R: BufRead> {
    reader: R,
    line_number: usize
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R) -> LineReader<R> {
        LineReader {
            reader,
            line_number: 0
        }
    }

    /// Reads the next line and splits it on single whitespace characters.
    /// Consecutive separators produce empty fields (a missing allele), trailing ones are dropped.
    /// # Arguments
    /// * `expected` - description of the record, used if the input ends early
    fn next_fields(&mut self, expected: &'static str) -> Result<Vec<String>, FormatError> {
        let mut buffer = String::new();
        self.line_number += 1;
        if self.reader.read_line(&mut buffer)? == 0 {
            return Err(FormatError::MissingLine { line: self.line_number, expected });
        }
        Ok(buffer.trim_end().split(char::is_whitespace).map(String::from).collect())
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, line: usize, field: usize, expected: &'static str) -> Result<T, FormatError> {
    value.parse::<T>().map_err(|_| FormatError::InvalidValue {
        line,
        field,
        value: value.to_string(),
        expected
    })
}

fn require_fields(fields: &[String], line: usize, expected: usize) -> Result<(), FormatError> {
    if fields.len() < expected {
        Err(FormatError::FieldCount { line, expected, found: fields.len() })
    } else {
        Ok(())
    }
}

/// Parses a line of floating point values into `target`, starting at position `offset`.
/// Empty fields are skipped, so an empty line means "no values".
fn fill_values(fields: &[String], line: usize, target: &mut [f64], offset: usize) -> Result<(), FormatError> {
    let values: Vec<(usize, &String)> = fields.iter()
        .enumerate()
        .filter(|(_i, v)| !v.is_empty())
        .collect();
    if offset + values.len() > target.len() {
        return Err(FormatError::TooManyValues { line, found: values.len(), capacity: target.len().saturating_sub(offset) });
    }
    for (c, (field_index, value)) in values.into_iter().enumerate() {
        target[offset + c] = parse_field(value, line, field_index + 1, "a floating point value")?;
    }
    Ok(())
}

/// 32-bit polynomial string hash over UTF-16 code units (`h = 31*h + c`, wrapping).
/// Sequence alleles are only ever compared for equality or distance to the missing sentinel, so any stable
/// hash would work; this one keeps results identical to historical runs of the method.
pub fn allele_hash(token: &str) -> i32 {
    token.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Converts allele tokens into integers and enforces a consistent encoding across the whole input.
struct AlleleDecoder {
    mutation_model: MutationModel,
    encoding: AlleleEncoding
}

impl AlleleDecoder {
    fn decode(&mut self, token: &str, line: usize, field: usize) -> Result<i32, FormatError> {
        if token.is_empty() || token == "-1" {
            return Ok(MISSING_ALLELE);
        }

        match token.parse::<i32>() {
            Ok(repeat_count) => {
                if self.encoding == AlleleEncoding::SequenceVariant {
                    return Err(FormatError::MixedAlleleEncoding { line, field, value: token.to_string() });
                }
                self.encoding = AlleleEncoding::Microsatellite;
                Ok(repeat_count)
            },
            Err(_) => {
                if self.mutation_model == MutationModel::Stepwise {
                    return Err(FormatError::StepwiseRequiresMicrosatellite { line, field, value: token.to_string() });
                }
                if self.encoding == AlleleEncoding::Microsatellite {
                    return Err(FormatError::MixedAlleleEncoding { line, field, value: token.to_string() });
                }
                self.encoding = AlleleEncoding::SequenceVariant;
                Ok(allele_hash(token))
            }
        }
    }
}

/// The model exactly as read from the input, before the longest shared segment is determined.
/// All per-marker vectors are indexed by 1-based marker position, index 0 is unused.
#[derive(Clone, Debug, PartialEq)]
pub struct RawModel {
    /// Number of haplotypes in the sample
    individual_count: usize,
    /// Number of positions on each side, including the mutation and one padding position
    marker_counts: [i32; 2],
    /// Recombination fraction between the mutation and each marker
    fractions: [Vec<f64>; 2],
    /// Frequency of the shared allele at each marker
    frequencies: [Vec<f64>; 2],
    /// Presumed ancestral haplotype, starting from the mutation
    ancestral_alleles: [Vec<i32>; 2],
    /// First marker with a non-ancestral allele for each individual, 1-based
    end_markers: [Vec<i32>; 2],
    /// Allele observed at the end marker for each individual
    end_alleles: [Vec<i32>; 2],
    /// Confidence in each haplotype reconstruction
    post_probabilities: Vec<f64>,
    mutation_rate: f64,
    mutation_model: MutationModel,
    allele_encoding: AlleleEncoding
}

impl RawModel {
    /// Parses the whitespace delimited model format.
    /// # Arguments
    /// * `reader` - the source of the model text
    /// # Errors
    /// * `FormatError` if any line is missing, short, non-numeric, or mixes allele encodings
    pub fn from_reader<R: BufRead>(reader: R) -> Result<RawModel, FormatError> {
        let mut lines = LineReader::new(reader);

        // header: individuals, left markers, right markers
        let fields = lines.next_fields("the header line")?;
        let line = lines.line_number;
        require_fields(&fields, line, 3)?;
        let individual_count: usize = parse_field(&fields[0], line, 1, "an individual count")?;
        let mut marker_counts: [i32; 2] = [0; 2];
        for side in Side::iter() {
            let raw_count: u16 = parse_field(&fields[side.index() + 1], line, side.index() + 2, "a marker count")?;
            // one position for the mutation itself and one for padding
            marker_counts[side.index()] = i32::from(raw_count) + 2;
        }

        // both sides share the same storage width
        let max_markers: usize = marker_counts.iter().copied().max().unwrap_or(2) as usize;
        let mut fractions: [Vec<f64>; 2] = [vec![0.0; max_markers + 1], vec![0.0; max_markers + 1]];
        let mut frequencies: [Vec<f64>; 2] = [vec![0.0; max_markers + 1], vec![0.0; max_markers + 1]];
        for side in Side::iter() {
            // fractions start at position 2, the mutation is position 1 with fraction 0
            let fields = lines.next_fields("a recombination fraction line")?;
            fill_values(&fields, lines.line_number, &mut fractions[side.index()], 2)?;

            // frequencies start at position 3
            let fields = lines.next_fields("an allele frequency line")?;
            fill_values(&fields, lines.line_number, &mut frequencies[side.index()], 3)?;
        }

        let fields = lines.next_fields("the mutation line")?;
        let line = lines.line_number;
        require_fields(&fields, line, 2)?;
        let mutation_rate: f64 = parse_field(&fields[0], line, 1, "a mutation rate")?;
        let mutation_model: MutationModel = match fields[1].as_str() {
            "0" => MutationModel::Uniform,
            "1" => MutationModel::Stepwise,
            other => return Err(FormatError::InvalidValue {
                line,
                field: 2,
                value: other.to_string(),
                expected: "a mutation model flag (0 or 1)"
            })
        };

        let mut decoder = AlleleDecoder {
            mutation_model,
            encoding: AlleleEncoding::Undetermined
        };

        // ancestral alleles start at position 1
        let mut ancestral_alleles: [Vec<i32>; 2] = [vec![0; max_markers + 1], vec![0; max_markers + 1]];
        for side in Side::iter() {
            let fields = lines.next_fields("an ancestral allele line")?;
            let line = lines.line_number;
            let target = &mut ancestral_alleles[side.index()];
            if fields.len() + 1 > target.len() {
                return Err(FormatError::TooManyValues { line, found: fields.len(), capacity: target.len() - 1 });
            }
            for (c, token) in fields.iter().enumerate() {
                target[c + 1] = decoder.decode(token, line, c + 1)?;
            }
        }

        // the header count is not trusted for allocation, a short file fails on the first missing line
        let mut end_markers: [Vec<i32>; 2] = [Vec::new(), Vec::new()];
        let mut end_alleles: [Vec<i32>; 2] = [Vec::new(), Vec::new()];
        let mut post_probabilities: Vec<f64> = Vec::new();
        for _i in 0..individual_count {
            let fields = lines.next_fields("an individual line")?;
            let line = lines.line_number;
            require_fields(&fields, line, 4)?;
            for side in Side::iter() {
                // stored 0-based in the file
                let end_marker: i32 = parse_field(&fields[side.index()], line, side.index() + 1, "an end marker")?;
                end_markers[side.index()].push(end_marker.saturating_add(1));
            }
            for side in Side::iter() {
                let end_allele: i32 = decoder.decode(&fields[side.index() + 2], line, side.index() + 3)?;
                end_alleles[side.index()].push(end_allele);
            }

            let post_probability: f64 = match fields.get(4) {
                Some(value) if !value.is_empty() => parse_field(value, line, 5, "a posterior probability")?,
                _ => 1.0
            };
            if !(0.0..=1.0).contains(&post_probability) {
                warn!("Line {}: posterior probability {} is outside [0, 1]", line, post_probability);
            }
            post_probabilities.push(post_probability);
        }

        Ok(RawModel {
            individual_count,
            marker_counts,
            fractions,
            frequencies,
            ancestral_alleles,
            end_markers,
            end_alleles,
            post_probabilities,
            mutation_rate,
            mutation_model,
            allele_encoding: decoder.encoding
        })
    }

    pub fn individual_count(&self) -> usize {
        self.individual_count
    }

    /// Number of allocated positions on a side before trimming
    pub fn marker_count(&self, side: Side) -> i32 {
        self.marker_counts[side.index()]
    }

    pub fn allele_encoding(&self) -> AlleleEncoding {
        self.allele_encoding
    }

    /// Determines the longest shared segment on each side and produces the final model.
    pub fn trim(self) -> Model {
        let RawModel {
            individual_count,
            marker_counts,
            fractions,
            frequencies,
            ancestral_alleles,
            end_markers,
            end_alleles,
            post_probabilities,
            mutation_rate,
            mutation_model,
            allele_encoding
        } = self;

        let [left_fractions, right_fractions] = fractions;
        let [left_frequencies, right_frequencies] = frequencies;
        let [left_ancestral, right_ancestral] = ancestral_alleles;
        let [left_end_markers, right_end_markers] = end_markers;
        let [left_end_alleles, right_end_alleles] = end_alleles;

        let left = SideModel::new(
            Side::Left, marker_counts[Side::Left.index()],
            left_fractions, left_frequencies, left_ancestral,
            &left_end_markers, left_end_alleles
        );
        let right = SideModel::new(
            Side::Right, marker_counts[Side::Right.index()],
            right_fractions, right_frequencies, right_ancestral,
            &right_end_markers, right_end_alleles
        );

        Model {
            individual_count,
            mutation_rate,
            mutation_model,
            allele_encoding,
            post_probabilities,
            sides: [left, right]
        }
    }
}

/// Finds the longest segment shared by more than one individual.
/// Returns the trimmed marker count, the number of individuals sharing it, and the end markers clamped to it.
/// # Arguments
/// * `marker_count` - the number of positions on this side
/// * `end_markers` - the 1-based end marker of every individual
pub fn trim_longest_shared_segment(marker_count: i32, end_markers: &[i32]) -> (i32, usize, Vec<i32>) {
    let capacity: usize = marker_count.max(0) as usize;

    // counts[j] = number of individuals sharing the ancestral haplotype through position j
    let mut counts: Vec<usize> = vec![0; capacity + 1];
    for &end_marker in end_markers.iter() {
        let covered: usize = end_marker.clamp(0, capacity as i32) as usize;
        for count in counts[1..=covered].iter_mut() {
            *count += 1;
        }
    }

    let trimmed: usize = (1..=capacity).rev()
        .find(|&j| counts[j] > 1)
        .unwrap_or(0);
    let longest_count: usize = counts[trimmed];
    let clamped: Vec<i32> = end_markers.iter()
        .map(|&end_marker| end_marker.min(trimmed as i32))
        .collect();
    (trimmed as i32, longest_count, clamped)
}

/// Immutable per-side parameters after the longest shared segment trim.
#[derive(Clone, Debug, PartialEq)]
pub struct SideModel {
    side: Side,
    /// Largest marker index shared by more than one individual
    marker_count: i32,
    /// Number of individuals whose end marker equals `marker_count` (group 1)
    longest_count: usize,
    /// False as soon as one individual lacks data on this side
    has_data: bool,
    fractions: Vec<f64>,
    frequencies: Vec<f64>,
    ancestral_alleles: Vec<i32>,
    end_markers: Vec<i32>,
    end_alleles: Vec<i32>
}

impl SideModel {
    fn new(
        side: Side, raw_marker_count: i32,
        fractions: Vec<f64>, frequencies: Vec<f64>, ancestral_alleles: Vec<i32>,
        raw_end_markers: &[i32], end_alleles: Vec<i32>
    ) -> SideModel {
        let has_data: bool = raw_end_markers.iter().all(|&end_marker| end_marker > 0);
        let (marker_count, longest_count, end_markers) = trim_longest_shared_segment(raw_marker_count, raw_end_markers);
        debug!(
            "{} side: {} -> {} markers, {} individuals share the longest segment{}",
            side, raw_marker_count, marker_count, longest_count,
            if has_data { "" } else { " (side has missing data and is ignored)" }
        );
        SideModel {
            side,
            marker_count,
            longest_count,
            has_data,
            fractions,
            frequencies,
            ancestral_alleles,
            end_markers,
            end_alleles
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn marker_count(&self) -> i32 {
        self.marker_count
    }

    pub fn longest_count(&self) -> usize {
        self.longest_count
    }

    pub fn has_data(&self) -> bool {
        self.has_data
    }

    /// Recombination fractions indexed by 1-based marker position
    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    /// Frequency of the shared allele at a 1-based position, 0.0 outside the allocated positions
    pub fn frequency(&self, rank: i32) -> f64 {
        usize::try_from(rank).ok()
            .and_then(|r| self.frequencies.get(r))
            .copied()
            .unwrap_or(0.0)
    }

    /// Ancestral allele at a 1-based position, missing outside the allocated positions
    pub fn ancestral_allele(&self, rank: i32) -> i32 {
        usize::try_from(rank).ok()
            .and_then(|r| self.ancestral_alleles.get(r))
            .copied()
            .unwrap_or(MISSING_ALLELE)
    }

    pub fn end_marker(&self, individual: usize) -> i32 {
        self.end_markers[individual]
    }

    pub fn end_allele(&self, individual: usize) -> i32 {
        self.end_alleles[individual]
    }

    /// True if the individual shares the ancestral haplotype through the last trimmed marker
    pub fn is_longest(&self, individual: usize) -> bool {
        self.end_markers[individual] == self.marker_count
    }
}

/// The complete, immutable input to the likelihood search.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    individual_count: usize,
    /// Per-generation mutation probability
    mutation_rate: f64,
    mutation_model: MutationModel,
    allele_encoding: AlleleEncoding,
    /// Exponent weight of each individual, 1.0 for unambiguous haplotypes
    post_probabilities: Vec<f64>,
    sides: [SideModel; 2]
}

impl Model {
    /// Loads and trims a model from a file, gzip is allowed
    /// # Arguments
    /// * `filename` - the model file
    /// # Errors
    /// * `FormatError::Io` if the file cannot be opened or read
    /// * any other `FormatError` if the content is malformed
    pub fn from_path(filename: &Path) -> Result<Model, FormatError> {
        info!("Loading {:?}...", filename);
        let file: File = File::open(filename)?;
        let file_reader = BufReader::new(file);
        let model: Model = if filename.extension().unwrap_or_default() == "gz" {
            debug!("Detected gzip extension, loading model with MultiGzDecoder...");
            let gz_decoder = MultiGzDecoder::new(file_reader);
            Model::from_reader(BufReader::new(gz_decoder))?
        } else {
            Model::from_reader(file_reader)?
        };
        info!(
            "Finished loading {} individuals ({} alleles, {} mutation model).",
            model.individual_count(), model.allele_encoding(), model.mutation_model()
        );
        Ok(model)
    }

    /// Parses and trims a model from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Model, FormatError> {
        Ok(RawModel::from_reader(reader)?.trim())
    }

    pub fn individual_count(&self) -> usize {
        self.individual_count
    }

    pub fn mutation_rate(&self) -> f64 {
        self.mutation_rate
    }

    pub fn mutation_model(&self) -> MutationModel {
        self.mutation_model
    }

    pub fn allele_encoding(&self) -> AlleleEncoding {
        self.allele_encoding
    }

    pub fn post_probability(&self, individual: usize) -> f64 {
        self.post_probabilities[individual]
    }

    pub fn side(&self, side: Side) -> &SideModel {
        &self.sides[side.index()]
    }

    /// The clamped end markers of every individual on both sides
    pub fn end_marker_table(&self) -> Vec<EndMarkerRecord> {
        let left = self.side(Side::Left);
        let right = self.side(Side::Right);
        (0..self.individual_count)
            .map(|individual| EndMarkerRecord {
                individual,
                left: left.end_marker(individual),
                right: right.end_marker(individual)
            })
            .collect()
    }
}

impl std::str::FromStr for Model {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::from_reader(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SMALL_MODEL: &str = "4 3 2
0.01 0.02 0.03
0.5 0.25 0.125
0.015 0.025
0.4 0.6
0.001 0
1 1 1 -1
1 1 -1
3 2 2 2
3 1 1 1 0.5
1 0 2 2
0 2 1 1
";

    #[test]
    fn test_parse_raw_model() {
        let raw = RawModel::from_reader(SMALL_MODEL.as_bytes()).unwrap();
        assert_eq!(raw.individual_count(), 4);
        assert_eq!(raw.marker_count(Side::Left), 5);
        assert_eq!(raw.marker_count(Side::Right), 4);
        assert_eq!(raw.allele_encoding(), AlleleEncoding::Microsatellite);

        // fractions start at position 2, frequencies at position 3
        assert_eq!(raw.fractions[0], vec![0.0, 0.0, 0.01, 0.02, 0.03, 0.0]);
        assert_eq!(raw.frequencies[0], vec![0.0, 0.0, 0.0, 0.5, 0.25, 0.125]);
        assert_eq!(raw.ancestral_alleles[0], vec![0, 1, 1, 1, MISSING_ALLELE, 0]);

        // end markers are shifted to 1-based
        assert_eq!(raw.end_markers[0], vec![4, 4, 2, 1]);
        assert_eq!(raw.end_markers[1], vec![3, 2, 1, 3]);
        assert_eq!(raw.post_probabilities, vec![1.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_trim_longest_shared_segment() {
        // two individuals reach position 4, one stops at 2, one at 1
        let (marker_count, longest, clamped) = trim_longest_shared_segment(5, &[4, 4, 2, 1]);
        assert_eq!(marker_count, 4);
        assert_eq!(longest, 2);
        assert_eq!(clamped, vec![4, 4, 2, 1]);

        // a single individual past the shared segment is clamped down
        let (marker_count, longest, clamped) = trim_longest_shared_segment(8, &[7, 3, 3, 2]);
        assert_eq!(marker_count, 3);
        assert_eq!(longest, 3);
        assert_eq!(clamped, vec![3, 3, 3, 2]);

        // end markers past the allocated positions still count as reaching the end
        let (marker_count, longest, clamped) = trim_longest_shared_segment(4, &[9, 9, 1]);
        assert_eq!(marker_count, 4);
        assert_eq!(longest, 2);
        assert_eq!(clamped, vec![4, 4, 1]);

        // nothing shared
        let (marker_count, longest, clamped) = trim_longest_shared_segment(4, &[3, 0]);
        assert_eq!(marker_count, 0);
        assert_eq!(longest, 0);
        assert_eq!(clamped, vec![0, 0]);
    }

    #[test]
    fn test_model_trim() {
        let model: Model = SMALL_MODEL.parse().unwrap();
        let left = model.side(Side::Left);
        assert!(left.has_data());
        assert_eq!(left.marker_count(), 4);
        assert_eq!(left.longest_count(), 2);
        assert!(left.is_longest(0));
        assert!(left.is_longest(1));
        assert!(!left.is_longest(2));

        let right = model.side(Side::Right);
        assert!(right.has_data());
        assert_eq!(right.marker_count(), 3);
        assert_eq!(right.longest_count(), 2);
        assert_eq!(right.end_allele(1), 1);

        assert_eq!(model.mutation_model(), MutationModel::Uniform);
        assert_eq!(model.post_probability(1), 0.5);
        assert_eq!(model.end_marker_table(), vec![
            EndMarkerRecord { individual: 0, left: 4, right: 3 },
            EndMarkerRecord { individual: 1, left: 4, right: 2 },
            EndMarkerRecord { individual: 2, left: 2, right: 1 },
            EndMarkerRecord { individual: 3, left: 1, right: 3 }
        ]);
        assert_eq!(model.end_marker_table()[1].to_string(), "1 4 2");
    }

    #[test]
    fn test_single_missing_end_marker_disables_side() {
        // one -1 end marker (0 after the shift) is enough to ignore the whole side
        let text = SMALL_MODEL.replace("0 2 1 1", "-1 2 1 1");
        let model: Model = text.parse().unwrap();
        assert!(!model.side(Side::Left).has_data());
        assert!(model.side(Side::Right).has_data());

        // same when every individual is missing
        let text = SMALL_MODEL
            .replace("3 2 2 2", "-1 2 2 2")
            .replace("3 1 1 1 0.5", "-1 1 1 1 0.5")
            .replace("1 0 2 2", "-1 0 2 2")
            .replace("0 2 1 1", "-1 2 1 1");
        let model: Model = text.parse().unwrap();
        assert!(!model.side(Side::Left).has_data());
        assert!(model.side(Side::Right).has_data());
    }

    #[test]
    fn test_sequence_variant_alleles() {
        let text = "2 1 1
0.01
0.3
0.02
0.4
0.001 0
A G
C
1 1 T -1
1 1 A A
";
        let model: Model = text.parse().unwrap();
        assert_eq!(model.allele_encoding(), AlleleEncoding::SequenceVariant);
        assert_eq!(model.side(Side::Left).ancestral_allele(1), allele_hash("A"));
        assert_eq!(model.side(Side::Left).end_allele(0), allele_hash("T"));
        assert_eq!(model.side(Side::Right).end_allele(0), MISSING_ALLELE);

        // matches the reference hash values
        assert_eq!(allele_hash("A"), 65);
        assert_eq!(allele_hash("AT"), 65 * 31 + 84);
        assert_eq!(allele_hash(""), 0);
    }

    #[test]
    fn test_format_errors() {
        // mixing encodings in either direction
        let microsat_then_sequence = SMALL_MODEL.replace("\n1 1 -1\n", "\n1 A -1\n");
        match microsat_then_sequence.parse::<Model>() {
            Err(FormatError::MixedAlleleEncoding { line, field, value }) => {
                assert_eq!(line, 8);
                assert_eq!(field, 2);
                assert_eq!(value, "A");
            },
            other => panic!("unexpected result: {other:?}")
        };
        let text = "2 1 1\n0.01\n0.3\n0.02\n0.4\n0.001 0\nA G\nC\n1 1 12 -1\n1 1 A A\n";
        assert!(matches!(text.parse::<Model>(), Err(FormatError::MixedAlleleEncoding { line: 9, field: 3, .. })));

        // stepwise requires repeat counts
        let text = "2 1 1\n0.01\n0.3\n0.02\n0.4\n0.001 1\nA G\nC\n1 1 T -1\n1 1 A A\n";
        assert!(matches!(text.parse::<Model>(), Err(FormatError::StepwiseRequiresMicrosatellite { line: 7, field: 1, .. })));

        // non-numeric fraction
        let text = SMALL_MODEL.replace("0.01 0.02 0.03", "0.01 abc 0.03");
        assert!(matches!(text.parse::<Model>(), Err(FormatError::InvalidValue { line: 2, field: 2, .. })));

        // short individual line
        let text = SMALL_MODEL.replace("1 0 2 2", "1 0 2");
        assert!(matches!(text.parse::<Model>(), Err(FormatError::FieldCount { line: 11, expected: 4, found: 3 })));

        // truncated input
        let truncated: String = SMALL_MODEL.lines().take(9).collect::<Vec<&str>>().join("\n");
        assert!(matches!(truncated.parse::<Model>(), Err(FormatError::MissingLine { line: 10, .. })));

        // bad model flag
        let text = SMALL_MODEL.replace("0.001 0", "0.001 2");
        assert!(matches!(text.parse::<Model>(), Err(FormatError::InvalidValue { line: 6, field: 2, .. })));

        // an absurd individual count runs out of lines instead of allocating
        let text = SMALL_MODEL.replacen("4 3 2", "4000000000000 3 2", 1);
        assert!(matches!(text.parse::<Model>(), Err(FormatError::MissingLine { line: 13, .. })));

        // too many fractions for the allocated positions
        let text = SMALL_MODEL.replace("0.01 0.02 0.03", "0.01 0.02 0.03 0.04 0.05");
        assert!(matches!(text.parse::<Model>(), Err(FormatError::TooManyValues { line: 2, .. })));
    }

    #[test]
    fn test_regression_fixture_file() {
        let filename: PathBuf = PathBuf::from("./test_data/f508del.estinput");
        let model = Model::from_path(&filename).unwrap();
        assert_eq!(model.individual_count(), 24);
        assert_eq!(model.side(Side::Left).marker_count(), 17);
        assert_eq!(model.side(Side::Left).longest_count(), 2);
        assert_eq!(model.side(Side::Right).marker_count(), 13);
        assert_eq!(model.side(Side::Right).longest_count(), 2);
        assert!(model.side(Side::Left).has_data());
        assert!(model.side(Side::Right).has_data());
    }
}
