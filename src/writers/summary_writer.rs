use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::generation_search::EstimateResult;

/// Writes one row per estimate, typically a single row for a single input
pub struct SummaryWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>
}

/// Contains all the data written to each row of the summary file
#[derive(Serialize)]
struct SummaryRow {
    /// the model file the estimate came from
    input: String,
    /// generation count with the maximum likelihood
    max_generation: u32,
    /// last generation evaluated
    end_generation: u32,
    /// lower credible bound, 0 if unset
    lower_bound: u32,
    /// upper credible bound, 0 if unset
    upper_bound: u32,
    /// natural log of the maximum likelihood
    log_likelihood: f64
}

impl SummaryWriter {
    /// Creates a new writer for a given filename
    /// # Arguments
    /// * `filename` - the path to write the summary to, ".csv" selects comma delimiters, anything else is tab-delimited
    pub fn new(filename: &Path) -> csv::Result<SummaryWriter> {
        // modify the delimiter to "," if it ends with .csv
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(SummaryWriter {
            csv_writer
        })
    }

    /// Writes the estimate for one input file
    /// # Arguments
    /// * `input` - the model file that was analyzed
    /// * `result` - the completed search
    pub fn write_result(&mut self, input: &Path, result: &EstimateResult) -> csv::Result<()> {
        let row: SummaryRow = SummaryRow {
            input: input.display().to_string(),
            max_generation: result.max_generation(),
            end_generation: result.end_generation(),
            lower_bound: result.lower_bound().unwrap_or(0),
            upper_bound: result.upper_bound().unwrap_or(0),
            log_likelihood: result.log_likelihood()
        };
        self.csv_writer.serialize(&row)?;
        self.csv_writer.flush()?;
        Ok(())
    }
}
