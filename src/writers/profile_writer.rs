use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::generation_search::{EstimateResult, ProfilePoint};

/// Writes the likelihood of every evaluated generation
pub struct ProfileWriter {
    csv_writer: csv::Writer<File>
}

#[derive(Serialize)]
struct ProfileRow {
    generation: u32,
    likelihood: f64,
    log_likelihood: f64,
    /// fraction of the total likelihood at or below this generation
    cumulative_mass: f64
}

impl From<ProfilePoint> for ProfileRow {
    fn from(point: ProfilePoint) -> Self {
        ProfileRow {
            generation: point.generation,
            likelihood: point.likelihood,
            log_likelihood: point.log_likelihood,
            cumulative_mass: point.cumulative_mass
        }
    }
}

impl ProfileWriter {
    /// Creates a new writer for a given filename, tab-delimited unless it ends with ".csv"
    pub fn new(filename: &Path) -> csv::Result<ProfileWriter> {
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(ProfileWriter {
            csv_writer
        })
    }

    /// Writes generations 1 through the end of the search
    /// # Errors
    /// * if the csv_writer has any errors
    pub fn write_profile(&mut self, result: &EstimateResult) -> csv::Result<()> {
        for point in result.profile() {
            self.csv_writer.serialize(ProfileRow::from(point))?;
        }
        self.csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::model::Model;
    use crate::generation_search::{find_max_likelihood, SearchSettings};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_write_profile() {
        let model = Arc::new(Model::from_path(&PathBuf::from("./test_data/f508del.estinput")).unwrap());
        let result = find_max_likelihood(&model, &SearchSettings::default()).unwrap();

        let filename: PathBuf = std::env::temp_dir().join(format!("estiage_profile_{}.tsv", std::process::id()));
        let mut writer = ProfileWriter::new(&filename).unwrap();
        writer.write_profile(&result).unwrap();

        let content: String = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "generation\tlikelihood\tlog_likelihood\tcumulative_mass");
        // one row per evaluated generation
        assert_eq!(lines.len() - 1, result.end_generation() as usize);
        assert!(lines[1].starts_with("1\t"));
        assert!(lines[lines.len() - 1].starts_with("294\t"));

        let peak: Vec<&str> = lines[149].split('\t').collect();
        assert_eq!(peak[0], "149");
        let log_likelihood: f64 = peak[2].parse().unwrap();
        assert!((log_likelihood - result.log_likelihood()).abs() < 1e-9);
        std::fs::remove_file(&filename).unwrap();
    }
}
