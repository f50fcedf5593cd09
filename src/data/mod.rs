//! Observation data handling
//!
//! A [`Profile`] is a validated, analysis-ready concentration-time dataset:
//! rows are sorted by time, rows with duplicate times are dropped (first
//! occurrence wins), and the Cmax/Tlast indices are cached. Every analysis
//! entry point in this crate consumes a `Profile`.
//!
//! Data can be built from in-memory columns ([`Profile::new`]) or read from
//! CSV with the two named columns `time` and `conc` ([`Profile::from_csv`]).

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while building or reading observation data
#[derive(Error, Debug, Clone)]
pub enum DataError {
    /// The `time` and `conc` columns have different lengths
    #[error("column length mismatch: {times} times, {concentrations} concentrations")]
    LengthMismatch { times: usize, concentrations: usize },

    /// No rows at all
    #[error("observation set is empty")]
    Empty,

    /// A time value is negative
    #[error("negative time {value} at row {index}")]
    NegativeTime { index: usize, value: f64 },

    /// A concentration value is negative
    #[error("negative concentration {value} at row {index}")]
    NegativeConcentration { index: usize, value: f64 },

    /// A value is NaN or infinite
    #[error("non-finite {column} at row {index}")]
    NonFinite { column: &'static str, index: usize },

    /// Error encountered when reading CSV data
    #[error("CSV error: {0}")]
    Csv(String),
}

/// One CSV row: the `time`/`conc` column contract
#[derive(Debug, Clone, Deserialize)]
struct Record {
    time: f64,
    conc: f64,
}

/// A validated concentration-time profile
///
/// Invariants held after construction:
/// - at least one row
/// - all values finite and non-negative
/// - times strictly increasing (duplicates removed, first occurrence wins)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    times: Vec<f64>,
    concentrations: Vec<f64>,
    cmax_idx: usize,
    tlast_idx: usize,
}

impl Profile {
    /// Create a profile from time/concentration columns
    ///
    /// Rows are sorted by time; rows sharing a time value with an earlier row
    /// are dropped.
    pub fn new(times: Vec<f64>, concentrations: Vec<f64>) -> Result<Self, DataError> {
        if times.len() != concentrations.len() {
            return Err(DataError::LengthMismatch {
                times: times.len(),
                concentrations: concentrations.len(),
            });
        }
        if times.is_empty() {
            return Err(DataError::Empty);
        }

        for (i, &t) in times.iter().enumerate() {
            if !t.is_finite() {
                return Err(DataError::NonFinite {
                    column: "time",
                    index: i,
                });
            }
            if t < 0.0 {
                return Err(DataError::NegativeTime { index: i, value: t });
            }
        }
        for (i, &c) in concentrations.iter().enumerate() {
            if !c.is_finite() {
                return Err(DataError::NonFinite {
                    column: "conc",
                    index: i,
                });
            }
            if c < 0.0 {
                return Err(DataError::NegativeConcentration { index: i, value: c });
            }
        }

        let mut rows: Vec<(f64, f64)> = times.into_iter().zip(concentrations).collect();
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        rows.dedup_by(|next, prev| next.0 == prev.0);

        let (times, concentrations): (Vec<f64>, Vec<f64>) = rows.into_iter().unzip();

        // Cmax index: first occurrence of the maximum
        let cmax_idx = concentrations
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(max_i, max_c), (i, &c)| {
                if c > max_c {
                    (i, c)
                } else {
                    (max_i, max_c)
                }
            })
            .0;

        // Tlast index: last positive concentration
        let tlast_idx = concentrations
            .iter()
            .rposition(|&c| c > 0.0)
            .unwrap_or(concentrations.len() - 1);

        Ok(Self {
            times,
            concentrations,
            cmax_idx,
            tlast_idx,
        })
    }

    /// Read a profile from a CSV source with `time` and `conc` columns
    pub fn from_csv<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut times = Vec::new();
        let mut concentrations = Vec::new();
        for record in csv_reader.deserialize() {
            let record: Record = record.map_err(|e| DataError::Csv(e.to_string()))?;
            times.push(record.time);
            concentrations.push(record.conc);
        }

        Self::new(times, concentrations)
    }

    /// Read a profile from a CSV file with `time` and `conc` columns
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let file = std::fs::File::open(path).map_err(|e| DataError::Csv(e.to_string()))?;
        Self::from_csv(file)
    }

    /// Time points, sorted ascending and strictly increasing
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Concentration values, parallel to [`Profile::times`]
    pub fn concentrations(&self) -> &[f64] {
        &self.concentrations
    }

    /// Number of rows after deduplication
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Maximum observed concentration
    pub fn cmax(&self) -> f64 {
        self.concentrations[self.cmax_idx]
    }

    /// Time of the maximum observed concentration
    pub fn tmax(&self) -> f64 {
        self.times[self.cmax_idx]
    }

    /// Last positive concentration
    pub fn clast(&self) -> f64 {
        self.concentrations[self.tlast_idx]
    }

    /// Time of the last positive concentration
    pub fn tlast(&self) -> f64 {
        self.times[self.tlast_idx]
    }

    pub(crate) fn cmax_idx(&self) -> usize {
        self.cmax_idx
    }

    pub(crate) fn tlast_idx(&self) -> usize {
        self.tlast_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_basic() {
        let profile = Profile::new(
            vec![0.0, 1.0, 2.0, 4.0, 8.0],
            vec![0.0, 10.0, 8.0, 4.0, 2.0],
        )
        .unwrap();

        assert_eq!(profile.len(), 5);
        assert_eq!(profile.cmax(), 10.0);
        assert_eq!(profile.tmax(), 1.0);
        assert_eq!(profile.clast(), 2.0);
        assert_eq!(profile.tlast(), 8.0);
    }

    #[test]
    fn test_profile_sorts_and_dedups() {
        let profile = Profile::new(
            vec![4.0, 0.0, 2.0, 2.0, 1.0],
            vec![4.0, 0.0, 8.0, 99.0, 10.0],
        )
        .unwrap();

        assert_eq!(profile.times(), &[0.0, 1.0, 2.0, 4.0]);
        // first occurrence at t = 2 wins
        assert_eq!(profile.concentrations(), &[0.0, 10.0, 8.0, 4.0]);
    }

    #[test]
    fn test_profile_rejects_bad_input() {
        assert!(matches!(
            Profile::new(vec![0.0], vec![1.0, 2.0]),
            Err(DataError::LengthMismatch { .. })
        ));
        assert!(matches!(
            Profile::new(vec![], vec![]),
            Err(DataError::Empty)
        ));
        assert!(matches!(
            Profile::new(vec![-1.0], vec![1.0]),
            Err(DataError::NegativeTime { .. })
        ));
        assert!(matches!(
            Profile::new(vec![1.0], vec![f64::NAN]),
            Err(DataError::NonFinite { .. })
        ));
        assert!(matches!(
            Profile::new(vec![1.0], vec![-0.5]),
            Err(DataError::NegativeConcentration { .. })
        ));
    }

    #[test]
    fn test_profile_from_csv() {
        let csv = "time,conc\n0.0,0.0\n1.0,10.0\n2.0,8.0\n4.0,4.0\n";
        let profile = Profile::from_csv(csv.as_bytes()).unwrap();

        assert_eq!(profile.len(), 4);
        assert_eq!(profile.cmax(), 10.0);
        assert_eq!(profile.tlast(), 4.0);
    }

    #[test]
    fn test_profile_from_csv_rejects_garbage() {
        let csv = "time,conc\n0.0,abc\n";
        assert!(matches!(
            Profile::from_csv(csv.as_bytes()),
            Err(DataError::Csv(_))
        ));
    }
}
