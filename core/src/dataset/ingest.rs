use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::Deserialize;

use crate::dataset::Dataset;
use crate::prelude::{DedispError, DedispResult};

/// Source of raw filterbank data. Implementations populate only the raw
/// fields; delay metadata and output are left for `Dataset::prepare`.
pub trait DatasetReader {
    fn read(&self, path: &Path) -> DedispResult<Dataset>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonDataset {
    dt: f64,
    freqs_mhz: Vec<f64>,
    samples: Vec<Vec<f32>>,
}

/// Reads `{ "dt": .., "freqs_mhz": [..], "samples": [[..], ..] }` documents,
/// one `samples` row per frequency.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDatasetReader;

impl DatasetReader for JsonDatasetReader {
    fn read(&self, path: &Path) -> DedispResult<Dataset> {
        let display = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|source| DedispError::Io {
            path: display.clone(),
            source,
        })?;
        let format_error = |reason: String| DedispError::Format {
            path: display.clone(),
            reason,
        };

        let document: JsonDataset =
            serde_json::from_str(&contents).map_err(|err| format_error(err.to_string()))?;
        if document.samples.len() != document.freqs_mhz.len() {
            return Err(format_error(format!(
                "{} sample rows for {} frequencies",
                document.samples.len(),
                document.freqs_mhz.len()
            )));
        }
        let ndata = document.samples.first().map_or(0, Vec::len);
        if ndata == 0 {
            return Err(format_error("no samples".into()));
        }
        if let Some(row) = document.samples.iter().position(|row| row.len() != ndata) {
            return Err(format_error(format!(
                "row {} has {} samples, expected {}",
                row,
                document.samples[row].len(),
                ndata
            )));
        }

        let nrows = document.samples.len();
        let flat: Vec<f32> = document.samples.into_iter().flatten().collect();
        let raw_data = Array2::from_shape_vec((nrows, ndata), flat)
            .map_err(|err| format_error(err.to_string()))?;
        Dataset::new(document.freqs_mhz, raw_data, document.dt)
            .map_err(|err| format_error(err.to_string()))
    }
}
