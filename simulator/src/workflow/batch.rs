use crate::workflow::config::WorkflowConfig;
use crate::workflow::runner::{Runner, WorkflowResult};
use anyhow::{anyhow, Context};
use dedispcore::dataset::{DatasetReader, JsonDatasetReader};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const DEFAULT_LOG_NAME: &str = "processed.log";

/// Result of one dataset in a batch; `return_code` is 0 on success.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub return_code: i32,
    pub result: Option<WorkflowResult>,
}

/// Dedisperses every matching dataset in a directory once, resuming from
/// the `path: return_code` log left by earlier runs.
pub struct BatchRunner {
    runner: Runner,
    search_directory: PathBuf,
    pattern: String,
    processed_log: PathBuf,
}

impl BatchRunner {
    pub fn from_config(config: WorkflowConfig) -> anyhow::Result<Self> {
        let search_directory = config
            .search_directory
            .clone()
            .ok_or_else(|| anyhow!("batch mode needs a search directory"))?;
        let processed_log = config
            .processed_log
            .clone()
            .unwrap_or_else(|| search_directory.join(DEFAULT_LOG_NAME));
        Ok(Self {
            pattern: config.filename_match_pattern.clone(),
            runner: Runner::new(config),
            search_directory,
            processed_log,
        })
    }

    pub fn processed_log(&self) -> &Path {
        &self.processed_log
    }

    /// Matching files not yet listed in the processed log, in name order.
    pub fn pending(&self) -> anyhow::Result<Vec<PathBuf>> {
        let done = read_processed(&self.processed_log)?;
        let mut files: Vec<PathBuf> = self
            .matches()?
            .into_iter()
            .filter(|path| !done.contains(&path.display().to_string()))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Records every current match as handled without dedispersing it, so
    /// later runs only pick up files that arrive afterwards.
    pub fn skip_existing(&self) -> anyhow::Result<usize> {
        let pending = self.pending()?;
        for path in &pending {
            append_line(&self.processed_log, &format!("{}: 0\n", path.display()))?;
        }
        info!("marked {} existing files as processed", pending.len());
        Ok(pending.len())
    }

    pub fn run(&self) -> anyhow::Result<Vec<BatchOutcome>> {
        let pending = self.pending()?;
        info!(
            "{} datasets pending in {}",
            pending.len(),
            self.search_directory.display()
        );

        let mut outcomes = Vec::with_capacity(pending.len());
        for path in pending {
            let outcome = match self.process(&path) {
                Ok(result) => BatchOutcome {
                    path,
                    return_code: 0,
                    result: Some(result),
                },
                Err(err) => {
                    warn!("{} failed: {:#}", path.display(), err);
                    BatchOutcome {
                        path,
                        return_code: 1,
                        result: None,
                    }
                }
            };
            append_line(
                &self.processed_log,
                &format!("{}: {}\n", outcome.path.display(), outcome.return_code),
            )?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn process(&self, path: &Path) -> anyhow::Result<WorkflowResult> {
        let mut dataset = JsonDatasetReader
            .read(path)
            .with_context(|| format!("ingesting {}", path.display()))?;
        self.runner.execute(&mut dataset)
    }

    fn matches(&self) -> anyhow::Result<Vec<PathBuf>> {
        let directory = glob::Pattern::escape(&self.search_directory.to_string_lossy());
        let pattern = format!("{}/{}", directory, self.pattern);
        let mut files = Vec::new();
        for entry in glob::glob(&pattern).with_context(|| format!("bad pattern {}", pattern))? {
            let path = entry.context("scanning search directory")?;
            if path.is_file() && path != self.processed_log {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Paths listed in a processed log; a missing log means nothing is done yet.
fn read_processed(log: &Path) -> anyhow::Result<HashSet<String>> {
    if !log.is_file() {
        return Ok(HashSet::new());
    }
    let contents =
        fs::read_to_string(log).with_context(|| format!("reading {}", log.display()))?;
    let mut done = HashSet::new();
    for line in contents.lines().filter(|line| !line.trim().is_empty()) {
        match line.rsplit_once(':') {
            Some((path, code)) if code.trim().parse::<i32>().is_ok() => {
                done.insert(path.to_string());
            }
            _ => warn!("ignoring malformed log line {:?}", line),
        }
    }
    Ok(done)
}

pub(crate) fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::GeneratorConfig;
    use tempfile::TempDir;

    const DATASET: &str =
        r#"{"dt": 0.001, "freqs_mhz": [900.0, 800.0], "samples": [[0,0,1,0,0,0,0,0],[0,0,0,1,0,0,0,0]]}"#;

    fn batch_config(dir: &Path) -> WorkflowConfig {
        let mut config = WorkflowConfig::from_args(None, 0, 0, GeneratorConfig::default());
        config.search_directory = Some(dir.to_path_buf());
        config
    }

    fn log_lines(batch: &BatchRunner) -> Vec<String> {
        fs::read_to_string(batch.processed_log())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn batch_processes_matches_and_logs_codes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), DATASET).unwrap();
        fs::write(dir.path().join("b.json"), "{not json").unwrap();
        fs::write(dir.path().join("c.json"), DATASET).unwrap();
        fs::write(dir.path().join("notes.txt"), DATASET).unwrap();

        let batch = BatchRunner::from_config(batch_config(dir.path())).unwrap();
        let outcomes = batch.run().unwrap();
        let codes: Vec<i32> = outcomes.iter().map(|o| o.return_code).collect();
        assert_eq!(codes, vec![0, 1, 0]);
        assert_eq!(outcomes[0].result.as_ref().unwrap().report.nchan, 2);
        assert!(outcomes[1].result.is_none());

        let lines = log_lines(&batch);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], format!("{}: 0", dir.path().join("a.json").display()));
        assert_eq!(lines[1], format!("{}: 1", dir.path().join("b.json").display()));
    }

    #[test]
    fn batch_resumes_from_processed_log() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), DATASET).unwrap();
        let batch = BatchRunner::from_config(batch_config(dir.path())).unwrap();
        assert_eq!(batch.run().unwrap().len(), 1);
        assert!(batch.run().unwrap().is_empty());

        fs::write(dir.path().join("d.json"), DATASET).unwrap();
        let outcomes = batch.run().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].path, dir.path().join("d.json"));
        assert_eq!(log_lines(&batch).len(), 2);
    }

    #[test]
    fn skip_existing_defers_to_new_arrivals() {
        let dir = TempDir::new().unwrap();
        let log_dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.json"), DATASET).unwrap();
        let mut config = batch_config(dir.path());
        config.processed_log = Some(log_dir.path().join("logs").join("done.log"));

        let batch = BatchRunner::from_config(config).unwrap();
        assert_eq!(batch.skip_existing().unwrap(), 1);
        fs::write(dir.path().join("new.json"), DATASET).unwrap();
        let outcomes = batch.run().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].path, dir.path().join("new.json"));
    }

    #[test]
    fn malformed_log_lines_are_ignored() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("processed.log");
        fs::write(&log, "/data/a.json: 0\ngarbage\n/data/b.json: 1\n\n").unwrap();
        let done = read_processed(&log).unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains("/data/a.json"));
        assert!(done.contains("/data/b.json"));
    }

    #[test]
    fn batch_requires_search_directory() {
        let config = WorkflowConfig::from_args(None, 0, 0, GeneratorConfig::default());
        assert!(BatchRunner::from_config(config).is_err());
    }
}
