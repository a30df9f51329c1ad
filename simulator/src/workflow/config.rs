use anyhow::Context;
use dedispcore::math::geometry::depth_for_nchan;
use dedispcore::prelude::StageConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::generator::profile::GeneratorConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Tree depth; defaults to the smallest depth holding every input channel.
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_fork_levels")]
    pub fork_levels: u32,
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Directory scanned for JSON datasets in batch mode.
    #[serde(default)]
    pub search_directory: Option<PathBuf>,
    #[serde(default = "default_filename_match_pattern")]
    pub filename_match_pattern: String,
    /// `path: return_code` log of files already handled in batch mode.
    #[serde(default)]
    pub processed_log: Option<PathBuf>,
}

fn default_fork_levels() -> u32 {
    4
}

fn default_filename_match_pattern() -> String {
    "*.json".into()
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        depth: Option<u32>,
        workers: usize,
        fork_levels: u32,
        generator: GeneratorConfig,
    ) -> Self {
        Self {
            depth,
            workers,
            fork_levels,
            generator,
            search_directory: None,
            filename_match_pattern: default_filename_match_pattern(),
            processed_log: None,
        }
    }

    pub fn to_stage_config(&self, raw_nchan: usize) -> anyhow::Result<StageConfig> {
        let depth = match self.depth {
            Some(depth) => depth,
            None => depth_for_nchan(raw_nchan)
                .with_context(|| format!("choosing depth for {} channels", raw_nchan))?
                as u32,
        };
        Ok(StageConfig {
            depth,
            workers: self.workers,
            fork_levels: self.fork_levels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_produces_stage_config() {
        let cfg = WorkflowConfig::from_args(Some(7), 2, 3, GeneratorConfig::default());
        let stage = cfg.to_stage_config(64).unwrap();
        assert_eq!(stage.depth, 7);
        assert_eq!(stage.workers, 2);
    }

    #[test]
    fn missing_depth_fits_channel_count() {
        let cfg = WorkflowConfig::from_args(None, 0, 0, GeneratorConfig::default());
        assert_eq!(cfg.to_stage_config(48).unwrap().depth, 6);
        assert!(cfg.to_stage_config(0).is_err());
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"depth: 5\nworkers: 4\ngenerator:\n  channels: 32\n  dm: 3.5\n")
            .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.depth, Some(5));
        assert_eq!(cfg.fork_levels, 4);
        assert_eq!(cfg.generator.channels, 32);
        assert_eq!(cfg.generator.samples, 1024);
        assert_eq!(cfg.filename_match_pattern, "*.json");
        assert!(cfg.search_directory.is_none());
    }

    #[test]
    fn config_load_reads_batch_fields() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"search_directory: /data/scans\nfilename_match_pattern: \"scan_*.json\"\nprocessed_log: /data/done.log\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.search_directory, Some(PathBuf::from("/data/scans")));
        assert_eq!(cfg.filename_match_pattern, "scan_*.json");
        assert_eq!(cfg.processed_log, Some(PathBuf::from("/data/done.log")));
    }
}
