use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::sim::Limits;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulationConfig {
    #[serde(default)]
    pub max_steps: Option<u64>,
    #[serde(default = "default_max_time")]
    pub max_time: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_runs")]
    pub runs: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_time: default_max_time(),
            seed: default_seed(),
            runs: default_runs(),
        }
    }
}

impl SimulationConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: SimulationConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_time: self.max_time,
        }
    }
}

fn default_max_time() -> f64 {
    f64::INFINITY
}

fn default_seed() -> u64 {
    0
}

fn default_runs() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SimulationConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert!(config.max_time.is_infinite());
        assert_eq!(config.runs, 1);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.toml");
        fs::write(&path, "max_steps = 500\nseed = 42\n").unwrap();
        let config = SimulationConfig::load_from_file(&path).unwrap();
        assert_eq!(config.max_steps, Some(500));
        assert_eq!(config.seed, 42);
        assert_eq!(config.runs, 1);
        assert_eq!(config.limits().max_time, f64::INFINITY);
    }

    #[test]
    fn malformed_file_reports_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "max_steps = \"many\"").unwrap();
        let err = SimulationConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
