//! The versioned configuration object handed to the driver and the tools.
//!
//! ```toml
//! version = 1
//! output_root = "/mnt/local_homes/bench"
//! bin_dir = "../scal"
//! timeout_secs = 600
//!
//! [executables]
//! scal4rr = "dq-partrr -partitions 4"
//!
//! [tunables]
//! scal4rr = "p"
//!
//! [profiles.big]
//! threads = [1, 32, 64]
//! max_partitions = 64
//! ```
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, IoContext, Result};
use crate::registry::{MachineProfile, Registry};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    threads: Vec<u32>,
    max_partitions: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    version: u32,
    output_root: Option<PathBuf>,
    bin_dir: Option<String>,
    timeout_secs: Option<u64>,
    analyzer: Option<String>,
    #[serde(default)]
    executables: BTreeMap<String, String>,
    #[serde(default)]
    tunables: BTreeMap<String, String>,
    #[serde(default)]
    profiles: BTreeMap<String, RawProfile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub registry: Registry,
    /// Relative output directories are placed under this.
    pub output_root: Option<PathBuf>,
    /// Where the benchmark binaries live.
    pub bin_dir: String,
    pub timeout: Option<Duration>,
    /// The fairness analyzer binary.
    pub analyzer: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            registry: Registry::builtin().clone(),
            output_root: None,
            bin_dir: "..".to_string(),
            timeout: None,
            analyzer: "../cpp/analyzer/analyzer".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path).at(path)?;
        Config::from_toml(&text).map_err(|e| match e {
            Error::Toml { source, .. } => Error::Toml {
                path: path.to_path_buf(),
                source,
            },
            e => e,
        })
    }

    /// Parse a config file body, layering it over the built-in tables.
    pub fn from_toml(text: &str) -> Result<Config> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| Error::Toml {
            path: PathBuf::new(),
            source,
        })?;
        if raw.version != CONFIG_VERSION {
            return Err(Error::UnsupportedVersion(raw.version, CONFIG_VERSION));
        }

        let mut config = Config::default();
        for (name, spec) in &raw.executables {
            config.registry.set_executable(name, spec);
        }
        for (name, flag) in &raw.tunables {
            config.registry.set_tunable(name, flag);
        }
        for (name, p) in raw.profiles {
            config.registry.set_profile(
                &name,
                MachineProfile {
                    threads: p.threads,
                    max_partitions: p.max_partitions,
                },
            );
        }
        config.output_root = raw.output_root;
        if let Some(bin_dir) = raw.bin_dir {
            config.bin_dir = bin_dir;
        }
        config.timeout = raw.timeout_secs.map(Duration::from_secs);
        if let Some(analyzer) = raw.analyzer {
            config.analyzer = analyzer;
        }
        Ok(config)
    }

    /// Absolute paths are kept; relative ones go under `output_root`.
    pub fn resolve_output(&self, dir: &Path) -> PathBuf {
        match self.output_root {
            Some(ref root) if dir.is_relative() => root.join(dir),
            _ => dir.to_path_buf(),
        }
    }
}
