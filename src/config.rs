// src/config.rs

//! Configuration file parsing
//!
//! `reqpin.toml` is optional. Every field has a default, and command-line
//! flags override whatever the file sets:
//!
//! ```toml
//! cache_dir = "/var/cache/reqpin"
//! index = "index.json"
//! max_rounds = 20
//!
//! [install]
//! index_url = "https://mirror.example/simple"
//!
//! [environment]
//! python_version = "3.11"
//! sys_platform = "linux"
//! ```

use crate::error::{Error, Result};
use crate::repository::InstallOptions;
use crate::resolver::DEFAULT_MAX_ROUNDS;
use pep508_rs::{MarkerEnvironment, MarkerEnvironmentBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "reqpin.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dependency cache directory
    pub cache_dir: PathBuf,
    /// JSON index document used as the package repository
    pub index: Option<PathBuf>,
    pub max_rounds: usize,
    pub prereleases: bool,
    pub allow_unsafe: bool,
    /// Keep hashes of reused pins instead of asking the repository again
    pub reuse_hashes: bool,
    pub install: InstallOptions,
    /// Target environment for evaluating markers during sync
    pub environment: Option<EnvironmentConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            index: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            prereleases: false,
            allow_unsafe: false,
            reuse_hashes: true,
            install: InstallOptions::default(),
            environment: None,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("reqpin")
}

impl Config {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else `reqpin.toml` in `dir` if it exists, else defaults
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(Error::Config("max_rounds must be at least 1".to_string()));
        }
        if let Some(environment) = &self.environment {
            environment.marker_environment()?;
        }
        Ok(())
    }

    pub fn marker_environment(&self) -> Result<Option<MarkerEnvironment>> {
        self.environment
            .as_ref()
            .map(EnvironmentConfig::marker_environment)
            .transpose()
    }
}

/// Values of the PEP 508 environment markers for a target interpreter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub python_version: String,
    /// Defaults to `python_version` with a `.0` patch level
    pub python_full_version: Option<String>,
    pub implementation_name: String,
    pub implementation_version: Option<String>,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub sys_platform: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            python_version: "3.12".to_string(),
            python_full_version: None,
            implementation_name: "cpython".to_string(),
            implementation_version: None,
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: String::new(),
            platform_system: "Linux".to_string(),
            platform_version: String::new(),
            sys_platform: "linux".to_string(),
        }
    }
}

impl EnvironmentConfig {
    pub fn marker_environment(&self) -> Result<MarkerEnvironment> {
        let full_version = self
            .python_full_version
            .clone()
            .unwrap_or_else(|| format!("{}.0", self.python_version));
        let implementation_version = self
            .implementation_version
            .clone()
            .unwrap_or_else(|| full_version.clone());

        MarkerEnvironment::try_from(MarkerEnvironmentBuilder {
            implementation_name: &self.implementation_name,
            implementation_version: &implementation_version,
            os_name: &self.os_name,
            platform_machine: &self.platform_machine,
            platform_python_implementation: &self.platform_python_implementation,
            platform_release: &self.platform_release,
            platform_system: &self.platform_system,
            platform_version: &self.platform_version,
            python_full_version: &full_version,
            python_version: &self.python_version,
            sys_platform: &self.sys_platform,
        })
        .map_err(|e| Error::Config(format!("Invalid [environment]: {}", e)))
    }
}
