//! Configuration management for cmdexec
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.cmdexec/config.toml

use crate::concurrency::ConcurrencyConfig;
use crate::errors::{ExecError, Result};
use crate::output::{OutputLimits, TruncateStrategy};
use crate::process::{ShellConfig, SupervisorConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub executor: ExecutorConfig,
    pub concurrency: ConcurrencySection,
    pub output: OutputSection,
    pub logging: LoggingConfig,
}

/// Process execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Applied to calls that supply no timeout
    pub default_timeout_sec: Option<u64>,
    /// Grace period for reading pipes after exit or kill
    pub drain_timeout_ms: u64,
    pub shell: String,
    pub shell_flag: String,
    /// Width of the command column in status reports
    pub max_command_width: usize,
}

/// Admission control settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySection {
    /// Operations older than this are finished by the sweeper
    pub stale_after_sec: u64,
    pub sweep_interval_sec: u64,
    /// tool name -> max concurrent operations
    pub limits: BTreeMap<String, usize>,
}

/// Output bounding settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Limits for tools without their own entry
    pub defaults: Option<OutputLimits>,
    pub tools: BTreeMap<String, OutputLimits>,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let shell = ShellConfig::default();
        Self {
            default_timeout_sec: None,
            drain_timeout_ms: 2000,
            shell: shell.program,
            shell_flag: shell.flag,
            max_command_width: crate::process::supervisor::DEFAULT_MAX_COMMAND_WIDTH,
        }
    }
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        Self {
            stale_after_sec: 3600,
            sweep_interval_sec: 300,
            limits: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "cmdexec=info".to_string(),
            json: false,
        }
    }
}

impl ExecutorConfig {
    /// Supervisor settings derived from this section
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            default_timeout: self.default_timeout_sec.map(Duration::from_secs),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            shell: ShellConfig::new(&self.shell, &self.shell_flag),
            max_command_width: self.max_command_width,
        }
    }
}

impl ConcurrencySection {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_sec)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_sec)
    }

    /// Configured limits as controller configs
    pub fn tool_configs(&self) -> impl Iterator<Item = (&str, ConcurrencyConfig)> {
        self.limits
            .iter()
            .map(|(tool, max)| (tool.as_str(), ConcurrencyConfig::new(*max)))
    }
}

impl OutputSection {
    /// Limits for `tool`, falling back to the defaults
    pub fn limits_for(&self, tool: &str) -> Option<&OutputLimits> {
        self.tools.get(tool).or(self.defaults.as_ref())
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(&config_path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ExecError::ConfigError(format!("Failed to read config: {}", e)))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| ExecError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }
        Ok(Config::default())
    }

    /// `~/.cmdexec/config.toml`, if a home directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".cmdexec").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.executor.default_timeout_sec == Some(0) {
            return Err(ExecError::ConfigError(
                "default_timeout_sec must be greater than 0".to_string(),
            ));
        }

        if self.executor.drain_timeout_ms == 0 {
            return Err(ExecError::ConfigError(
                "drain_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.executor.shell.trim().is_empty() {
            return Err(ExecError::ConfigError("shell must not be empty".to_string()));
        }

        if self.concurrency.stale_after_sec == 0 || self.concurrency.sweep_interval_sec == 0 {
            return Err(ExecError::ConfigError(
                "stale_after_sec and sweep_interval_sec must be greater than 0".to_string(),
            ));
        }

        if let Some((tool, _)) = self.concurrency.limits.iter().find(|(_, max)| **max == 0) {
            return Err(ExecError::ConfigError(format!(
                "concurrency limit for '{}' must be at least 1",
                tool
            )));
        }

        let named = self
            .output
            .tools
            .iter()
            .map(|(tool, limits)| (tool.as_str(), limits));
        for (scope, limits) in self.output.defaults.iter().map(|l| ("defaults", l)).chain(named) {
            if let TruncateStrategy::Unknown(name) = &limits.truncate_strategy {
                return Err(ExecError::ConfigError(format!(
                    "Invalid truncate strategy '{}' for {}",
                    name, scope
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ExecError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExecError::ConfigError(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| ExecError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
