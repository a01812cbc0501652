//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.mediguard.toml` files.

use crate::cli::OutputFormat;
use crate::gateway::GatewayConfig;
use crate::workflow::{WorkflowConfig, DEFAULT_PACING_MS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".mediguard.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Analysis service settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Staged reveal settings.
    #[serde(default)]
    pub workflow: WorkflowSettings,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Default report format.
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "markdown".to_string()
}

/// Analysis service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the analysis service.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Request timeout in seconds. Unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Number of sample patient IDs to request.
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_seconds: None,
            sample_limit: default_sample_limit(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_sample_limit() -> usize {
    10
}

/// Staged reveal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Pause between staged reveals, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
        }
    }
}

fn default_pacing_ms() -> u64 {
    DEFAULT_PACING_MS
}

/// Report rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// How many sample IDs to print with `--samples`.
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Append each section's raw JSON to the Markdown report.
    #[serde(default)]
    pub include_raw: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            include_raw: false,
        }
    }
}

fn default_max_samples() -> usize {
    4
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.mediguard.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and their environment fallbacks) take precedence over
    /// config file settings. Only explicitly provided values override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref api_url) = args.api_url {
            self.backend.api_url = api_url.clone();
        }

        if let Some(timeout) = args.timeout {
            self.backend.timeout_seconds = Some(timeout);
        }

        if args.no_pacing {
            self.workflow.pacing_ms = 0;
        } else if let Some(pacing_ms) = args.pacing_ms {
            self.workflow.pacing_ms = pacing_ms;
        }

        if let Some(format) = args.format {
            self.general.format = format.as_str().to_string();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Log level after merging. `--quiet` wins over a verbose config file.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Settings for the HTTP gateway.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            api_url: self.backend.api_url.clone(),
            timeout_seconds: self.backend.timeout_seconds,
            sample_limit: self.backend.sample_limit,
        }
    }

    /// Settings for the orchestrator.
    pub fn workflow_config(&self) -> WorkflowConfig {
        if self.workflow.pacing_ms == 0 {
            return WorkflowConfig::headless();
        }

        WorkflowConfig {
            pacing: Duration::from_millis(self.workflow.pacing_ms),
        }
    }

    /// Effective report format; unknown values fall back to Markdown.
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::parse(&self.general.format).unwrap_or_default()
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
