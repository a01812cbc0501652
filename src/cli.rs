//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// MediGuard - staged fraud and discharge-readiness analysis for a patient
///
/// Submits a patient to the analysis service and reveals the three agents'
/// findings (identity & claims, billing, discharge) one after another.
///
/// Examples:
///   mediguard --patient 1b2c3d4e-0000-4000-8000-000000000000
///   mediguard --patient <ID> --format json --output report.json
///   mediguard --patient <ID> --no-pacing
///   mediguard --samples
///   mediguard --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Patient identifier (UUID) to analyze
    #[arg(
        short,
        long,
        value_name = "ID",
        required_unless_present_any = ["samples", "health", "init_config"]
    )]
    pub patient: Option<String>,

    /// List sample patient IDs from the analysis service and exit
    #[arg(long)]
    pub samples: bool,

    /// Check the analysis service health endpoint and exit
    #[arg(long)]
    pub health: bool,

    /// Analysis service base URL
    ///
    /// Defaults to http://localhost:8000 or the value in .mediguard.toml.
    #[arg(long, value_name = "URL", env = "MEDIGUARD_API_URL")]
    pub api_url: Option<String>,

    /// Pause between staged reveals, in milliseconds
    #[arg(long, value_name = "MS")]
    pub pacing_ms: Option<u64>,

    /// Reveal all sections without pacing (headless mode)
    #[arg(long, conflicts_with = "pacing_ms")]
    pub no_pacing: bool,

    /// Request timeout in seconds
    ///
    /// By default the client waits for as long as the analysis takes.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .mediguard.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .mediguard.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "markdown" | "md" => Some(OutputFormat::Markdown),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref api_url) = self.api_url {
            if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// The patient identifier; an absent one is treated as empty.
    pub fn patient_id(&self) -> &str {
        self.patient.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_args() -> Args {
        Args {
            patient: Some("1b2c3d4e".to_string()),
            samples: false,
            health: false,
            api_url: None,
            pacing_ms: None,
            no_pacing: false,
            timeout: None,
            format: None,
            output: None,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "mediguard",
            "--patient",
            "abc",
            "--api-url",
            "http://127.0.0.1:9000",
            "--no-pacing",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.patient_id(), "abc");
        assert_eq!(args.api_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert!(args.no_pacing);
        assert_eq!(args.format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_patient_required_unless_listing() {
        assert!(Args::try_parse_from(["mediguard"]).is_err());
        assert!(Args::try_parse_from(["mediguard", "--samples"]).is_ok());
        assert!(Args::try_parse_from(["mediguard", "--init-config"]).is_ok());
    }

    #[test]
    fn test_pacing_flags_conflict() {
        let result = Args::try_parse_from([
            "mediguard",
            "--patient",
            "abc",
            "--no-pacing",
            "--pacing-ms",
            "100",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.api_url = Some("localhost:8000".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("md"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse("pdf"), None);
    }
}
