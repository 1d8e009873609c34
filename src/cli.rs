use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// Rendering of the final aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report
    #[default]
    Human,
    /// Full aggregate as JSON
    Json,
    /// One-line counter summary
    Summary,
}

/// Main application configuration derived from CLI
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub paths: Vec<PathBuf>,
    pub rfc: String,
    pub extensions: Vec<String>,
    pub threads: usize,
    pub verbose: bool,
    pub quiet: bool,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub progress: bool,
    pub format: OutputFormat,
    pub export_dir: Option<PathBuf>,
    pub skip_unclassified: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            paths: cli.paths.clone(),
            rfc: cli.rfc.clone(),
            extensions: cli.get_extensions(),
            threads: cli.get_thread_count(),
            verbose: cli.verbose,
            quiet: cli.quiet,
            include_patterns: cli.include_patterns.clone(),
            exclude_patterns: cli.exclude_patterns.clone(),
            progress: cli.progress || (atty::is(atty::Stream::Stderr) && !cli.quiet),
            format: cli.format,
            export_dir: cli.export_dir.clone(),
            skip_unclassified: cli.skip_unclassified,
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Batch analyzer for CFDI fiscal vouchers
#[derive(Parser, Debug, Clone)]
#[command(name = "analyze-cfdi")]
#[command(about = "Ingest, classify, deduplicate and aggregate CFDI voucher batches")]
#[command(version)]
pub struct Cli {
    /// XML files and/or folders to analyze (folders expand recursively)
    #[arg(required = true, help = "Voucher files or folders to analyze")]
    pub paths: Vec<PathBuf>,

    /// Your own RFC; orients income-vs-expense classification
    #[arg(
        short = 'r',
        long = "rfc",
        env = "ANALYZE_CFDI_RFC",
        help = "Taxpayer RFC of the profile owner"
    )]
    pub rfc: String,

    /// File extensions to process (comma-separated)
    #[arg(
        short = 'e',
        long = "extensions",
        default_value = "xml",
        help = "File extensions to process (e.g., 'xml')"
    )]
    pub extensions: String,

    /// Number of concurrent workers
    #[arg(short = 't', long = "threads", help = "Number of concurrent workers")]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Show progress indicators
    #[arg(long = "progress")]
    pub progress: bool,

    /// Output format
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Write income/expense/concepts CSV tables into this directory
    #[arg(long = "export-dir")]
    pub export_dir: Option<PathBuf>,

    /// Drop receiver-mismatch vouchers from the data-quality report
    #[arg(long = "skip-unclassified")]
    pub skip_unclassified: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn get_extensions(&self) -> Vec<String> {
        self.extensions
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        for path in &self.paths {
            if !path.exists() {
                return Err(format!("Path does not exist: {}", path.display()));
            }
        }
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn get_thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}
