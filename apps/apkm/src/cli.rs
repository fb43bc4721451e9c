//! Command line interface definition

use apkm_config::TimeoutScope;
use apkm_types::ColorChoice;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// apkm - Split-package bundle installer
#[derive(Parser)]
#[command(name = "apkm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Install split-package (.apkm) bundles")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to the cache directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Which part of the install the timeout covers
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ScopeArg {
    /// Only the wait for the verdict after commit
    AwaitOutcome,
    /// Payload streaming and commit as well
    WholeSession,
}

impl From<ScopeArg> for TimeoutScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::AwaitOutcome => TimeoutScope::AwaitOutcome,
            ScopeArg::WholeSession => TimeoutScope::WholeSession,
        }
    }
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show what a bundle contains without installing it
    Inspect {
        /// Path to the .apkm bundle
        archive: PathBuf,
    },

    /// Install a bundle
    #[command(alias = "i")]
    Install {
        /// Path to the .apkm bundle
        archive: PathBuf,

        /// Give up waiting for a verdict after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Which part of the install the timeout covers
        #[arg(long, value_enum)]
        timeout_scope: Option<ScopeArg>,

        /// Confirm installation prompts automatically
        #[arg(short, long)]
        yes: bool,
    },

    /// List installed packages
    #[command(alias = "ls")]
    List,

    /// Remove extracted payloads from the cache
    ClearCache,
}

impl Commands {
    /// Name used in log records
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inspect { .. } => "inspect",
            Self::Install { .. } => "install",
            Self::List => "list",
            Self::ClearCache => "clear-cache",
        }
    }
}
