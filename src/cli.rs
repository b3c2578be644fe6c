//! Command-line interface definitions using clap
//!
//! This module defines the CLI structure for shorter using clap's derive macros.

use clap::{Parser, Subcommand};

use crate::config::AppConfig;

/// shorter - short-key URL storage
#[derive(Parser)]
#[command(name = "shorter")]
#[command(version)]
#[command(about = "Short-key URL storage with pluggable backends", long_about = None)]
pub struct Cli {
    /// Configuration file (default: config.toml, optional)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    /// Use the append-only file backend at this path
    #[arg(long, short = 'f', global = true)]
    pub file_storage_path: Option<String>,

    /// Use the relational backend with this DSN
    #[arg(long, short = 'd', global = true)]
    pub database_dsn: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// 命令行参数覆盖配置文件和环境变量
    /// 加载配置文件和环境变量，叠加命令行覆盖后再校验
    pub fn resolve_config(&self) -> crate::errors::Result<AppConfig> {
        let mut config = AppConfig::from_sources(self.config.as_deref())?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(path) = &self.file_storage_path {
            config.storage.file_storage_path = path.clone();
        }
        if let Some(dsn) = &self.database_dsn {
            config.database.dsn = dsn.clone();
        }
    }
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the short key derived from a URL (no storage access)
    Key {
        url: String,
    },

    /// Store one or more URLs
    ///
    /// More than one URL is stored as a single batch.
    Add {
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,

        /// Owner identifier
        #[arg(long, default_value = "")]
        owner: String,
    },

    /// Resolve a short key
    Get {
        key: String,
    },

    /// List the links owned by a user
    List {
        #[arg(long)]
        owner: String,
    },

    /// Soft-delete keys owned by a user through the deletion queue
    Delete {
        #[arg(long)]
        owner: String,

        #[arg(required = true, num_args = 1..)]
        keys: Vec<String>,
    },

    /// Show backend status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Configuration management commands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: print to stdout)
        output_path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
