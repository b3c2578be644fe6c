//! CLI interface module
//!
//! This module provides command-line interface functionality for shorter.

pub mod commands;

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::cli::{Commands, ConfigCommands};
use crate::config::AppConfig;
use crate::deletion::DeletionCoordinator;
use crate::storage::{StorageEngine, StorageFactory};
use commands::{add_links, config_generate, delete_links, get_link, list_links, print_key, status};

#[derive(Debug)]
pub enum CliError {
    StorageError(String),
    CommandError(String),
}

impl CliError {
    /// Format as simple output
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(msg) => format!("Storage error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    /// Format as colored output
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(msg) => {
                format!("{} {}", "Storage error:".red().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<crate::errors::ShorterError> for CliError {
    fn from(err: crate::errors::ShorterError) -> Self {
        CliError::StorageError(err.format_simple())
    }
}

/// Run a CLI command from clap-parsed input
pub async fn run_cli_command(cmd: Commands, config: &AppConfig) -> Result<(), CliError> {
    // 不需要存储的命令
    match cmd {
        Commands::Key { url } => return print_key(&url),
        Commands::Config {
            action: ConfigCommands::Generate { output_path, force },
        } => return config_generate(output_path, force),
        _ => {}
    }

    let storage = StorageFactory::create(&config.storage, &config.database).await?;
    let mut coordinator = matches!(cmd, Commands::Delete { .. })
        .then(|| DeletionCoordinator::start(Arc::clone(&storage), &config.deletion));

    let result = tokio::select! {
        result = run_storage_command(cmd, storage.as_ref(), coordinator.as_mut(), config) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, closing storage");
            Err(CliError::CommandError("interrupted".to_string()))
        }
    };

    // 删除消费任务退出后才能关闭存储
    let stopped = match coordinator.as_mut() {
        Some(coordinator) => coordinator.shutdown().await,
        None => Ok(()),
    };
    let closed = storage.close().await;

    result?;
    stopped?;
    closed?;
    Ok(())
}

async fn run_storage_command(
    cmd: Commands,
    storage: &dyn StorageEngine,
    coordinator: Option<&mut DeletionCoordinator>,
    config: &AppConfig,
) -> Result<(), CliError> {
    match cmd {
        Commands::Add { urls, owner } => add_links(storage, urls, &owner).await,
        Commands::Get { key } => get_link(storage, &key).await,
        Commands::List { owner } => list_links(storage, &owner).await,
        Commands::Delete { owner, keys } => {
            let coordinator = coordinator.ok_or_else(|| {
                CliError::CommandError("deletion coordinator is not running".to_string())
            })?;
            delete_links(coordinator, owner, keys).await
        }
        Commands::Status => status(storage, config).await,
        Commands::Key { .. } | Commands::Config { .. } => unreachable!("handled above"),
    }
}
