//! Status command

use colored::Colorize;

use crate::config::AppConfig;
use crate::interfaces::cli::CliError;
use crate::storage::StorageEngine;

pub async fn status(storage: &dyn StorageEngine, config: &AppConfig) -> Result<(), CliError> {
    let available = storage.is_available().await;
    let policy: &str = config.deletion.policy.as_ref();

    println!("{}", "Storage status:".bold().green());
    println!("  backend:   {}", storage.backend_name().cyan());
    println!(
        "  available: {}",
        if available {
            "yes".green()
        } else {
            "no".red()
        }
    );
    println!(
        "  deletion:  {} (queue capacity {})",
        policy.cyan(),
        config.deletion.queue_capacity
    );

    if !available {
        return Err(CliError::StorageError("backend is not available".to_string()));
    }
    Ok(())
}
