//! Generate config command

use std::path::Path;

use colored::Colorize;

use crate::config::AppConfig;
use crate::interfaces::cli::CliError;

/// Generate example configuration file
pub fn config_generate(output_path: Option<String>, force: bool) -> Result<(), CliError> {
    let Some(path) = output_path else {
        print!("{}", AppConfig::generate_sample_config());
        return Ok(());
    };

    if Path::new(&path).exists() && !force {
        return Err(CliError::CommandError(format!(
            "{} already exists, use --force to overwrite",
            path
        )));
    }

    println!(
        "{} {}",
        "Generating configuration file...".yellow(),
        path.blue()
    );
    AppConfig::default().save_to_file(&path).map_err(|e| {
        CliError::CommandError(format!("Unable to write configuration file: {}", e))
    })?;
    println!(
        "  {} {}",
        "Configuration file generated successfully".green(),
        path.blue()
    );
    Ok(())
}
