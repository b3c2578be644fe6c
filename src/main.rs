use clap::Parser;

use shorter::cli::Cli;
use shorter::interfaces::cli::run_cli_command;
use shorter::system::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = cli.resolve_config()?;

    // guard 释放前会刷出缓冲的日志
    let guard = init_logging(&config.logging)?;

    if let Err(e) = run_cli_command(cli.command, &config).await {
        eprintln!("{}", e.format_colored());
        drop(guard);
        std::process::exit(1);
    }

    Ok(())
}
