//! Link commands

use colored::Colorize;

use crate::errors::ShorterError;
use crate::interfaces::cli::CliError;
use crate::storage::{BatchItem, OpContext, StorageEngine};
use crate::utils::{derive_key, normalize_url};

pub fn print_key(url: &str) -> Result<(), CliError> {
    let normalized = normalize_url(url);
    let key = derive_key(&normalized);
    if key.is_empty() {
        return Err(CliError::CommandError(format!("not a valid URL: {:?}", url)));
    }
    println!("{} -> {}", normalized.blue().underline(), key.cyan());
    Ok(())
}

pub async fn add_links(
    storage: &dyn StorageEngine,
    urls: Vec<String>,
    owner: &str,
) -> Result<(), CliError> {
    let ctx = OpContext::background();

    if let [url] = urls.as_slice() {
        match storage.set(&ctx, url, owner).await {
            Ok(key) => println!(
                "{} Added: {} -> {}",
                "✓".bold().green(),
                key.cyan(),
                normalize_url(url).blue().underline()
            ),
            Err(ShorterError::AlreadyExists { key, .. }) => println!(
                "{} Already stored: {} -> {}",
                "ℹ".bold().blue(),
                key.cyan(),
                normalize_url(url).blue().underline()
            ),
            Err(e) => return Err(e.into()),
        }
        return Ok(());
    }

    let items: Vec<BatchItem> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| BatchItem::new(i.to_string(), url.as_str()))
        .collect();
    let results = storage.set_batch(&ctx, &items, owner).await?;

    for result in &results {
        let marker = if result.already_existed {
            "ℹ".bold().blue()
        } else {
            "✓".bold().green()
        };
        println!(
            "{} {} -> {}",
            marker,
            result.short_key.cyan(),
            result.original_url.blue().underline()
        );
    }
    let created = results.iter().filter(|r| !r.already_existed).count();
    println!(
        "{} Batch stored: {} new, {} existing",
        "ℹ".bold().blue(),
        created.to_string().green(),
        (results.len() - created).to_string().yellow()
    );
    Ok(())
}

pub async fn get_link(storage: &dyn StorageEngine, key: &str) -> Result<(), CliError> {
    let url = storage.get(&OpContext::background(), key).await?;
    println!("{}", url);
    Ok(())
}

pub async fn list_links(storage: &dyn StorageEngine, owner: &str) -> Result<(), CliError> {
    let links = storage
        .get_user_urls(&OpContext::background(), owner)
        .await?;

    if links.is_empty() {
        println!("{} No links found for owner {}", "ℹ".bold().blue(), owner);
        return Ok(());
    }

    println!("{}", "Links:".bold().green());
    println!();
    for link in &links {
        println!(
            "  {} -> {}",
            link.short_key.cyan(),
            link.original_url.blue().underline()
        );
    }
    println!();
    println!(
        "{} Total {} links",
        "ℹ".bold().blue(),
        links.len().to_string().green()
    );
    Ok(())
}
