//! CLI `sync` command: mirror the transactional store and (re-)embed products.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use pos_assistant::config::AssistantConfig;

pub async fn sync(config: &AssistantConfig, force: bool) -> Result<()> {
    let assistant = super::build_assistant(config)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} products embedded ({eta})")
            .context("invalid progress template")?
            .progress_chars("##-"),
    );

    if force {
        println!("Re-embedding every product with model '{}'...", config.embedding.model);
    } else {
        println!("Synchronizing from {}...", config.resolved_store_db_path().display());
    }

    let bar = pb.clone();
    let summary = tokio::task::spawn_blocking(move || {
        assistant.synchronize(force, &mut |done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        })
    })
    .await
    .context("sync task panicked")??;

    pb.finish_and_clear();
    println!(
        "{} customers and {} products synchronized ({} embedded).",
        summary.customers, summary.products, summary.embedded
    );
    Ok(())
}
