//! CLI `recommend` command: print ranked suggestions for a customer.

use anyhow::{Context, Result};
use pos_assistant::config::AssistantConfig;

pub async fn recommend(
    config: &AssistantConfig,
    customer_id: Option<i64>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let assistant = super::build_assistant(config)?;
    let limit = limit.unwrap_or(config.retrieval.recommendation_limit);

    let recs = tokio::task::spawn_blocking(move || assistant.recommend(customer_id, limit))
        .await
        .context("recommend task panicked")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&recs)?);
        return Ok(());
    }

    if recs.is_empty() {
        println!("No recommendations available.");
        return Ok(());
    }

    for (rank, rec) in recs.iter().enumerate() {
        let score = rec
            .score
            .map(|s| format!("{s:.3}"))
            .unwrap_or_else(|| "-".into());
        let price = rec
            .price
            .map(|p| format!("{p:.2}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>2}. [{}] {}  price {}  score {}  ({})",
            rank + 1,
            rec.product_id,
            rec.name,
            price,
            score,
            rec.reason
        );
    }
    Ok(())
}
