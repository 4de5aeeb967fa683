//! CLI `ask` command: run one question through the full chat pipeline.

use anyhow::{Context, Result};
use pos_assistant::config::AssistantConfig;

pub async fn ask(
    config: &AssistantConfig,
    seller_id: i64,
    customer_id: Option<i64>,
    message: String,
    verbose: bool,
) -> Result<()> {
    let assistant = super::build_assistant(config)?;

    let reply = tokio::task::spawn_blocking(move || assistant.chat(seller_id, &message, customer_id))
        .await
        .context("chat task panicked")??;

    println!("{}", reply.answer);
    if verbose {
        eprintln!();
        eprintln!("session:          {}", reply.session_id);
        eprintln!("message id:       {}", reply.message_id);
        eprintln!("interaction:      {}", reply.feedback.interaction_logged);
        eprintln!("preference:       {}", reply.feedback.preference_recorded);
        eprintln!("recommendations:  {}", reply.feedback.recommendations_recorded);
    }
    Ok(())
}
