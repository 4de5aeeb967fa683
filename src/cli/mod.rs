pub mod ask;
pub mod doctor;
pub mod recommend;
pub mod sync;

use anyhow::{Context, Result};
use pos_assistant::assistant::Assistant;
use pos_assistant::config::AssistantConfig;
use std::sync::Arc;

/// Build the assistant and its HTTP providers for a one-shot command.
fn build_assistant(config: &AssistantConfig) -> Result<Arc<Assistant>> {
    let assistant = Assistant::from_config(config).context("failed to create providers")?;
    Ok(Arc::new(assistant))
}
