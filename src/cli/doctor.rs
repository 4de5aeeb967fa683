//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use pos_assistant::config::AssistantConfig;
use pos_assistant::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &AssistantConfig) -> Result<()> {
    let db_path = config.resolved_assistant_db_path();
    let store_path = config.resolved_store_db_path();

    if !db_path.exists() {
        println!("Assistant database: not found at {}", db_path.display());
        println!("Run `pos-assistant sync` or `pos-assistant serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("POS Assistant Health Report");
    println!("===========================");
    println!();
    println!("Assistant DB:      {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!();
    println!("Transactional store:");
    println!("  Path:            {}", store_path.display());
    match db::open_store(&store_path, true) {
        Ok(_) => println!("  Status:          reachable (read-only)"),
        Err(e) => println!("  Status:          UNAVAILABLE ({e:#})"),
    }
    println!();
    println!("Embedding model:");
    println!(
        "  Stored:          {} ({} dims)",
        report.embedding_model.as_deref().unwrap_or("(not set)"),
        report
            .embedding_dimensions
            .map(|d| d.to_string())
            .unwrap_or_else(|| "?".into())
    );
    println!(
        "  Configured:      {} ({} dims)",
        config.embedding.model, config.embedding.dimensions
    );
    if let Some(ref stored) = report.embedding_model {
        let dims_match = report.embedding_dimensions == Some(config.embedding.dimensions);
        if stored != &config.embedding.model || !dims_match {
            println!("  WARNING: model mismatch! Run `pos-assistant sync --force` to re-embed.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Messages:        {}", report.message_count);
    println!("  Customers:       {}", report.customer_count);
    println!(
        "  Products:        {} ({} without embedding)",
        report.product_count, report.unembedded_product_count
    );
    println!("  Interactions:    {}", report.interaction_count);
    println!("  Recommendations: {}", report.recommendation_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
        println!("  2. Or delete the file and rebuild the mirror: pos-assistant sync --force");
        println!("     (the conversation log and audit tables are not recoverable this way)");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
