//! Query generation agent: question → intent → synthesized SQL → safety gate →
//! read-only execution.
//!
//! Every step is fallible and every failure collapses into a
//! [`QueryOutcome`] with `success == false`. Callers treat that as "no
//! factual grounding available", never as a fatal error.

use anyhow::Context;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use super::types::{Intent, QueryOutcome};
use crate::db::Databases;
use crate::error::{AssistError, Result};
use crate::generation::{strip_code_fences, TextGenerator};

/// Upper bound on rows handed to the grounding prompt.
pub const MAX_ROWS: usize = 200;

/// The transactional schema as described to the model. SQLite dialect.
pub const STORE_SCHEMA_PROMPT: &str = "\
- customer(id, name, taxId, email, streetNumber, phone, addressId, complement)
- \"order\"(id, orderDate, customerId, status)
- order_line(id, orderId, productId, quantity, salePrice, discount)
- product(id, name, description, price, categoryId)";

// ── Subject extraction ────────────────────────────────────────────────────────

/// Best-effort guess at the customer a question is about. Prompt enrichment only.
pub trait SubjectExtractor {
    fn extract(&self, question: &str) -> Option<String>;
}

/// Lowercases the question and removes a fixed set of filler phrases, matched as whole words.
pub struct StopPhraseExtractor;

// Longest first so "purchases of" wins over "purchase".
const STOP_PHRASES: &[&str] = &[
    "information about",
    "information on",
    "information of",
    "purchases of",
    "purchases by",
    "data for",
    "data of",
    "customer",
    "purchase",
];

impl SubjectExtractor for StopPhraseExtractor {
    fn extract(&self, question: &str) -> Option<String> {
        let lowered = question.to_lowercase();
        let words: Vec<&str> = lowered
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| matches!(c, '?' | '!' | '.' | ',' | ';' | ':')))
            .filter(|w| !w.is_empty())
            .collect();

        // Phrases only match whole words, so "customers" and "purchased" survive.
        let mut kept = Vec::with_capacity(words.len());
        let mut i = 0;
        while i < words.len() {
            let matched = STOP_PHRASES.iter().find_map(|phrase| {
                let parts: Vec<&str> = phrase.split(' ').collect();
                words[i..].starts_with(&parts).then_some(parts.len())
            });
            match matched {
                Some(len) => i += len,
                None => {
                    kept.push(words[i]);
                    i += 1;
                }
            }
        }
        (!kept.is_empty()).then(|| kept.join(" "))
    }
}

// ── Safety gate ───────────────────────────────────────────────────────────────

/// Reject anything that is not a single read statement with an explicit column list.
pub fn check_query_safety(sql: &str) -> Result<()> {
    let lowered = sql.trim().trim_end_matches(';').trim().to_lowercase();

    if lowered.is_empty() {
        return Err(AssistError::SafetyGate("empty query".into()));
    }

    let first_word: String = lowered
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if first_word != "select" && first_word != "with" {
        return Err(AssistError::SafetyGate(format!(
            "only SELECT statements may run, got `{first_word}`"
        )));
    }

    if lowered.contains(';') {
        return Err(AssistError::SafetyGate("multiple statements".into()));
    }
    if lowered.contains("--") || lowered.contains("/*") {
        return Err(AssistError::SafetyGate("comments are not allowed".into()));
    }

    for (idx, ch) in lowered.char_indices() {
        if ch == '*' && is_select_list_wildcard(&lowered[..idx]) {
            return Err(AssistError::SafetyGate("wildcard column selection".into()));
        }
    }

    Ok(())
}

/// True when the text before a `*` puts it in a select-list position.
fn is_select_list_wildcard(before: &str) -> bool {
    let before = before.trim_end();
    if before.ends_with(',') || before.ends_with('.') {
        return true;
    }
    let word: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    matches!(word.as_str(), "select" | "distinct" | "all")
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// Runs a vetted query and returns its rows rendered as text.
pub trait QueryExecutor {
    fn execute(&self, sql: &str) -> Result<Vec<Vec<String>>>;
}

/// Executes against a read-only connection to the transactional store.
pub struct SqliteQueryExecutor {
    conn: Connection,
}

impl SqliteQueryExecutor {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(databases: &Databases) -> anyhow::Result<Self> {
        let conn = databases
            .open_store_read_only()
            .context("failed to open read-only store for query execution")?;
        Ok(Self::new(conn))
    }
}

impl QueryExecutor for SqliteQueryExecutor {
    fn execute(&self, sql: &str) -> Result<Vec<Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| AssistError::QueryExecution(e.to_string()))?;
        if !stmt.readonly() {
            return Err(AssistError::QueryExecution("statement is not read-only".into()));
        }

        let columns = stmt.column_count();
        let mut rows = stmt
            .query([])
            .map_err(|e| AssistError::QueryExecution(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| AssistError::QueryExecution(e.to_string()))?
        {
            if out.len() == MAX_ROWS {
                tracing::warn!(max_rows = MAX_ROWS, "query result truncated");
                break;
            }
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                let value = row
                    .get_ref(i)
                    .map_err(|e| AssistError::QueryExecution(e.to_string()))?;
                values.push(render_value(value));
            }
            out.push(values);
        }
        Ok(out)
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

// ── Agent ─────────────────────────────────────────────────────────────────────

/// Anything that can turn a question into structured facts. Never fails.
pub trait FactSource {
    fn answer(&self, question: &str) -> QueryOutcome;
}

pub struct QueryAgent<'a> {
    generator: &'a dyn TextGenerator,
    executor: &'a dyn QueryExecutor,
    extractor: &'a dyn SubjectExtractor,
}

impl<'a> QueryAgent<'a> {
    pub fn new(generator: &'a dyn TextGenerator, executor: &'a dyn QueryExecutor) -> Self {
        Self {
            generator,
            executor,
            extractor: &StopPhraseExtractor,
        }
    }

    pub fn with_extractor(mut self, extractor: &'a dyn SubjectExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// One generation call. Provider failure or a label outside the closed set yields `None`.
    pub fn classify_intent(&self, question: &str) -> Option<Intent> {
        let labels: Vec<&str> = Intent::ALL.iter().map(|i| i.as_str()).collect();
        let prompt = format!(
            "You classify questions from point-of-sale staff.\n\
             Reply with exactly one label from this list and nothing else:\n\
             {}\n\n\
             Question: \"{question}\"",
            labels.join("\n")
        );

        match self.generator.generate(&prompt) {
            Ok(raw) => {
                let intent = Intent::parse_label(&raw);
                if intent.is_none() {
                    let err = AssistError::IntentClassification(format!("unrecognized label `{}`", raw.trim()));
                    tracing::warn!(error = %err, "intent classification degraded");
                }
                intent
            }
            Err(e) => {
                tracing::warn!(error = %e, "intent classification degraded");
                None
            }
        }
    }

    /// Ask the model for a single SQLite SELECT over the fixed schema.
    pub fn synthesize_query(
        &self,
        question: &str,
        intent: Option<Intent>,
        subject: Option<&str>,
    ) -> Result<String> {
        let prompt = format!(
            "Write one valid SQLite SELECT statement answering the question below.\n\
             Rules:\n\
             - never use SELECT * or any table.* wildcard; list the columns you need\n\
             - quote the table name \"order\"\n\
             - reply with the bare SQL only, no Markdown, no code fences, no explanation\n\n\
             Question: \"{question}\"\n\
             Intent: {}\n\
             Customer mentioned: {}\n\n\
             Tables:\n{STORE_SCHEMA_PROMPT}",
            intent.map(|i| i.as_str()).unwrap_or("unknown"),
            subject.unwrap_or("unknown"),
        );

        let raw = self
            .generator
            .generate(&prompt)
            .map_err(|e| AssistError::QuerySynthesis(e.to_string()))?;
        let sql = strip_code_fences(&raw);
        if sql.is_empty() {
            return Err(AssistError::QuerySynthesis("model returned no query".into()));
        }
        Ok(sql)
    }

    fn run(&self, question: &str) -> Result<QueryOutcome> {
        let subject = self.extractor.extract(question);
        let intent = self.classify_intent(question);
        tracing::debug!(intent = ?intent, subject = ?subject, "question analyzed");

        let sql = self.synthesize_query(question, intent, subject.as_deref())?;
        check_query_safety(&sql)?;

        let rows = self.executor.execute(&sql)?;
        tracing::info!(rows = rows.len(), intent = ?intent, "structured query executed");

        Ok(QueryOutcome {
            success: true,
            intent,
            subject_name: subject,
            query_text: Some(sql),
            rows: Some(rows),
            error: None,
        })
    }
}

impl FactSource for QueryAgent<'_> {
    fn answer(&self, question: &str) -> QueryOutcome {
        match self.run(question) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "query agent degraded");
                QueryOutcome::failure(e.to_string())
            }
        }
    }
}
