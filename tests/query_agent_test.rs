mod helpers;

use helpers::{gen_err, ok, test_store, RecordingExecutor, ScriptedGenerator};
use pos_assistant::assistant::query_agent::{
    check_query_safety, FactSource, QueryAgent, QueryExecutor, SqliteQueryExecutor, SubjectExtractor,
};
use pos_assistant::assistant::types::Intent;
use pos_assistant::error::AssistError;

#[test]
fn select_star_never_reaches_the_store() {
    let generator = ScriptedGenerator::new(
        vec![ok("customer_data"), ok("SELECT * FROM customer")],
        None,
    );
    let executor = RecordingExecutor::new(vec![vec!["leak".into()]]);

    let outcome = QueryAgent::new(generator.as_ref(), &executor).answer("Who is Ana?");

    assert!(!outcome.success);
    assert!(outcome.rows.is_none());
    assert_eq!(executor.calls(), 0);
    assert!(outcome.error.unwrap().contains("wildcard"));
}

#[test]
fn writes_are_rejected_by_the_gate() {
    for sql in [
        "DELETE FROM customer",
        "UPDATE product SET price = 0",
        "DROP TABLE customer",
        "SELECT name FROM customer; DELETE FROM customer",
        "SELECT name FROM customer -- comment",
    ] {
        assert!(
            matches!(check_query_safety(sql), Err(AssistError::SafetyGate(_))),
            "should reject: {sql}"
        );
    }
    assert!(check_query_safety("SELECT name, phone FROM customer WHERE id = 1;").is_ok());
    assert!(check_query_safety("SELECT COUNT(*) FROM product").is_ok());
}

#[test]
fn answers_from_the_seeded_store() {
    let generator = ScriptedGenerator::new(
        vec![
            ok("customer_phones"),
            ok("SELECT name, phone FROM customer WHERE name LIKE '%Ana%'"),
        ],
        None,
    );
    let executor = SqliteQueryExecutor::new(test_store());

    let outcome = QueryAgent::new(generator.as_ref(), &executor)
        .answer("What is the phone of customer Ana Souza?");

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.intent, Some(Intent::CustomerPhones));
    assert_eq!(outcome.subject_name.as_deref(), Some("what is the phone of ana souza"));
    assert_eq!(
        outcome.rows,
        Some(vec![vec!["Ana Souza".to_string(), "555-0100".to_string()]])
    );
    assert_eq!(generator.calls(), 2);
}

#[test]
fn unknown_intent_label_still_runs_the_query() {
    let generator = ScriptedGenerator::new(
        vec![
            ok("shoe_size"),
            ok("SELECT status FROM \"order\" WHERE id = 102"),
        ],
        None,
    );
    let executor = SqliteQueryExecutor::new(test_store());

    let outcome = QueryAgent::new(generator.as_ref(), &executor).answer("Status of order 102?");

    assert!(outcome.success);
    assert_eq!(outcome.intent, None);
    assert_eq!(outcome.rows, Some(vec![vec!["open".to_string()]]));
    assert!(generator.last_prompt().contains("Intent: unknown"));
}

#[test]
fn intent_provider_failure_still_runs_the_query() {
    let generator = ScriptedGenerator::new(
        vec![gen_err(), ok("SELECT name FROM product WHERE id = 3")],
        None,
    );
    let executor = RecordingExecutor::new(vec![vec!["Coffee Grinder".into()]]);

    let outcome = QueryAgent::new(generator.as_ref(), &executor).answer("Name of product 3?");

    assert!(outcome.success);
    assert_eq!(outcome.intent, None);
    assert_eq!(executor.calls(), 1);
}

#[test]
fn execution_error_is_a_failed_outcome() {
    let generator = ScriptedGenerator::new(
        vec![ok("customer_data"), ok("SELECT shoe_size FROM customer")],
        None,
    );
    let executor = SqliteQueryExecutor::new(test_store());

    let outcome = QueryAgent::new(generator.as_ref(), &executor).answer("Ana's shoe size?");

    assert!(!outcome.success);
    assert!(outcome.rows.is_none());
    assert!(outcome.error.is_some());
}

#[test]
fn synthesis_failure_is_a_failed_outcome() {
    let generator = ScriptedGenerator::new(vec![ok("customer_data"), gen_err()], None);
    let executor = RecordingExecutor::new(Vec::new());

    let outcome = QueryAgent::new(generator.as_ref(), &executor).answer("Who is Bruno?");

    assert!(!outcome.success);
    assert_eq!(executor.calls(), 0);
}

#[test]
fn code_fences_are_stripped_before_execution() {
    let generator = ScriptedGenerator::new(
        vec![
            ok("customer_purchases"),
            ok("```sql\nSELECT orderId, productId FROM order_line WHERE orderId = 100\n```"),
        ],
        None,
    );
    let executor = RecordingExecutor::new(vec![vec!["100".into(), "1".into()]]);

    let outcome = QueryAgent::new(generator.as_ref(), &executor).answer("What did order 100 contain?");

    assert!(outcome.success);
    assert_eq!(
        executor.executed.lock().unwrap().as_slice(),
        ["SELECT orderId, productId FROM order_line WHERE orderId = 100"]
    );
    assert_eq!(
        outcome.query_text.as_deref(),
        Some("SELECT orderId, productId FROM order_line WHERE orderId = 100")
    );
}

#[test]
fn executor_renders_nulls_and_numbers_as_text() {
    let executor = SqliteQueryExecutor::new(test_store());
    let rows = executor
        .execute("SELECT id, email, price FROM customer JOIN product USING (id) WHERE id = 3")
        .unwrap();
    assert_eq!(rows, vec![vec!["3".to_string(), "NULL".to_string(), "80".to_string()]]);
}

#[test]
fn executor_refuses_write_statements() {
    let executor = SqliteQueryExecutor::new(test_store());
    let err = executor.execute("DELETE FROM customer").unwrap_err();
    assert!(matches!(err, AssistError::QueryExecution(_)));
}

struct FixedSubject(&'static str);

impl SubjectExtractor for FixedSubject {
    fn extract(&self, _question: &str) -> Option<String> {
        Some(self.0.to_string())
    }
}

#[test]
fn custom_extractor_feeds_the_synthesis_prompt() {
    let generator = ScriptedGenerator::new(
        vec![
            ok("customer_data"),
            ok("SELECT name FROM customer WHERE name = 'Carla Dias'"),
        ],
        None,
    );
    let executor = RecordingExecutor::new(vec![vec!["Carla Dias".into()]]);
    let extractor = FixedSubject("Carla Dias");

    let outcome = QueryAgent::new(generator.as_ref(), &executor)
        .with_extractor(&extractor)
        .answer("Tell me about the owner of the red bicycle");

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.subject_name.as_deref(), Some("Carla Dias"));
    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Customer mentioned: Carla Dias"));
}
