mod helpers;

use helpers::{gen_err, ok, FailingRetriever, RecordingExecutor, ScriptedGenerator, StaticRetriever};
use pos_assistant::assistant::orchestrator::{
    HybridOrchestrator, CONTEXT_UNAVAILABLE, GENERATION_APOLOGY, NO_DATA,
};
use pos_assistant::assistant::query_agent::{FactSource, QueryAgent};
use pos_assistant::assistant::types::QueryOutcome;

/// Fact source that always fails.
struct NoFacts;

impl FactSource for NoFacts {
    fn answer(&self, _question: &str) -> QueryOutcome {
        QueryOutcome::failure("store offline")
    }
}

#[test]
fn both_stages_failing_still_makes_one_generation_call() {
    let generator = ScriptedGenerator::always("I could not find that customer.");
    let orchestrator = HybridOrchestrator::new(generator.as_ref(), Some(&NoFacts));

    let answer = orchestrator.answer(1, "Who is Ana?", &FailingRetriever);

    assert_eq!(answer, "I could not find that customer.");
    assert_eq!(generator.calls(), 1);
    let prompt = generator.last_prompt();
    assert!(prompt.contains(CONTEXT_UNAVAILABLE));
    assert!(prompt.contains(NO_DATA));
    assert!(prompt.contains("Who is Ana?"));
}

#[test]
fn missing_query_agent_degrades_to_no_data() {
    let generator = ScriptedGenerator::always("Answer without facts.");
    let orchestrator = HybridOrchestrator::new(generator.as_ref(), None);

    let answer = orchestrator.answer(1, "Any news?", &StaticRetriever("- (0.910) earlier chat"));

    assert_eq!(answer, "Answer without facts.");
    let prompt = generator.last_prompt();
    assert!(prompt.contains("- (0.910) earlier chat"));
    assert!(prompt.contains(NO_DATA));
}

#[test]
fn generation_failure_returns_apology() {
    let generator = ScriptedGenerator::failing();
    let orchestrator = HybridOrchestrator::new(generator.as_ref(), Some(&NoFacts));

    let answer = orchestrator.answer(1, "Who is Ana?", &StaticRetriever("no context found"));

    assert_eq!(answer, GENERATION_APOLOGY);
    assert!(!answer.is_empty());
    assert_eq!(generator.calls(), 1);
}

#[test]
fn blank_generation_returns_apology() {
    let generator = ScriptedGenerator::always("   \n");
    let orchestrator = HybridOrchestrator::new(generator.as_ref(), None);

    assert_eq!(
        orchestrator.answer(1, "hello", &FailingRetriever),
        GENERATION_APOLOGY
    );
}

#[test]
fn facts_and_context_both_reach_the_prompt() {
    // Shared script: intent, SQL, then the final answer.
    let generator = ScriptedGenerator::new(
        vec![
            ok("customer_phones"),
            ok("SELECT name, phone FROM customer WHERE id = 1"),
            ok("  Ana's phone is 555-0100.  "),
        ],
        None,
    );
    let executor = RecordingExecutor::new(vec![vec!["Ana Souza".into(), "555-0100".into()]]);
    let agent = QueryAgent::new(generator.as_ref(), &executor);
    let orchestrator = HybridOrchestrator::new(generator.as_ref(), Some(&agent));

    let answer = orchestrator.answer(
        7,
        "Phone of customer Ana Souza?",
        &StaticRetriever("- (0.800) Ana called yesterday"),
    );

    assert_eq!(answer, "Ana's phone is 555-0100.");
    assert_eq!(generator.calls(), 3);

    let prompt = generator.last_prompt();
    assert!(prompt.contains("=== STRUCTURED FACTS ===\nAna Souza | 555-0100"));
    assert!(prompt.contains("=== DETECTED INTENT ===\ncustomer_phones"));
    assert!(prompt.contains("=== DETECTED CUSTOMER ===\nphone of ana souza"));
    assert!(prompt.contains("- (0.800) Ana called yesterday"));
    assert!(!prompt.contains("SELECT name, phone"));
}

#[test]
fn query_agent_failure_does_not_block_answer() {
    let generator = ScriptedGenerator::new(
        vec![gen_err(), gen_err(), ok("Best guess from history.")],
        None,
    );
    let executor = RecordingExecutor::new(Vec::new());
    let agent = QueryAgent::new(generator.as_ref(), &executor);
    let orchestrator = HybridOrchestrator::new(generator.as_ref(), Some(&agent));

    let answer = orchestrator.answer(1, "Who bought espresso?", &StaticRetriever("- (0.500) espresso chat"));

    assert_eq!(answer, "Best guess from history.");
    assert_eq!(executor.calls(), 0);
    assert!(generator.last_prompt().contains(NO_DATA));
}
