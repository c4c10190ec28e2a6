use serde_json::json;
use std::sync::Arc;
use tasktree::core::config::EngineConfig;
use tasktree::core::task_tree::{
    ExperimentDocument, ExperimentRunner, Level, MemorySink, Params, RunSummary, TaskRegistry,
    Verdict,
};

async fn run_with(config: EngineConfig, yaml: &str) -> (RunSummary, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let document = ExperimentDocument::from_yaml_str(yaml).unwrap();
    let summary = ExperimentRunner::new(TaskRegistry::with_builtins(), config)
        .with_sink(sink.clone())
        .run(&document, Params::new())
        .await
        .unwrap();
    (summary, sink)
}

async fn run(yaml: &str) -> (RunSummary, Arc<MemorySink>) {
    run_with(EngineConfig::default(), yaml).await
}

#[tokio::test]
async fn while_key_present_runs_until_max_iterations() {
    let (summary, sink) = run(r#"
Parameters:
  Go: yes
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Key: Go
      MaxIterations: 3
    Children:
      - Task: Run.Message
        Config:
          Message: "pass @[Iter1]"
"#)
    .await;

    assert_eq!(summary.verdict, Verdict::Pass);
    assert!(sink.contains("Condition ('Go' exists) verified. Starting iteration 0"));
    assert!(sink.contains("[1/It2Seq1] pass 3"));
    assert!(!sink.contains("It3Seq1"));
    assert!(sink.contains("Maximum number of iterations (3) reached. While loop finalized."));
}

#[tokio::test]
async fn while_key_absent_runs_zero_iterations() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Key: Missing
    Children:
      - Task: Run.Publish
        Config:
          Touched: true
"#)
    .await;

    assert_eq!(summary.verdict, Verdict::NotSet);
    assert!(summary.published.is_empty());
    assert!(sink.contains("Condition ('Missing' exists) not verified. While loop finalized."));
}

#[tokio::test]
async fn while_negated_key_stops_once_published() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Key: Done
      Negate: true
    Children:
      - Task: Run.Publish
        Config:
          Done: true
"#)
    .await;

    assert_eq!(summary.published["Done"], json!(true));
    assert!(sink.contains("Condition ('Done' does not exist) verified. Starting iteration 0"));
    assert!(!sink.contains("Starting iteration 1"));
}

#[tokio::test]
async fn while_expression_sees_values_published_by_its_body() {
    let (summary, sink) = run(r#"
Parameters:
  Count: 0
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Evaluate: "Count < 3"
    Children:
      - Task: Run.Publish
        Config:
          Count: {"$expr": "Count + 1"}
"#)
    .await;

    assert_eq!(summary.published["Count"], json!(3));
    assert!(sink.contains("Starting iteration 2"));
    assert!(sink.contains("not verified. While loop finalized."));
}

#[tokio::test]
async fn while_expression_errors_count_as_not_verified() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Evaluate: "Undefined > 1"
    Children:
      - Task: Run.Dummy
"#)
    .await;

    assert!(summary.failures.is_empty());
    assert!(sink.contains("Condition will be considered as not verified"));
    assert!(!sink.contains("Starting iteration 0"));
}

#[tokio::test]
async fn while_negate_inverts_expression_conditions() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Evaluate: "true"
      Negate: true
      MaxIterations: 3
    Children:
      - Task: Run.Publish
        Config:
          Touched: true
"#)
    .await;

    assert!(summary.published.is_empty());
    assert!(sink.contains(
        "Condition (Expression 'true' (expanded) is False) not verified. While loop finalized."
    ));

    let (summary, sink) = run(r#"
Parameters:
  Count: 0
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Evaluate: "Count >= 2"
      Negate: true
    Children:
      - Task: Run.Publish
        Config:
          Count: {"$expr": "Count + 1"}
"#)
    .await;

    assert_eq!(summary.published["Count"], json!(2));
    assert!(sink.contains("Starting iteration 1"));
    assert!(!sink.contains("Starting iteration 2"));
}

#[tokio::test]
async fn while_without_max_iterations_stops_at_safety_cap() {
    let config = EngineConfig {
        while_iteration_cap: 4,
        ..EngineConfig::default()
    };
    let (summary, sink) = run_with(
        config,
        r#"
Parameters:
  Forever: 1
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Key: Forever
    Children:
      - Task: Run.Dummy
"#,
    )
    .await;

    assert_eq!(summary.verdict, Verdict::Pass);
    assert!(sink.contains("Starting iteration 3"));
    assert!(sink.contains("Safety cap of 4 iterations reached"));
}

#[tokio::test]
async fn while_with_both_styles_is_rejected() {
    let (summary, sink) = run(r#"
Parameters:
  Go: 1
Tasks:
  - Task: Flow.While
    Order: 1
    Config:
      Key: Go
      Evaluate: "true"
    Children:
      - Task: Run.Dummy
"#)
    .await;

    assert_eq!(summary.verdict, Verdict::Error);
    assert!(sink.contains("Invalid condition: only one of 'Evaluate' and 'Key'"));
}

const SELECT: &str = r#"
Parameters:
  Mode: "@MODE@"
Tasks:
  - Task: Flow.Select
    Order: 1
    Config:
      Conditions:
        - Key: Mode
          Pattern: "pro"
        - Evaluate: 'Mode == "lab"'
    Children:
      - Task: Run.Publish
        Config:
          Picked: "@[Branch]"
      - Task: Run.Publish
        Config:
          Picked: "@[Branch]"
      - Task: Run.Publish
        Config:
          Picked: "@[Branch]"
"#;

#[tokio::test]
async fn select_runs_first_verified_branch() {
    let (summary, sink) = run(&SELECT.replace("@MODE@", "production")).await;
    assert_eq!(summary.published["Picked"], json!(0));
    assert!(sink.contains("Condition \"'Mode' matches regex 'pro'\" verified for branch 0. Executing."));

    let (summary, _) = run(&SELECT.replace("@MODE@", "lab")).await;
    assert_eq!(summary.published["Picked"], json!(1));
}

#[tokio::test]
async fn select_skips_conditions_whose_expression_fails() {
    let yaml = SELECT.replace("@MODE@", "lab").replace(
        "        - Key: Mode\n          Pattern: \"pro\"\n",
        "        - Evaluate: \"Undefined > 1\"\n",
    );
    let (summary, sink) = run(&yaml).await;

    assert_eq!(summary.published["Picked"], json!(1));
    assert_eq!(summary.verdict, Verdict::Pass);
    assert!(summary.failures.is_empty());
    let debug: Vec<String> = sink
        .entries()
        .into_iter()
        .filter(|entry| entry.level == Level::Debug)
        .map(|entry| entry.message)
        .collect();
    assert!(debug
        .iter()
        .any(|message| message.contains("'Undefined > 1'")
            && message.contains("Condition will be considered as not verified")));
    assert!(sink.messages_at_least(Level::Error).is_empty());
}

#[tokio::test]
async fn select_falls_back_to_default_branch() {
    let (summary, sink) = run(&SELECT.replace("@MODE@", "staging")).await;
    assert_eq!(summary.published["Picked"], json!(2));
    assert_eq!(summary.verdict, Verdict::Pass);
    assert!(sink.contains("None of the previous conditions are verified (default)"));
    assert!(sink.contains("[1/Case2]"));
}

#[tokio::test]
async fn select_without_default_may_run_nothing() {
    let yaml = SELECT.replace("@MODE@", "staging").replace(
        "        - Evaluate: 'Mode == \"lab\"'\n",
        "        - Evaluate: 'Mode == \"lab\"'\n        - Key: Other\n",
    );
    let (summary, sink) = run(&yaml).await;
    assert!(summary.published.is_empty());
    assert_eq!(summary.verdict, Verdict::NotSet);
    assert!(sink.contains("Conditions not verified for any branch. Nothing executed."));
}

#[tokio::test]
async fn select_rejects_mismatched_condition_count() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.Select
    Order: 1
    Config:
      Conditions:
        - Key: Anything
    Children:
      - Task: Run.Dummy
      - Task: Run.Dummy
      - Task: Run.Dummy
"#)
    .await;

    assert_eq!(summary.verdict, Verdict::Error);
    assert!(sink.contains(
        "Invalid number of conditions (1): Must be the same or one less than child tasks (3)"
    ));
}
