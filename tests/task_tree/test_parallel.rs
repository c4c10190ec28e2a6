use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tasktree::core::config::EngineConfig;
use tasktree::core::error::AppError;
use tasktree::core::task_tree::{
    register_builtins, ExperimentDocument, ExperimentRunner, MemorySink, Params, RunSummary, Task,
    TaskHandler, TaskRegistry, Verdict,
};

struct Exploding;

#[async_trait]
impl TaskHandler for Exploding {
    fn name(&self) -> &'static str {
        "Test.Exploding"
    }

    async fn run(&self, _task: &mut Task) -> Result<(), AppError> {
        panic!("sensor exploded");
    }
}

async fn run(yaml: &str) -> (RunSummary, Arc<MemorySink>) {
    let mut builder = TaskRegistry::builder();
    register_builtins(&mut builder);
    builder.register(Exploding);

    let sink = Arc::new(MemorySink::new());
    let document = ExperimentDocument::from_yaml_str(yaml).unwrap();
    let summary = ExperimentRunner::new(builder.build(), EngineConfig::default())
        .with_sink(sink.clone())
        .run(&document, Params::new())
        .await
        .unwrap();
    (summary, sink)
}

#[tokio::test]
async fn branches_run_concurrently() {
    let started = Instant::now();
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.Parallel
    Order: 1
    Children:
      - Task: Run.Delay
        Config: {Time: 0.3}
      - Task: Run.Delay
        Config: {Time: 0.3}
      - Task: Run.Delay
        Config: {Time: 0.3}
"#)
    .await;

    assert!(started.elapsed() < Duration::from_millis(800));
    assert_eq!(summary.verdict, Verdict::Pass);
    assert!(sink.contains("Starting parallel execution (3 children)"));
    assert!(sink.contains("Branch 3 (Br3) joined with verdict Pass"));
    assert!(sink.contains("Finished execution of all child tasks"));
}

#[tokio::test]
async fn all_branches_join_before_the_next_task() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.Parallel
    Order: 1
    Config:
      PublishVault: true
    Children:
      - Task: Flow.Sequence
        Label: Slow
        Children:
          - Task: Run.Delay
            Config: {Time: 0.2}
          - Task: Run.Publish
            Config: {Done: yes}
      - Task: Run.Dummy
  - Task: Run.Message
    Order: 2
    Config:
      Message: "done=@[Done]"
"#)
    .await;

    assert!(sink.contains("[2] done=yes"));
    assert_eq!(summary.published["Done"], json!("yes"));
}

#[tokio::test]
async fn parallel_verdict_is_the_worst_branch() {
    let (summary, _) = run(r#"
Tasks:
  - Task: Flow.Parallel
    Order: 1
    Children:
      - Task: Run.Dummy
      - Task: Run.Dummy
        Config: {Verdict: Fail}
      - Task: Run.Dummy
        Config: {Verdict: Inconclusive}
"#)
    .await;

    assert_eq!(summary.verdict, Verdict::Fail);
}

#[tokio::test]
async fn branches_do_not_see_each_other_or_leak_by_default() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.Parallel
    Order: 1
    Children:
      - Task: Run.Publish
        Label: Writer
        Config: {Shared: a}
      - Task: Flow.Sequence
        Label: Reader
        Children:
          - Task: Run.Delay
            Config: {Time: 0.1}
          - Task: Run.Message
            Config:
              Message: "seen @[Shared]"
  - Task: Run.Message
    Order: 2
    Config:
      Message: "after @[Shared]"
"#)
    .await;

    assert!(sink.contains("seen @[Shared]"));
    assert!(sink.contains("[2] after @[Shared]"));
    assert!(summary.published.is_empty());
}

#[tokio::test]
async fn published_vaults_merge_in_declaration_order() {
    let (summary, _) = run(r#"
Tasks:
  - Task: Flow.Parallel
    Order: 1
    Config:
      PublishVault: true
    Children:
      - Task: Flow.Sequence
        Children:
          - Task: Run.Delay
            Config: {Time: 0.2}
          - Task: Run.Publish
            Config: {Winner: first, OnlyFirst: 1}
      - Task: Run.Publish
        Config: {Winner: second}
"#)
    .await;

    assert_eq!(summary.published["Winner"], json!("second"));
    assert_eq!(summary.published["OnlyFirst"], json!(1));
}

#[tokio::test]
async fn panicking_branch_becomes_error_without_stopping_siblings() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.Parallel
    Order: 1
    Config:
      PublishVault: true
    Children:
      - Task: Run.Publish
        Config: {Survivor: true}
      - Task: Test.Exploding
"#)
    .await;

    assert_eq!(summary.verdict, Verdict::Error);
    assert_eq!(summary.published["Survivor"], json!(true));
    assert!(sink.contains("Br2 panicked: sensor exploded"));
    assert!(sink.contains("Branch 2 (Br2) joined with verdict Error"));
}

#[tokio::test]
async fn empty_parallel_is_skipped() {
    let (summary, sink) = run(r#"
Tasks:
  - Task: Flow.Parallel
    Order: 1
"#)
    .await;

    assert_eq!(summary.verdict, Verdict::NotSet);
    assert!(sink.contains("Skipping parallel execution: no children defined."));
}
