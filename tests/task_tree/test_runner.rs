use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tasktree::core::config::EngineConfig;
use tasktree::core::error::AppError;
use tasktree::core::task_tree::{
    parse_override, ExperimentDocument, ExperimentRunner, FlowState, MemorySink, ParamExpander,
    Params, TaskRegistry, Verdict,
};
use tempfile::NamedTempFile;

fn runner(sink: &Arc<MemorySink>) -> ExperimentRunner {
    ExperimentRunner::new(TaskRegistry::with_builtins(), EngineConfig::default())
        .with_sink(sink.clone())
}

fn document(yaml: &str) -> ExperimentDocument {
    ExperimentDocument::from_yaml_str(yaml).unwrap()
}

#[tokio::test]
async fn first_level_tasks_run_in_order() {
    let sink = Arc::new(MemorySink::new());
    let summary = runner(&sink)
        .run(
            &document(
                r#"
Tasks:
  - Task: Run.Publish
    Order: 2
    Config: {Step: second}
  - Task: Run.Publish
    Order: 1
    Label: Init
    Config: {Step: first, Ready: true}
"#,
            ),
            Params::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.published["Step"], json!("second"));
    assert_eq!(summary.published["Ready"], json!(true));
    let messages: Vec<String> = sink.entries().into_iter().map(|e| e.message).collect();
    let first = messages
        .iter()
        .position(|m| m.starts_with("[1.Init]"))
        .unwrap();
    let second = messages.iter().position(|m| m.starts_with("[2]")).unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn summary_describes_the_run() {
    let sink = Arc::new(MemorySink::new());
    let doc = document(
        r#"
Name: Smoke
Tasks:
  - Task: Run.Dummy
    Order: 1
    Requirements: [Core]
  - Task: Run.Dummy
    Order: 2
    Requirements: [Core, Ran]
    Config: {Verdict: Inconclusive}
"#,
    );
    let summary = runner(&sink).run(&doc, Params::new()).await.unwrap();

    assert_eq!(summary.name.as_deref(), Some("Smoke"));
    assert_eq!(summary.verdict, Verdict::Inconclusive);
    assert_eq!(summary.requirements, vec!["Core", "Ran"]);
    assert_eq!(summary.document_hash, doc.source_hash);
    assert!(summary.completed_at >= summary.started_at);
    assert!(summary.duration_ms() >= 0);
    assert!(sink.contains("Starting experiment Smoke (2 tasks"));
    assert!(sink.contains("Experiment finished with verdict Inconclusive"));

    let rendered = serde_json::to_value(&summary).unwrap();
    assert_eq!(rendered["verdict"], json!("Inconclusive"));
    assert_eq!(rendered["run_id"], json!(summary.run_id.to_string()));
}

#[tokio::test]
async fn unknown_tasks_are_rejected_before_running() {
    let sink = Arc::new(MemorySink::new());
    let err = runner(&sink)
        .run(
            &document(
                r#"
Tasks:
  - Task: Run.Publish
    Order: 1
    Config: {Ran: true}
  - Task: Flow.Sequence
    Order: 2
    Children:
      - Task: Run.Teleport
"#,
            ),
            Params::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, "TT-REG-001");
    assert!(err.message.contains("Run.Teleport"));
    assert!(sink.entries().is_empty());
}

const BROKEN_FIRST_CONDITION: &str = r#"
Parameters:
  Mode: lab
Tasks:
  - Task: Flow.Select
    Order: 1
    Label: Pick
    Config:
      Conditions:
        - Evaluate: "Count >"
        - Key: Mode
    Children:
      - Task: Run.Publish
        Config:
          Picked: "@[Branch]"
      - Task: Run.Publish
        Config:
          Picked: "@[Branch]"
"#;

#[tokio::test]
async fn validate_only_warns_about_broken_expressions() {
    let sink = Arc::new(MemorySink::new());
    let warnings = runner(&sink)
        .validate(&document(BROKEN_FIRST_CONDITION))
        .unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Pick: "));
    assert!(warnings[0].contains("Count >"));
}

#[tokio::test]
async fn broken_expression_does_not_abort_the_run() {
    let sink = Arc::new(MemorySink::new());
    let summary = runner(&sink)
        .run(&document(BROKEN_FIRST_CONDITION), Params::new())
        .await
        .unwrap();

    assert_eq!(summary.published["Picked"], json!(1));
    assert_eq!(summary.verdict, Verdict::Pass);
    assert!(summary.failures.is_empty());
    assert!(sink.contains("Condition will be considered as not verified"));
    assert!(sink.contains("Condition \"'Mode' exists\" verified for branch 1. Executing."));
}

#[tokio::test]
async fn overrides_replace_document_parameters() {
    let sink = Arc::new(MemorySink::new());
    let mut overrides = Params::new();
    for raw in ["Device=ue-7", "Extra=5"] {
        let (key, value) = parse_override(raw).unwrap();
        overrides.insert(key, value);
    }
    runner(&sink)
        .run(
            &document(
                r#"
Parameters:
  Device: ue-1
Tasks:
  - Task: Run.Message
    Order: 1
    Config:
      Message: "device @[Device] extra @[Extra]"
"#,
            ),
            overrides,
        )
        .await
        .unwrap();
    assert!(sink.contains("device ue-7 extra 5"));
}

#[tokio::test]
async fn failing_tasks_do_not_stop_later_ones() {
    let sink = Arc::new(MemorySink::new());
    let summary = runner(&sink)
        .run(
            &document(
                r#"
Tasks:
  - Task: Run.CliExecute
    Order: 1
    Config:
      Parameters: ["/nonexistent/tasktree-binary"]
      CWD: "."
  - Task: Run.Publish
    Order: 2
    Config: {Reached: true}
"#,
            ),
            Params::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.verdict, Verdict::Error);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].starts_with("1: "));
    assert_eq!(summary.published["Reached"], json!(true));
}

struct Stamping;

impl ParamExpander for Stamping {
    fn expand(&self, raw: &Params, _parent: &Params, _flow: &FlowState) -> Result<Params, AppError> {
        let mut expanded = raw.clone();
        expanded.insert("Stamp".to_string(), json!("stamped"));
        Ok(expanded)
    }
}

#[tokio::test]
async fn custom_expanders_replace_the_template_expander() {
    let sink = Arc::new(MemorySink::new());
    let summary = runner(&sink)
        .with_expander(Arc::new(Stamping))
        .run(
            &document("- Task: Run.Publish\n  Order: 1\n  Config: {Kept: \"@[Nothing]\"}\n"),
            Params::new(),
        )
        .await
        .unwrap();
    assert_eq!(summary.published["Stamp"], json!("stamped"));
    assert_eq!(summary.published["Kept"], json!("@[Nothing]"));
}

#[tokio::test]
async fn documents_run_from_files() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"Tasks:\n  - Task: Run.Dummy\n    Order: 1\n")
        .unwrap();
    let sink = Arc::new(MemorySink::new());
    let summary = runner(&sink)
        .run_file(file.path(), Params::new())
        .await
        .unwrap();
    assert_eq!(summary.verdict, Verdict::Pass);
}

#[cfg(unix)]
#[tokio::test]
async fn command_output_is_logged_and_exit_code_sets_verdict() {
    let workdir = tempfile::TempDir::new().unwrap();
    let sink = Arc::new(MemorySink::new());
    let config = EngineConfig {
        default_cwd: Some(workdir.path().to_path_buf()),
        ..EngineConfig::default()
    };
    let summary = ExperimentRunner::new(TaskRegistry::with_builtins(), config)
        .with_sink(sink.clone())
        .run(
            &document(
                r#"
Tasks:
  - Task: Run.CliExecute
    Order: 1
    Label: Echo
    Config:
      Parameters: ["echo hello-tree"]
      CWD: "."
  - Task: Run.CliExecute
    Order: 2
    Config:
      Parameters: ["false"]
      CWD: "."
"#,
            ),
            Params::new(),
        )
        .await
        .unwrap();

    assert!(sink.contains("[1.Echo] [CLI]hello-tree"));
    assert!(sink.contains("'false' exited with code 1"));
    assert_eq!(summary.verdict, Verdict::Fail);
    assert!(summary.failures.is_empty());
}
