use serde_json::json;
use std::io::Write;
use tasktree::core::task_tree::{ExperimentDocument, TaskDefinition};
use tempfile::NamedTempFile;

const DOCUMENT: &str = r#"
Name: Attach and ping
Parameters:
  Device: ue-1
  Attempts: 2
Tasks:
  - Task: Run.Message
    Order: 20
    Label: Report
    Config:
      Message: "done"
  - Task: Flow.Sequence
    Order: 10
    Label: Setup
    Requirements: [Core, Ran]
    Children:
      - Task: Run.Dummy
      - Task: Flow.Repeat
        Label: Retry
        Config:
          Times: "@[Attempts]"
        Children:
          - Task: Run.Delay
            Config:
              Time: 0
  - Task: Run.Dummy
    Order: 15
    Requirements: [Core]
"#;

#[test]
fn document_fields_are_parsed() {
    let document = ExperimentDocument::from_yaml_str(DOCUMENT).unwrap();
    assert_eq!(document.name.as_deref(), Some("Attach and ping"));
    assert_eq!(document.parameters["Device"], json!("ue-1"));
    assert_eq!(document.tasks.len(), 3);

    let setup = &document.tasks[1];
    assert_eq!(setup.task_name, "Flow.Sequence");
    assert_eq!(setup.order, Some(10));
    assert_eq!(setup.label.as_deref(), Some("Setup"));
    assert_eq!(setup.requirements, vec!["Core", "Ran"]);
    assert_eq!(setup.children.len(), 2);

    let retry = &setup.children[1];
    assert_eq!(retry.order, Some(2));
    assert_eq!(retry.config["Times"], json!("@[Attempts]"));
    assert_eq!(retry.children[0].task_name, "Run.Delay");
}

#[test]
fn tasks_are_ordered_and_requirements_merged() {
    let document = ExperimentDocument::from_yaml_str(DOCUMENT).unwrap();
    let orders: Vec<i64> = document
        .ordered_tasks()
        .iter()
        .filter_map(|task| task.order)
        .collect();
    assert_eq!(orders, vec![10, 15, 20]);
    assert_eq!(document.requirements(), vec!["Core", "Ran"]);
}

#[test]
fn source_hash_tracks_document_text() {
    let first = ExperimentDocument::from_yaml_str(DOCUMENT).unwrap();
    let again = ExperimentDocument::from_yaml_str(DOCUMENT).unwrap();
    let changed = ExperimentDocument::from_yaml_str(&DOCUMENT.replace("ue-1", "ue-2")).unwrap();
    assert_eq!(first.source_hash.len(), 64);
    assert_eq!(first.source_hash, again.source_hash);
    assert_ne!(first.source_hash, changed.source_hash);
}

#[test]
fn bare_task_list_is_accepted() {
    let document = ExperimentDocument::from_yaml_str(
        "- Task: Run.Dummy\n  Order: 1\n- Task: Run.Dummy\n  Order: 2\n",
    )
    .unwrap();
    assert!(document.name.is_none());
    assert!(document.parameters.is_empty());
    assert_eq!(document.tasks.len(), 2);
}

#[test]
fn missing_fields_report_codes() {
    let no_task = TaskDefinition::from_mapping(&json!({"Order": 1}), true).unwrap_err();
    assert_eq!(no_task.code, "TT-DEF-002");

    let no_order = TaskDefinition::from_mapping(&json!({"Task": "Run.Dummy"}), true).unwrap_err();
    assert_eq!(no_order.code, "TT-DEF-003");

    let child_order = TaskDefinition::from_mapping(
        &json!({"Task": "Flow.Sequence", "Order": 1, "Children": [{"Task": "Run.Dummy", "Order": 3}]}),
        true,
    )
    .unwrap_err();
    assert_eq!(child_order.code, "TT-DEF-006");
    assert_eq!(
        child_order.context.get("cause").map(String::as_str),
        Some("TT-DEF-004")
    );
    assert!(child_order
        .message
        .starts_with("Incorrect definition of child task 1"));
}

#[test]
fn requirements_on_children_are_rejected() {
    let err = TaskDefinition::from_mapping(
        &json!({"Task": "Flow.Sequence", "Order": 1, "Children": [
            {"Task": "Run.Dummy"},
            {"Task": "Run.Dummy", "Requirements": ["Core"]}
        ]}),
        true,
    )
    .unwrap_err();
    assert_eq!(err.context.get("cause").map(String::as_str), Some("TT-DEF-005"));
    assert!(err.message.contains("child task 2"));
}

#[test]
fn task_errors_name_their_position() {
    let err = ExperimentDocument::from_yaml_str(
        "Tasks:\n  - Task: Run.Dummy\n    Order: 1\n  - Order: 2\n",
    )
    .unwrap_err();
    assert_eq!(err.code, "TT-DEF-002");
    assert!(err.message.starts_with("Incorrect definition of task 2"));
    assert_eq!(err.context.get("position").map(String::as_str), Some("2"));
}

#[test]
fn broken_yaml_and_missing_files_are_reported() {
    let err = ExperimentDocument::from_yaml_str("Tasks: [unclosed").unwrap_err();
    assert_eq!(err.code, "TT-DEF-007");

    let err = ExperimentDocument::load_from_file(std::path::Path::new("/nonexistent/exp.yaml"))
        .unwrap_err();
    assert_eq!(err.code, "TT-DEF-007");
    assert!(err.context.contains_key("path"));
}

#[test]
fn documents_load_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(DOCUMENT.as_bytes()).unwrap();
    let document = ExperimentDocument::load_from_file(file.path()).unwrap();
    assert_eq!(document.tasks.len(), 3);
}
