use crate::cli::args::{RunArgs, ValidateArgs};
use crate::cli::{EXIT_FAILED, EXIT_OK};
use crate::core::config::ConfigLoader;
use crate::core::task_tree::{
    parse_override, ExperimentDocument, ExperimentRunner, Params, RunSummary, TaskRegistry,
};
use crate::Result;
use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};

fn workspace_root(explicit: &Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.clone()),
        None => env::current_dir().context("failed to resolve current directory"),
    }
}

fn load_document(path: &Path) -> Result<ExperimentDocument> {
    Ok(ExperimentDocument::load_from_file(path)?)
}

pub async fn run(args: RunArgs) -> Result<i32> {
    let workspace = workspace_root(&args.workspace)?;
    let config = ConfigLoader::load_from_workspace(&workspace)?;

    let mut overrides = Params::new();
    for raw in &args.params {
        let (key, value) = parse_override(raw)?;
        overrides.insert(key, value);
    }

    let document = load_document(&args.file)?;
    tracing::info!(
        file = %args.file.display(),
        tasks = document.tasks.len(),
        "loaded experiment document"
    );

    let runner = ExperimentRunner::new(TaskRegistry::with_builtins(), config);
    let summary = runner.run(&document, overrides).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to serialize run summary")?
        );
    } else {
        print_summary(&summary);
    }

    if summary.verdict.is_failure() || !summary.failures.is_empty() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_OK)
    }
}

pub async fn validate(args: ValidateArgs) -> Result<i32> {
    let workspace = workspace_root(&args.workspace)?;
    let config = ConfigLoader::load_from_workspace(&workspace)?;
    let document = load_document(&args.file)?;
    let runner = ExperimentRunner::new(TaskRegistry::with_builtins(), config);
    let warnings = runner.validate(&document)?;
    for warning in &warnings {
        tracing::warn!(file = %args.file.display(), "{}", warning);
        eprintln!("warning: {}", warning);
    }
    println!(
        "{} is valid: {} first-level task(s)",
        args.file.display(),
        document.tasks.len()
    );
    Ok(EXIT_OK)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Experiment: {}",
        summary.name.as_deref().unwrap_or("<unnamed>")
    );
    println!("Run: {}", summary.run_id);
    println!("Verdict: {}", summary.verdict);
    println!("Duration: {} ms", summary.duration_ms());
    if !summary.requirements.is_empty() {
        println!("Requirements: {}", summary.requirements.join(", "));
    }
    if !summary.published.is_empty() {
        println!("Published:");
        for (key, value) in &summary.published {
            println!("  {} = {}", key, value);
        }
    }
    if !summary.failures.is_empty() {
        println!("Failures:");
        for failure in &summary.failures {
            println!("  - {}", failure);
        }
    }
}
