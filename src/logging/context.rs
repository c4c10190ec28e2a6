use crate::cli::Command;
use std::env;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Interactive use from a terminal.
    LocalDev,
    /// Machine-readable output on stdout; the console stays quiet unless
    /// configured otherwise.
    Batch,
}

/// Derive the active execution context from a parsed CLI command plus overrides.
pub fn detect_context(command: &Command) -> ExecutionContext {
    if batch_override_enabled() {
        return ExecutionContext::Batch;
    }

    match command {
        Command::Run(args) if args.json => ExecutionContext::Batch,
        Command::Run(_) | Command::Validate(_) => ExecutionContext::LocalDev,
    }
}

fn batch_override_enabled() -> bool {
    env::var("TASKTREE_BATCH")
        .map(|value| value.trim() == "1")
        .unwrap_or(false)
}
