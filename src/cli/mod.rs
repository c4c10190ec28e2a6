pub mod args;
pub mod commands;

pub use args::{RunArgs, ValidateArgs};
use clap::{Parser, Subcommand};

/// Process exit code for a run whose verdict is at most `Inconclusive`.
pub const EXIT_OK: i32 = 0;
/// Process exit code for a `Fail`/`Error` verdict or a failed task.
pub const EXIT_FAILED: i32 = 1;
/// Process exit code for definition or configuration errors.
pub const EXIT_INVALID: i32 = 2;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
EXPERIMENT COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "tasktree")]
#[command(version = crate::VERSION)]
#[command(about = "Run declarative task-tree experiments")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: validate an experiment document, then run it and inspect the verdict."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Run an experiment document",
        long_about = "Run loads the document, runs its first-level tasks in Order and reports the aggregated verdict. Exit code is 0 for Pass/Inconclusive, 1 for Fail/Error and 2 for invalid input.",
        after_help = "Example:\n    tasktree run experiment.yaml --param Device=ue-1 --json"
    )]
    Run(RunArgs),
    #[command(
        about = "Check an experiment document without running it",
        long_about = "Validate parses the document, checks that every task name is registered and that literal expressions compile.",
        after_help = "Example:\n    tasktree validate experiment.yaml"
    )]
    Validate(ValidateArgs),
}

/// Dispatch a parsed command and return the process exit code.
pub async fn run(args: Args) -> crate::Result<i32> {
    match args.command {
        Command::Run(run_args) => commands::run(run_args).await,
        Command::Validate(validate_args) => commands::validate(validate_args).await,
    }
}
