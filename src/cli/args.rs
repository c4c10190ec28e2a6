use clap::Args;
use std::path::PathBuf;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Experiment document (YAML)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Override or add a global parameter (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Workspace holding tasktree.toml and .tasktree/ (defaults to current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Experiment document (YAML)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Workspace holding tasktree.toml and .tasktree/ (defaults to current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}
