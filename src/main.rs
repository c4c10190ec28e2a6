use clap::Parser;
use tasktree::cli::{self, Args, EXIT_INVALID};
use tasktree::logging;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let guard = match logging::init(&args.command) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("warning: logging disabled: {:#}", err);
            None
        }
    };

    let code = match cli::run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            EXIT_INVALID
        }
    };

    drop(guard);
    std::process::exit(code);
}
