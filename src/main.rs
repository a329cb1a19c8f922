use clap::Parser;

use api_rotator::cli::{self, Cli, Command};
use api_rotator::logging::init_tracing;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // One-shot commands print their own output; keep the log quiet for them.
    init_tracing(match cli.command {
        Command::Serve => "info",
        _ => "warn",
    });

    if let Err(e) = cli::run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
