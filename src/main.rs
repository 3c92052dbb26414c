//! planwright CLI: recipe resolution from a YAML manifest.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "planwright",
    version,
    about = "Recipe resolution engine: canonical recipe graphs, shape matching, generational strategy search"
)]
struct Cli {
    #[command(subcommand)]
    command: planwright::cli::Commands,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = planwright::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
