//! winvm-e2e - run a Go test binary on a disposable Windows VM

use clap::Parser;
use tracing_subscriber::EnvFilter;
use winvm_e2e::cli::Cli;
use winvm_e2e::domain::{ConfigError, HarnessError};
use winvm_e2e::output::OutputContext;
use winvm_e2e::output::json::format_error;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let flags = cli.output_flags();
    if let Err(e) = cli.run().await {
        let code = error_code(&e);
        if flags.json {
            match format_error(&format!("{e:#}"), code) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("Error: {e:#}"),
            }
        } else {
            OutputContext::new(flags.no_color, false).error(&format!("Error: {e:#}"));
        }
        std::process::exit(1);
    }
}

fn error_code(e: &anyhow::Error) -> &'static str {
    if let Some(harness) = e.downcast_ref::<HarnessError>() {
        return harness.kind();
    }
    if e.downcast_ref::<ConfigError>().is_some() {
        return "config";
    }
    "error"
}
