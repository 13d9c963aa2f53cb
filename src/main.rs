use colored::*;
use fixture_runner::{cli, models::ORCHESTRATOR_ERROR_EXIT_CODE};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(ORCHESTRATOR_ERROR_EXIT_CODE)
        }
    }
}
