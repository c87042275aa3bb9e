use azure_vnet_peering::cli::Args;
use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Do as little as possible in main.rs as it can't contain any tests
    dotenv::dotenv().ok();
    let args = Args::parse();

    match azure_vnet_peering::run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{e}");
            eprintln!("{} {e}", "Error:".red());
            ExitCode::from(1)
        }
    }
}
