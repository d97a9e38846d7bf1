use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    jobscout::cli::load_dotenv()?;
    let _log_guard = jobscout::logging::init().context("init logging")?;

    let cli = jobscout::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        jobscout::cli::Command::Scrape(args) => {
            tokio::task::block_in_place(|| jobscout::scrape::run(args)).context("scrape")?;
        }
        jobscout::cli::Command::Score(args) => {
            jobscout::score::run(args).await.context("score")?;
        }
    }

    Ok(())
}
