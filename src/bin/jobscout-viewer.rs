use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use jobscout::viewer::ViewerState;

#[derive(Debug, Parser)]
#[command(author, version, about = "Serve scored job recommendations")]
struct ViewerArgs {
    #[arg(long, default_value = "127.0.0.1:5000")]
    addr: SocketAddr,

    /// Recommendations file written by `jobscout score`.
    #[arg(long, default_value = jobscout::cli::DEFAULT_RECOMMENDATIONS_PATH)]
    recommendations: PathBuf,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    jobscout::cli::load_dotenv()?;
    let _log_guard = jobscout::logging::init()?;

    let args = ViewerArgs::parse();
    tracing::info!(?args, "starting jobscout-viewer");

    jobscout::viewer::serve(args.addr, ViewerState::new(args.recommendations)).await
}
