use beach_tunnel::telemetry::logging;
use beach_tunnel::terminal::{app, cli::Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = logging::init(&cli.log_config()) {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }

    if let Err(err) = app::run(cli).await {
        eprintln!("\n❌ {err}");
        std::process::exit(1);
    }
}
