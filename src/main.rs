use clap::{Parser, ValueEnum};
use tracing::{error, info};

use web_fetch_mcp::{
    build_app,
    config::Config,
    logging,
    mcp::server::create_server,
    stdio::run_stdio,
    AppState,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportKind {
    Http,
    Stdio,
}

/// Web Fetch MCP Server
#[derive(Debug, Parser)]
#[command(name = "web-fetch-mcp", version, about)]
struct Cli {
    /// How MCP clients connect to the server
    #[arg(long, value_enum, default_value_t = TransportKind::Http)]
    transport: TransportKind,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    logging::init_logging();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(error = %err, "server failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let client = reqwest::Client::new();

    match cli.transport {
        TransportKind::Stdio => {
            let server = create_server(&config, &config.environment, client);
            run_stdio(server).await?;
        }
        TransportKind::Http => {
            let bind_socket = config.bind_socket()?;
            let strategy = config.strategy.as_str();
            let lifecycle = config.lifecycle;
            let app = build_app(AppState::new(config, client));
            let listener = tokio::net::TcpListener::bind(bind_socket).await?;

            info!(
                bind = %bind_socket,
                strategy,
                lifecycle = ?lifecycle,
                "server starting"
            );

            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}
