//! notebook-proxy: HTTP backend for the financial dashboard.
//!
//! Runs the notebook MCP server as a child process and exposes it over HTTP,
//! or writes static snapshots with `publish`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use notebook_proxy::api::{self, AppState};
use notebook_proxy::config::{self, Config};
use notebook_proxy::mcp::NotebookClient;
use notebook_proxy::publish;

/// HTTP backend that answers dashboard questions through a notebook MCP server.
#[derive(Parser, Debug)]
#[command(name = "notebook-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Write ratio and summary snapshots, then exit
    Publish {
        /// Output directory
        #[arg(long, value_name = "DIR", default_value = "public/data")]
        out: PathBuf,
    },
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

async fn serve(cfg: Config, client: Arc<NotebookClient>) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;

    let app = api::router(AppState::new(client, cfg.data_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn run(args: Args, cfg: Config) -> ExitCode {
    let client = Arc::new(NotebookClient::new(cfg.notebook.clone()));

    let code = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => match serve(cfg, Arc::clone(&client)).await {
            Ok(()) => {
                info!("Server shut down gracefully");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Server error");
                ExitCode::FAILURE
            }
        },
        Command::Publish { out } => {
            match publish::publish(&client, cfg.data_dir.as_deref(), &out).await {
                Ok(outcome) if outcome.is_complete() => {
                    info!(files = outcome.written.len(), out = %out.display(), "Publish complete");
                    ExitCode::SUCCESS
                }
                Ok(outcome) => {
                    error!(
                        files = outcome.written.len(),
                        failures = outcome.failures,
                        "Publish finished with failures"
                    );
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!(error = %e, "Publish failed");
                    ExitCode::FAILURE
                }
            }
        }
    };

    client.shutdown().await;
    code
}

/// Entry point for notebook-proxy.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = %cfg.notebook.command,
        "Starting notebook-proxy"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(args, cfg))
}
