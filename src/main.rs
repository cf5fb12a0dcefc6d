//! quizserve: HTTPS static file server for the ArUco quiz game.
//!
//! This is the application entry point. It parses the command line, loads
//! configuration, initializes tracing, binds the TLS listener, prints the
//! connection banner and serves until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizserve::banner::{Banner, SHUTDOWN_MESSAGE};
use quizserve::config::{LoggingConfig, Overrides, DEFAULT_LOG_FILTER};
use quizserve::http::{redirect, shutdown, HttpsServer};
use quizserve::{create_router, net, AppConfig, StartupError};

/// quizserve: serve the current directory over HTTPS on the LAN
#[derive(Parser, Debug)]
#[command(name = "quizserve", version, about)]
struct Args {
    /// Path to configuration file (default: ./quizserve.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// HTTPS port
    #[arg(short, long)]
    port: Option<u16>,

    /// Certificate chain (PEM)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Private key (PEM)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Directory to serve
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Disable directory listings
    #[arg(long)]
    no_listing: bool,

    /// Log level filter (e.g., "quizserve=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            cert_path: self.cert.clone(),
            key_path: self.key.clone(),
            root: self.root.clone(),
            no_listing: self.no_listing,
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig, StartupError> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    config.apply_overrides(args.overrides());
    config.validate()?;
    Ok(config)
}

fn init_tracing(log_level: Option<String>, logging: &LoggingConfig) {
    // Priority: CLI > env > default
    let log_filter = log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let (text, json) = if logging.format == "json" {
        (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(text)
        .with(json)
        .init();
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    let app = create_router(&config);
    let server = HttpsServer::bind(&config, app).await?;
    let addr = server.local_addr();

    let lan_ip = net::discover_local_ip();
    tracing::info!(%addr, %lan_ip, root = %config.files.root.display(), "HTTPS server ready");

    let handle = server.handle();
    shutdown::setup_shutdown_handler(handle.clone());

    println!("{}", Banner::new(addr.port(), lan_ip));

    if config.tls.redirect_http {
        let redirect_addr = std::net::SocketAddr::new(addr.ip(), config.tls.redirect_port);
        redirect::spawn_redirect_server(redirect_addr, addr.port(), handle);
    }

    server.serve().await?;

    println!("{SHUTDOWN_MESSAGE}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            // Tracing is configured from the file that just failed to load
            eprintln!("error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    init_tracing(args.log_level, &config.logging);
    tracing::info!(
        host = %config.http.host,
        port = config.http.port,
        cert = %config.tls.cert_path.display(),
        key = %config.tls.key_path.display(),
        "Loaded configuration"
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "Server failed to start");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
