//! Binary entry point.
//!
//! Loads configuration, applies command-line overrides, wires the stores
//! and the server together, then runs until Ctrl+C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use marquee::config::{load_config, AppConfig};
use marquee::data::{pg, Stores};
use marquee::http::ApiServer;
use marquee::lifecycle::Shutdown;
use marquee::mail::LogMailer;
use marquee::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "marquee", version, about = "JSON API for the movie catalogue")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the server bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the operating environment (development|staging|production).
    #[arg(long)]
    env: Option<String>,

    /// Override the Postgres DSN.
    #[arg(long)]
    db_dsn: Option<String>,

    /// Override the sustained per-client request rate.
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Override the per-client burst capacity.
    #[arg(long)]
    limiter_burst: Option<u32>,

    /// Enable or disable the rate limiter.
    #[arg(long)]
    limiter_enabled: Option<bool>,

    /// Origins trusted for cross-origin requests (comma separated).
    #[arg(long, value_delimiter = ',')]
    cors_trusted_origins: Vec<String>,

    /// Override the SMTP host.
    #[arg(long)]
    smtp_host: Option<String>,

    /// Override the SMTP port.
    #[arg(long)]
    smtp_port: Option<u16>,

    /// Override the SMTP sender line.
    #[arg(long)]
    smtp_sender: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(env) = &self.env {
            config.server.env = env.clone();
        }
        if let Some(dsn) = &self.db_dsn {
            config.db.dsn = dsn.clone();
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if !self.cors_trusted_origins.is_empty() {
            config.cors.trusted_origins = self.cors_trusted_origins.clone();
        }
        if let Some(host) = &self.smtp_host {
            config.smtp.host = host.clone();
        }
        if let Some(port) = self.smtp_port {
            config.smtp.port = port;
        }
        if let Some(sender) = &self.smtp_sender {
            config.smtp.sender = sender.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(&config.observability.log_level);
    tracing::info!(
        env = %config.server.env,
        version = env!("CARGO_PKG_VERSION"),
        "Starting marquee"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let pool = pg::connect(&config.db).await?;
    tracing::info!("Database connection pool established");
    let stores = Stores::postgres(pool);

    let mailer = Arc::new(LogMailer);

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    ApiServer::new(config, stores, mailer)
        .run(listener, shutdown.subscribe())
        .await?;

    Ok(())
}
