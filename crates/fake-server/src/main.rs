//! Fake Server - programmable HTTP stub server
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:3012 with an empty rule store
//! fake-server
//!
//! # Preload every *.json route file in a directory
//! fake-server --config-dir ./routes
//!
//! # Require routes to match the whole request path
//! fake-server --route-matching anchored
//! ```

use clap::Parser;
use fake_server::rule::{preload, RouteMatching, RuleStore};
use fake_server::{FakeServer, ServerConfig};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fake-server")]
#[command(author, version, about = "Programmable HTTP stub server")]
struct Args {
    /// Port to listen on [default: 3012]
    #[arg(short, long, env = "FAKE_SERVER_PORT")]
    port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long, env = "FAKE_SERVER_HOST")]
    host: Option<IpAddr>,

    /// Directory of *.json route files loaded at startup
    #[arg(short = 'd', long, env = "FAKE_SERVER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// YAML server configuration file
    #[arg(short, long, env = "FAKE_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Route matching mode: substring or anchored [default: substring]
    #[arg(long, env = "FAKE_SERVER_ROUTE_MATCHING")]
    route_matching: Option<RouteMatching>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info", env = "FAKE_SERVER_LOG_LEVEL")]
    log_level: String,
}

impl Args {
    /// Load the config file, if any, and apply command line overrides.
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match self.config {
            Some(ref path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(ref dir) = self.config_dir {
            config.config_dir = Some(dir.clone());
        }
        if let Some(mode) = self.route_matching {
            config.route_matching = mode;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = args.server_config()?;
    info!(
        "Starting fake server (route matching: {})",
        config.route_matching
    );

    let store = Arc::new(RuleStore::with_route_matching(config.route_matching));

    if let Some(ref dir) = config.config_dir {
        match preload(&store, dir) {
            Ok(loaded) => info!("Preloaded {} rules from {}", loaded.len(), dir.display()),
            Err(e) => {
                error!("Failed to preload routes: {}", e);
                return Err(e.into());
            }
        }
    }

    let server = FakeServer::bind(config.listen_addr(), store).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
