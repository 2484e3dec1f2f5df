//! junction - a path-routed HTTP reverse-proxy load balancer
//!
//! Usage:
//!     junction --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

use junction::config::watcher::ConfigWatcher;
use junction::config::{load_config, Config};
use junction::metrics::Metrics;
use junction::reload::{apply_config, Generation};
use junction::server::Server;
use junction::state::AppState;
use junction::util::{init_logging, LogFormat};

/// A path-routed HTTP reverse-proxy load balancer.
#[derive(Parser, Debug)]
#[command(name = "junction")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (falls back to $CONFIG_PATH, then ./config.yml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (falls back to $PORT, then 8080)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format);

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            config_path.display()
        )
    })?;

    if cli.validate {
        println!("Configuration is valid.");
        println!("  Services: {}", config.services.len());
        for service in &config.services {
            println!(
                "    - {} {} -> {} backend(s) [{}]",
                service.name,
                service.endpoint,
                service.urls.len(),
                service.algorithm.as_str()
            );
        }
        return Ok(());
    }

    let port = cli
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(8080);

    info!(
        config_path = %config_path.display(),
        services = config.services.len(),
        port,
        "junction starting"
    );
    for service in &config.services {
        info!(
            name = %service.name,
            endpoint = %service.endpoint,
            backends = service.urls.len(),
            algorithm = service.algorithm.as_str(),
            "configured service"
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run_async(config, config_path, port))
}

fn default_config_path() -> PathBuf {
    std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./config.yml"))
}

async fn run_async(config: Config, config_path: PathBuf, port: u16) -> Result<()> {
    let state = AppState::new(Generation::build(&config), Metrics::new());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = Server::bind(addr, state.clone())
        .await
        .with_context(|| format!("failed to bind listener on {}", addr))?;

    // Hot reload on config-file change or SIGHUP.
    let reload_state = state.clone();
    let watcher = ConfigWatcher::new(
        config_path,
        Box::new(move |new_config| apply_config(&reload_state, new_config)),
    );
    tokio::spawn(watcher.run(state.shutdown().subscribe()));

    let server_handle = tokio::spawn(server.run());

    wait_for_signal().await;

    info!("shutting down");
    state.trigger_shutdown();
    let _ = server_handle.await;

    info!("junction stopped gracefully");
    Ok(())
}

/// Block until SIGINT or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    error!(error = %e, "failed to setup SIGTERM handler");
                    None
                }
            };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for shutdown signal");
                }
                info!("received interrupt");
            }
            _ = async {
                match sigterm.as_mut() {
                    Some(sig) => { sig.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("received interrupt");
    }
}
