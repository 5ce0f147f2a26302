use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dbwire_bus::{Bus, BusBuilder};
use dbwire_correlate::Correlator;
use dbwire_log_listener::LogListener;
use inline_proxy::cli::Cli;
use inline_proxy::config::{load_config, ProxyConfig};
use inline_proxy::session::Session;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "inline-proxy starting");

    let cli = Cli::parse();
    let config = match load_config(&cli.config) {
        Ok(config) => apply_overrides(config, &cli),
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %config.bind, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(bind = %config.bind, upstream = %config.upstream, "listening");

    let log_listener = Arc::new(LogListener::new());
    let bus: Arc<Bus<bson::Document>> = Arc::new(
        BusBuilder::new()
            .register(log_listener.clone())
            .register(Arc::new(Correlator::new(log_listener)))
            .build(),
    );

    let idle_timeout = config.idle_timeout_secs.map(Duration::from_secs);

    loop {
        let (client, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let upstream_addr = config.upstream.clone();
        let bus = bus.clone();
        tokio::spawn(async move {
            match TcpStream::connect(&upstream_addr).await {
                Ok(upstream) => match Session::new(client, upstream, bus, idle_timeout) {
                    Ok(session) => session.run().await,
                    Err(e) => warn!(client = %peer, error = %e, "failed to start session"),
                },
                Err(e) => warn!(client = %peer, upstream = %upstream_addr, error = %e, "upstream connect failed"),
            }
        });
    }
}

fn apply_overrides(config: ProxyConfig, cli: &Cli) -> ProxyConfig {
    ProxyConfig {
        bind: cli.bind.clone().unwrap_or(config.bind),
        upstream: cli.upstream.clone().unwrap_or(config.upstream),
        idle_timeout_secs: config.idle_timeout_secs,
    }
}
