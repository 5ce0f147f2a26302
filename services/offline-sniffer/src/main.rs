use std::sync::Arc;

use clap::Parser;
use dbwire_bus::{Bus, BusBuilder};
use dbwire_codec::BsonDocumentDecoder;
use dbwire_correlate::Correlator;
use dbwire_log_listener::LogListener;
use offline_sniffer::cli::Cli;
use offline_sniffer::config::load_config;
use offline_sniffer::driver::Driver;
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "offline-sniffer starting");

    let cli = Cli::parse();
    let config = match load_config(&cli.config, cli.interface, cli.file, cli.port) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let log_listener = Arc::new(LogListener::new());
    let correlator = Arc::new(Correlator::new(log_listener.clone()));
    let bus: Arc<Bus<bson::Document>> = Arc::new(
        BusBuilder::new()
            .register(log_listener)
            .register(correlator.clone())
            .build(),
    );

    let mut driver = Driver::new(bus, BsonDocumentDecoder);
    let result = driver.run(&config);

    // The correlator is per-driver-run: whatever is still pending when the
    // capture ends (EOF on a file, or a capture error) never gets a reply,
    // so it is drained as unmatched rather than silently discarded.
    correlator.discard_pending();

    match result {
        Ok(()) => {
            info!("capture ended");
        }
        Err(e) => {
            error!(error = %e, "capture source failed");
            std::process::exit(1);
        }
    }
}
