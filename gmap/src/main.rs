mod api;
mod cli;
mod config;
mod entity;
mod error;
mod gviz;
mod pages;
mod rate;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use cli::CliArgs;
use config::GmapConfig;
use std::sync::Arc;
use store::{BandwidthStore, StoreSettings};
use tracing::{error, info};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration
    let mut cfg = GmapConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    // Override with command line arguments
    if let Some(listen_addr) = args.listen_addr {
        cfg.listen_addr = listen_addr;
    }
    if let Some(database_path) = args.database_path {
        cfg.database_path = database_path;
    }
    if let Some(json_dir) = args.json_dir {
        cfg.json_dir = json_dir;
    }
    if let Some(secs) = args.link_alive_interval_secs {
        cfg.link_alive_interval_secs = secs;
    }
    if let Some(log_level) = args.log_level {
        cfg.log_level = log_level;
    }
    if let Some(log_dir) = args.log_dir {
        cfg.log_dir = Some(log_dir);
    }

    // Initialize tracing once configuration is available
    let _log_guard = common::init_tracing(cfg.log_dir.as_deref(), &cfg.log_file, &cfg.log_level);

    info!("Starting gmap with configuration: {:?}", cfg);

    // Open the report store
    let settings = StoreSettings {
        link_alive_interval: cfg.link_alive_interval()?,
        traffic_max_values: cfg.traffic_max_values,
    };
    let store = BandwidthStore::connect(&cfg.database_path, settings)
        .await
        .with_context(|| format!("Failed to open database {}", cfg.database_path))?;

    // Start HTTP server
    let state = api::AppState::new(Arc::new(cfg), Arc::new(store))?;
    let server = tokio::spawn(api::serve(state));

    // Wait for the server or ctrl-c
    tokio::select! {
        result = server => {
            match result {
                Ok(Ok(())) => info!("HTTP server stopped"),
                Ok(Err(e)) => error!("HTTP server error: {}", e),
                Err(e) => error!("HTTP server task failed: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down gmap");
    Ok(())
}
