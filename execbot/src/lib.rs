use std::env;

use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod event;
pub mod ghevent;
pub mod github;
pub mod handler;
pub mod piston;
pub mod trigger;
pub mod webhook;

#[cfg(test)]
pub mod test_helpers;

pub fn setup_log() {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_json = env::var("RUST_LOG_JSON").map_or(false, |s| s == "1");

    if log_json {
        let json_layer = tracing_subscriber::fmt::layer().json();
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(json_layer)
            .init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer();
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }

    info!("Logging configured");
}
