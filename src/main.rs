// src/main.rs

//! The main entry point for the Restatic server binary.
//!
//! The binary registers a small demo site (a home page and a blog page
//! class) and serves it through the ISR pipeline. Embedders use the
//! library crate directly and register their own callbacks.

use anyhow::Result;
use restatic::config::Config;
use restatic::core::generator::callback_from_fn;
use restatic::core::state::AppState;
use restatic::server;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("Restatic version {VERSION}");
        return Ok(());
    }

    // Determine the configuration path. It can be provided via a
    // --config flag; otherwise, it defaults to "config.toml" when that
    // file exists, or the built-in defaults when it does not.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let mut config = match config_path {
        Some(path) => match Config::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e:#}");
                std::process::exit(1);
            }
        },
        None if std::path::Path::new("config.toml").exists() => {
            match Config::from_file("config.toml") {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("Failed to load configuration from \"config.toml\": {e:#}");
                    std::process::exit(1);
                }
            }
        }
        None => Config::default(),
    };

    // Override port if provided as a command-line argument.
    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    let state = AppState::initialize(config)?;
    register_demo_pages(&state)?;

    if let Err(e) = server::run(state).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }
    Ok(())
}

/// Registers the demo site: `/` and `/blog/*`.
fn register_demo_pages(state: &std::sync::Arc<AppState>) -> Result<()> {
    let route = |pattern: &str| -> HashMap<String, Value> {
        HashMap::from([("route".to_string(), json!(pattern))])
    };

    state.registry.register(
        "demo.home",
        callback_from_fn(|_params| async {
            Ok("<!DOCTYPE html><html><body><h1>Restatic</h1>\
                <p>Incremental static regeneration demo.</p></body></html>"
                .to_string())
        }),
        Some(route("/")),
    )?;

    state.registry.register(
        "demo.blog",
        callback_from_fn(|params| async move {
            let url = params
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or("/blog/unknown")
                .to_string();
            Ok(format!(
                "<!DOCTYPE html><html><body><h1>Blog</h1><p>Rendered {url} at epoch {}.</p></body></html>",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0)
            ))
        }),
        Some(route("/blog/*")),
    )?;

    Ok(())
}
