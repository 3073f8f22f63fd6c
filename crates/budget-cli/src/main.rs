//! Budget Tool - a terminal client for the budget tracking API.
//!
//! Log in, browse budgets by month, and create budgets and categories.
//! The session credential survives restarts and is dropped as soon as the
//! server rejects it.

mod app;
mod config;
mod router;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use budget_core::{ApiClient, ApiHooks};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use config::{Config, API_BASE_URL_ENV};
use router::Router;

/// Command line flags
#[derive(Debug, Default)]
struct Flags {
    demo: bool,
    logout: bool,
    verbose: bool,
}

impl Flags {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut flags = Flags::default();
        for arg in args {
            match arg.as_str() {
                "--demo" => flags.demo = true,
                "--logout" => flags.logout = true,
                "-v" | "--verbose" => flags.verbose = true,
                other => anyhow::bail!("Unknown argument: {} (expected --demo, --logout, --verbose)", other),
            }
        }
        Ok(flags)
    }
}

/// Initialize the tracing subscriber for logging.
/// Logs go to a daily file so they don't interleave with page output.
fn init_tracing(verbose: bool) -> Result<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = Config::log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "budget.log"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(verbose.then(|| fmt::layer().with_writer(io::stderr)))
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let flags = Flags::parse(std::env::args().skip(1))?;
    let _log_guard = init_tracing(flags.verbose)?;
    info!("Budget tool starting");

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    config.apply_api_override(std::env::var(API_BASE_URL_ENV).ok());

    let session = Arc::new(config.session_store(Config::data_dir()?));
    let hooks = Arc::new(ApiHooks::for_session(Arc::clone(&session)));
    let api = ApiClient::new(config.api_base_url.clone(), hooks)?;
    let router = Arc::new(Router::new());

    // Subscribe before init starts so the ready transition can't be missed
    let mut app = App::new(config, Arc::clone(&session), api, router);

    // Keychain and file reads can block; pages wait on the gate meanwhile
    let init = tokio::task::spawn_blocking({
        let session = Arc::clone(&session);
        move || session.init()
    });

    if flags.logout {
        init.await.context("Session initialization panicked")?;
        session.logout();
        println!("Logged out.");
        return Ok(());
    }

    if flags.demo {
        init.await.context("Session initialization panicked")?;
        app.login_demo().await.context("Demo login failed")?;
    }

    let result = app.run().await;

    if let Err(ref e) = result {
        eprintln!("Error: {}", e);
    }

    info!("Budget tool shutting down");
    result
}
