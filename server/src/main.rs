use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tidepool_core::{CommandExecutor, Transcript};
use tidepool_server::config::{Cli, ServerConfig};
use tidepool_server::console;
use tidepool_server::dispatch::{DispatchConfig, Dispatcher};
use tidepool_server::handlers::{build_router, AppState};
use tidepool_server::shell::BuiltinShell;
use tokio::signal;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::try_from(cli)?;
    info!(
        listen_addr = %config.listen_addr,
        command_timeout_secs = config.command_timeout.as_secs(),
        queue_depth = config.queue_depth,
        headless = config.headless,
        "starting tidepool server"
    );

    // The one transcript for the whole process: constructed empty here,
    // shared by reference with everything that reads or appends.
    let transcript = Arc::new(Transcript::new());
    let executor: Arc<dyn CommandExecutor> = Arc::new(BuiltinShell::new());
    let (dispatcher, _worker) = Dispatcher::spawn(
        Arc::clone(&transcript),
        executor,
        DispatchConfig {
            queue_depth: config.queue_depth,
            soft_timeout: config.command_timeout,
        },
    );

    let app = build_router(AppState {
        transcript: Arc::clone(&transcript),
        dispatcher: dispatcher.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    info!("tidepool listening on {}", config.listen_addr);

    let console_exit = Arc::new(Notify::new());
    if !config.headless {
        tokio::spawn(console::run(
            Arc::clone(&transcript),
            dispatcher.clone(),
            Arc::clone(&console_exit),
        ));
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(console_exit))
        .await
        .context("server shutdown with error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(console_exit: Arc<Notify>) {
    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = console_exit.notified() => {}
    }
}
