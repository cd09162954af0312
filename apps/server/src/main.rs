#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::path::PathBuf;

use actix_web::{App, HttpServer, middleware, web};
use clap::Parser;
use tracing::{debug, info, warn};
use urlwatch_service::config::Backend;
use urlwatch_service::{Config, Orchestrator};

mod error;
mod routes;

use error::AppError;

/// URL monitor registry and check scheduler
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML config file, created with defaults if missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep monitors in memory instead of the configured store
    #[arg(long)]
    memory: bool,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_config(cli.config.as_deref())?;
    if cli.memory {
        config.storage.backend = Backend::Memory;
    }

    if cli.print_config {
        println!("{config}");
        return Ok(());
    }

    logger::init_with_level(&config.logging.level);
    debug!("{config}");

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    run_server(addr, &config).await
}

async fn run_server(addr: SocketAddr, config: &Config) -> Result<(), AppError> {
    let orchestrator = Orchestrator::new(config).await?;
    let service = web::Data::new(orchestrator.service());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(service.clone())
            .configure(routes::routes)
    })
    .bind(addr)?
    .disable_signals()
    .shutdown_timeout(config.scheduler.shutdown_grace_seconds)
    .run();

    let (_, scheduler) = orchestrator.start();
    info!(%addr, backend = %config.storage.backend, "Listening");

    let server_handle = server.handle();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down");
        server_handle.stop(true).await;
    });

    let served = server.await;
    scheduler.shutdown().await;
    served?;

    Ok(())
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
