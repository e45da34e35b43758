mod access;
mod backend;
mod clock;
mod config;
mod error;
mod handlers;
mod invites;
mod metrics;
mod rate_limit;
mod server;
mod trips;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tripmate_storage::{InviteId, StoreError, TripId};

use config::ServerConfig;
use server::TripServer;

// ────────────────────────────────────── CLI Types ──────────────────────────────────────

#[derive(Parser)]
#[command(name = "tripmate-server")]
#[command(about = "Trip invitation and membership service")]
struct Cli {
    /// Database URL (sqlite://path/to/db.db?mode=rwc or memory://)
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = backend::DEFAULT_DATABASE_URL
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve {
        /// API listen address
        #[arg(long, env = "TRIPMATE_ADDR", default_value = "0.0.0.0:8000")]
        addr: String,

        /// Health check and metrics listen address
        #[arg(long, env = "TRIPMATE_HEALTH_ADDR", default_value = "0.0.0.0:8080")]
        health_addr: String,

        /// How often finished rate-limit windows are dropped, in seconds
        #[arg(long, default_value = "60")]
        purge_interval_secs: u64,
    },
    /// Invite administration
    Invite {
        #[command(subcommand)]
        invite_cmd: InviteCommand,
    },
}

#[derive(Subcommand)]
enum InviteCommand {
    /// List every invite of a trip, newest first
    List {
        /// Trip ID
        trip_id: String,
    },
    /// Switch an invite off
    Revoke {
        /// Invite ID (the shared code)
        invite_id: String,
    },
}

// ────────────────────────────────────── CLI Commands ──────────────────────────────────────

async fn cmd_invite_list(
    db_url: &str,
    trip_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = backend::open_store(db_url).await?;
    let invites = store.list_invites(&TripId::from(trip_id)).await?;

    if invites.is_empty() {
        println!("No invites found for trip {trip_id}.");
        return Ok(());
    }

    for invite in invites {
        let limit = invite
            .max_uses
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        println!("Invite:  {}", invite.id);
        println!("Creator: {}", invite.created_by);
        println!("Expires: {}", invite.expires_at);
        println!("Uses:    {}/{}", invite.used_count, limit);
        println!("Active:  {}", invite.is_active);
        println!();
    }

    Ok(())
}

async fn cmd_invite_revoke(
    db_url: &str,
    invite_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = backend::open_store(db_url).await?;
    let invite_id = InviteId::from(invite_id);

    match store.deactivate_invite(&invite_id).await {
        Ok(()) => println!("✓ Invite {invite_id} revoked"),
        Err(StoreError::NotFound) => return Err(format!("invite {invite_id} not found").into()),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn cmd_serve(
    db_url: &str,
    addr: &str,
    health_addr: &str,
    purge_every: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = addr.parse()?;
    let health_addr: SocketAddr = health_addr.parse()?;

    let config = ServerConfig::from_env()?;
    let metrics_handle = metrics::init_metrics()?;
    let store = backend::open_store(db_url).await?;
    let server = TripServer::new(store, config);

    // /readyz reports 503 until the API listener is bound, and again once shutdown begins
    let (readiness_tx, readiness_rx) = watch::channel(false);
    let health_router = Router::new()
        .route("/healthz", get(health_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(HealthState {
            ready: readiness_rx,
            metrics: metrics_handle,
        });

    let api_listener = tokio::net::TcpListener::bind(addr).await?;
    let health_listener = tokio::net::TcpListener::bind(health_addr).await?;
    info!(addr = %api_listener.local_addr()?, "API listening");
    info!(addr = %health_listener.local_addr()?, "health checks listening");

    let limiter = server.limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            let purged = limiter.purge_expired();
            if purged > 0 {
                debug!(purged, "dropped finished rate limit windows");
            }
        }
    });

    let api_router = handlers::router(server);
    let _ = readiness_tx.send(true);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal(readiness_tx).await;
        let _ = shutdown_tx_clone.send(());
    });

    let mut shutdown_rx1 = shutdown_tx.subscribe();
    let health_server =
        axum::serve(health_listener, health_router).with_graceful_shutdown(async move {
            let _ = shutdown_rx1.recv().await;
        });

    let mut shutdown_rx2 = shutdown_tx.subscribe();
    let api_server = axum::serve(api_listener, api_router).with_graceful_shutdown(async move {
        let _ = shutdown_rx2.recv().await;
    });

    let (api_result, health_result) = tokio::join!(api_server, health_server);
    api_result?;
    health_result?;

    info!("shutdown complete");
    Ok(())
}

#[derive(Clone)]
struct HealthState {
    ready: watch::Receiver<bool>,
    metrics: PrometheusHandle,
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn readiness_handler(State(state): State<HealthState>) -> Result<&'static str, StatusCode> {
    if *state.ready.borrow() {
        Ok("ok")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

async fn metrics_handler(State(state): State<HealthState>) -> String {
    state.metrics.render()
}

async fn shutdown_signal(readiness_tx: watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("received SIGINT, shutting down gracefully"),
            }
        }
        _ => {
            warn!("could not install unix signal handlers, waiting for ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    // Not ready while draining
    let _ = readiness_tx.send(false);
}

// ────────────────────────────────────── Main ──────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            addr,
            health_addr,
            purge_interval_secs,
        } => {
            let purge_every = Duration::from_secs(purge_interval_secs.max(1));
            cmd_serve(&cli.database_url, &addr, &health_addr, purge_every).await?;
        }
        Command::Invite { invite_cmd } => match invite_cmd {
            InviteCommand::List { trip_id } => {
                cmd_invite_list(&cli.database_url, &trip_id).await?;
            }
            InviteCommand::Revoke { invite_id } => {
                cmd_invite_revoke(&cli.database_url, &invite_id).await?;
            }
        },
    }

    Ok(())
}
