/**
 * NMWATCH KERNEL - Point d'entrée du moniteur de flotte NMMiner
 *
 * RÔLE : Bootstrap config, registry, listener UDP, sweeper, API HTTP.
 * Le registry est créé ici une seule fois et passé explicitement à chacun.
 *
 * ARCHITECTURE : broadcast UDP → listener → decoder → registry ← sweeper
 *                                                    ↑
 *                                 snapshot service ← HTTP (présentation)
 */

use nmwatch_kernel::config::load_config;
use nmwatch_kernel::firmware::StaticRelease;
use nmwatch_kernel::health::HealthTracker;
use nmwatch_kernel::http::{build_router, AppState};
use nmwatch_kernel::listener::TelemetryListener;
use nmwatch_kernel::registry::DeviceRegistry;
use nmwatch_kernel::snapshot::SnapshotService;
use nmwatch_kernel::state::shutdown_channel;
use nmwatch_kernel::sweeper::spawn_eviction_sweeper;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("nmwatch kernel aborted: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let cfg = load_config().await;
    info!("NMWatch kernel starting (udp {}, http {})", cfg.udp.port, cfg.http.port);

    let registry = DeviceRegistry::shared();
    let health_tracker = HealthTracker::new();
    let release = Arc::new(StaticRelease::new(cfg.latest_release()));
    match cfg.latest_release() {
        Some(v) => info!("reference firmware release: {v}"),
        None => warn!("no firmware release configured, outdated flags disabled"),
    }

    let (shutdown, signal) = shutdown_channel();

    // bind impossible = arrêt immédiat avec diagnostic
    let listener = TelemetryListener::bind(&cfg.udp, registry.clone(), health_tracker.clone())
        .await
        .context("cannot open telemetry port")?;
    let listener_task = listener.spawn(signal.clone());

    let sweeper_task = spawn_eviction_sweeper(
        registry.clone(),
        health_tracker.clone(),
        cfg.registry.stale_after(),
        cfg.registry.sweep_interval(),
        signal.clone(),
    );

    let app_state = AppState {
        snapshots: SnapshotService::new(registry.clone(), cfg.snapshot.version_order),
        registry,
        health_tracker,
        release,
    };
    let app = build_router(app_state);

    let addr = cfg.http.socket_addr()?;
    let http = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind http on {addr}"))?;
    info!("fleet snapshot available at http://{addr}/fleet");

    let mut http_signal = signal;
    axum::serve(http, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
                _ = http_signal.triggered() => {}
            }
        })
        .await
        .context("http server failed")?;

    shutdown.trigger();
    let _ = tokio::join!(listener_task, sweeper_task);
    info!("NMWatch kernel stopped");
    Ok(())
}
