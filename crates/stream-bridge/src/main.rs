mod cli;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use bridge_log::{EventRecord, EventSink, EventSource, EventType};
use ws_bridge::{BridgeListener, ConnectionRegistry, ListenerConfig, Role};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref addr) = cli.device_listen {
        cfg.device.listen_addr = addr.clone();
    }
    if let Some(ref addr) = cli.client_listen {
        cfg.client.listen_addr = addr.clone();
    }
    if let Some(ref level) = cli.log_level {
        cfg.logging.level = level.clone();
    }

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!(
        config_file = %cli.config.display(),
        device = %cfg.device.listen_addr,
        client = %cfg.client.listen_addr,
        "stream-bridge starting"
    );

    // 4. Parse listen addresses.
    let device_addr: SocketAddr = cfg
        .device
        .listen_addr
        .parse()
        .context("invalid device listen address")?;
    let client_addr: SocketAddr = cfg
        .client
        .listen_addr
        .parse()
        .context("invalid client listen address")?;

    // The device side is meant to be reachable only from this host; a
    // non-loopback bind usually means a mixed-up config.
    if !device_addr.ip().is_loopback() {
        warn!(
            addr = %device_addr,
            "device listener is not bound to a loopback address"
        );
    }

    // 5. Start the event log sink.
    let (events, _events_handle) = EventSink::start(&cfg.logging.event_log_path)
        .await
        .context("failed to start event log")?;

    events
        .log(EventRecord::new(
            EventType::ProcessStarted,
            EventSource::new("stream-bridge"),
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_file": cli.config.display().to_string(),
            }),
        ))
        .await;

    // 6. The registry shared by every relay loop.
    let registry = Arc::new(ConnectionRegistry::new());

    // 7. Bind both listeners up front so a taken port fails fast.
    let device_listener = BridgeListener::bind(
        ListenerConfig {
            role: Role::Device,
            bind_addr: device_addr,
        },
        Arc::clone(&registry),
        events.clone(),
    )
    .await?;

    let client_listener = BridgeListener::bind(
        ListenerConfig {
            role: Role::Client,
            bind_addr: client_addr,
        },
        Arc::clone(&registry),
        events.clone(),
    )
    .await?;

    // 8. Set up shutdown signal (ctrl_c + SIGTERM).
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    let shutdown_tx_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (ctrl-c)");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("received SIGINT (ctrl-c)");
        }

        let _ = shutdown_tx_signal.send(());
    });

    info!(
        device = %device_addr,
        client = %client_addr,
        "bridge running"
    );

    // 9. Run both listeners until a signal arrives or one of them dies. The
    //    bridge is useless with either side down, so a listener fault takes
    //    the process with it.
    let device_task = tokio::spawn(device_listener.run());
    let client_task = tokio::spawn(client_listener.run());

    let outcome: Result<()> = tokio::select! {
        joined = device_task => listener_exit(Role::Device, joined),
        joined = client_task => listener_exit(Role::Client, joined),
        _ = shutdown_rx.recv() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    // 10. Log shutdown.
    info!("stream-bridge shutting down");

    events
        .log(EventRecord::new(
            EventType::ProcessStopped,
            EventSource::new("stream-bridge"),
            serde_json::json!({
                "outcome": match &outcome {
                    Ok(()) => "signal".to_string(),
                    Err(err) => err.to_string(),
                },
            }),
        ))
        .await;

    outcome
}

/// A listener's accept loop never returns in normal operation, so any exit
/// (even a clean one) is a fault worth killing the process over.
fn listener_exit(
    role: Role,
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match joined {
        Ok(Ok(())) => Err(anyhow::anyhow!("{role} listener exited unexpectedly")),
        Ok(Err(err)) => Err(err.context(format!("{role} listener failed"))),
        Err(err) => Err(anyhow::anyhow!("{role} listener task panicked: {err}")),
    }
}
