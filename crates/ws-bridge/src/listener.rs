use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use uuid::Uuid;

use bridge_log::{EventRecord, EventSink, EventSource, EventType};

use crate::peer::PeerHandle;
use crate::registry::{ConnectionRegistry, Role};
use crate::relay;

/// Configuration for one role's listening endpoint.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Which side of the bridge this listener accepts connections for.
    pub role: Role,
    /// Address to bind the listening socket to.
    pub bind_addr: SocketAddr,
}

/// Accepts WebSocket connections for one role and runs a relay loop per
/// accepted connection.
///
/// Two of these run concurrently in a bridge process: the device-side
/// listener on a loopback address and the client-side listener on a
/// LAN-reachable address. Only the most recently accepted connection per
/// role participates in forwarding (per the registry's overwrite semantics);
/// earlier connections keep their loops until their own socket closes.
pub struct BridgeListener {
    role: Role,
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    events: EventSink,
}

impl BridgeListener {
    /// Bind the listening socket.
    ///
    /// Binding is the only fatal setup step; a bridge missing one side is
    /// useless, so callers propagate this error to process exit.
    pub async fn bind(
        config: ListenerConfig,
        registry: Arc<ConnectionRegistry>,
        events: EventSink,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await.with_context(|| {
            format!(
                "failed to bind {} listener on {}",
                config.role, config.bind_addr
            )
        })?;

        info!(role = %config.role, addr = %config.bind_addr, "listener bound");

        Ok(Self {
            role: config.role,
            listener,
            registry,
            events,
        })
    }

    /// The locally bound address (resolves port 0 to the assigned port).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Accept connections forever.
    ///
    /// Each accepted connection is handled in its own Tokio task. Accept
    /// errors are transient (a peer tearing down mid-handshake, fd pressure)
    /// and must not take the listener down; they are logged and the loop
    /// continues.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.local_addr()?;

        let mut source = EventSource::new("listener");
        source.role = Some(self.role.to_string());
        self.events
            .log(EventRecord::new(
                EventType::ListenerStarted,
                source,
                serde_json::json!({ "addr": addr.to_string() }),
            ))
            .await;

        info!(role = %self.role, %addr, "accepting connections");

        loop {
            let (stream, remote_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(role = %self.role, %err, "accept failed");
                    continue;
                }
            };

            let role = self.role;
            let registry = Arc::clone(&self.registry);
            let events = self.events.clone();

            tokio::spawn(async move {
                if let Err(err) =
                    handle_connection(role, stream, remote_addr, registry, events).await
                {
                    warn!(%role, %remote_addr, %err, "connection handler error");
                }
            });
        }
    }
}

/// Handle a single TCP connection from WebSocket handshake through relay and
/// teardown.
async fn handle_connection(
    role: Role,
    stream: TcpStream,
    remote_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    events: EventSink,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake failed")?;

    let connection_id = Uuid::new_v4();

    info!(%role, %connection_id, %remote_addr, "connection accepted");

    events
        .log(EventRecord::new(
            EventType::ConnectionOpened,
            make_source(role, connection_id, remote_addr),
            serde_json::json!({ "remote_addr": remote_addr.to_string() }),
        ))
        .await;

    let (sink, reader) = ws.split();
    let peer = PeerHandle::new(connection_id, sink);

    relay::run_relay(role, remote_addr, peer, reader, registry, events.clone()).await;

    info!(%role, %connection_id, %remote_addr, "connection closed");

    events
        .log(EventRecord::new(
            EventType::ConnectionClosed,
            make_source(role, connection_id, remote_addr),
            serde_json::json!({ "remote_addr": remote_addr.to_string() }),
        ))
        .await;

    Ok(())
}

/// Construct an [`EventSource`] for a listener-owned connection.
fn make_source(role: Role, connection_id: Uuid, remote_addr: SocketAddr) -> EventSource {
    EventSource {
        component: "listener".to_string(),
        role: Some(role.to_string()),
        remote_addr: Some(remote_addr.to_string()),
        connection_id: Some(connection_id.to_string()),
    }
}
