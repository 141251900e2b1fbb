use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace, warn};

use bridge_log::{EventRecord, EventSink, EventSource, EventType};

use crate::peer::PeerHandle;
use crate::registry::{ConnectionRegistry, Role};

/// Drive one accepted connection until its read side ends.
///
/// The loop installs `peer` as the active connection for `role`, then reads
/// frames from `reader` and forwards each data frame to the opposite role's
/// current connection. Frames read while the opposite slot is empty or
/// closed are dropped without error or buffering. A failed forward is logged
/// and the loop keeps reading its own connection.
///
/// Installing does not cancel the loop of a displaced connection; that loop
/// keeps consuming its own socket and forwarding through the updated slot
/// until its socket closes. Per-connection forwarding preserves arrival
/// order.
pub async fn run_relay<R>(
    role: Role,
    remote_addr: SocketAddr,
    peer: PeerHandle,
    mut reader: R,
    registry: Arc<ConnectionRegistry>,
    events: EventSink,
) where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    // Take over the slot for this role.
    if let Some(displaced) = registry.install(role, peer.clone()) {
        info!(
            %role,
            connection_id = %peer.id(),
            displaced_id = %displaced.id(),
            "replacing active connection"
        );
        events
            .log(EventRecord::new(
                EventType::ConnectionReplaced,
                relay_source(role, remote_addr, &peer),
                serde_json::json!({
                    "displaced_connection_id": displaced.id().to_string(),
                    "displaced_open": displaced.is_open(),
                }),
            ))
            .await;
    }

    while let Some(item) = reader.next().await {
        let message = match item {
            Ok(message) => message,
            Err(err) => {
                debug!(
                    %role,
                    connection_id = %peer.id(),
                    %err,
                    "read error, ending relay"
                );
                break;
            }
        };

        match message {
            Message::Text(_) | Message::Binary(_) => {
                forward(role, remote_addr, &peer, message, &registry, &events).await;
            }
            Message::Close(_) => break,
            // Ping/pong stay on the connection they arrived on.
            _ => {}
        }
    }

    peer.mark_closed();
}

/// Forward one data frame to the opposite role's current connection, if one
/// is registered and open.
async fn forward(
    role: Role,
    remote_addr: SocketAddr,
    peer: &PeerHandle,
    message: Message,
    registry: &ConnectionRegistry,
    events: &EventSink,
) {
    let target = match registry.peer(role.opposite()) {
        Some(target) if target.is_open() => target,
        _ => {
            trace!(%role, connection_id = %peer.id(), "no open opposite connection, frame dropped");
            return;
        }
    };

    // The open check above is a snapshot; the peer can still close before
    // the send completes.
    if let Err(err) = target.send(message).await {
        warn!(
            %role,
            connection_id = %peer.id(),
            target_id = %target.id(),
            %err,
            "forward failed, frame lost"
        );
        events
            .log(EventRecord::new(
                EventType::SendFailed,
                relay_source(role, remote_addr, peer),
                serde_json::json!({
                    "target_connection_id": target.id().to_string(),
                    "error": err.to_string(),
                }),
            ))
            .await;
    }
}

fn relay_source(role: Role, remote_addr: SocketAddr, peer: &PeerHandle) -> EventSource {
    EventSource {
        component: "relay".to_string(),
        role: Some(role.to_string()),
        remote_addr: Some(remote_addr.to_string()),
        connection_id: Some(peer.id().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures_util::{stream, SinkExt};

    fn channel_peer() -> (PeerHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded::<Message>();
        let peer = PeerHandle::new(
            uuid::Uuid::new_v4(),
            tx.sink_map_err(|_| WsError::ConnectionClosed),
        );
        (peer, rx)
    }

    fn frames(texts: &[&str]) -> Vec<Result<Message, WsError>> {
        texts.iter().map(|t| Ok(Message::text(*t))).collect()
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:0".parse().expect("addr")
    }

    async fn test_events(dir: &tempfile::TempDir) -> EventSink {
        let (events, _handle) = EventSink::start(dir.path().join("events.jsonl"))
            .await
            .expect("event sink");
        events
    }

    #[tokio::test]
    async fn forwards_data_frames_to_the_open_opposite_peer_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = test_events(&dir).await;
        let registry = Arc::new(ConnectionRegistry::new());

        let (client, mut client_rx) = channel_peer();
        registry.install(Role::Client, client);

        let (device, _device_rx) = channel_peer();
        let reader = stream::iter(frames(&["heartrate:72", "heartrate:73"]));

        run_relay(
            Role::Device,
            test_addr(),
            device.clone(),
            reader,
            Arc::clone(&registry),
            events,
        )
        .await;

        assert_eq!(
            client_rx.next().await,
            Some(Message::text("heartrate:72"))
        );
        assert_eq!(
            client_rx.next().await,
            Some(Message::text("heartrate:73"))
        );

        // Loop ended: the handle is closed but the slot keeps it.
        assert!(!device.is_open());
        let slot = registry.peer(Role::Device).expect("device slot occupied");
        assert_eq!(slot.id(), device.id());
    }

    #[tokio::test]
    async fn drops_frames_when_no_opposite_connection_is_registered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = test_events(&dir).await;
        let registry = Arc::new(ConnectionRegistry::new());

        let (device, _device_rx) = channel_peer();
        let reader = stream::iter(frames(&["heartrate:72"]));

        // Completes without error even though nothing can receive the frame.
        run_relay(
            Role::Device,
            test_addr(),
            device,
            reader,
            Arc::clone(&registry),
            events,
        )
        .await;

        assert!(registry.peer(Role::Client).is_none());
    }

    #[tokio::test]
    async fn drops_frames_when_the_opposite_connection_is_closed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = test_events(&dir).await;
        let registry = Arc::new(ConnectionRegistry::new());

        let (client, mut client_rx) = channel_peer();
        client.mark_closed();
        registry.install(Role::Client, client);

        let (device, _device_rx) = channel_peer();
        let reader = stream::iter(frames(&["heartrate:72"]));

        run_relay(
            Role::Device,
            test_addr(),
            device,
            reader,
            Arc::clone(&registry),
            events,
        )
        .await;

        // Nothing was forwarded to the closed peer: its channel is empty but
        // still open, so try_next reports "no message ready".
        assert!(client_rx.try_next().is_err());
    }

    #[tokio::test]
    async fn a_failed_forward_does_not_end_the_relay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = test_events(&dir).await;
        let registry = Arc::new(ConnectionRegistry::new());

        // Receiver dropped: the first send fails and marks the peer closed.
        let (client, client_rx) = channel_peer();
        drop(client_rx);
        registry.install(Role::Client, client.clone());

        let (device, _device_rx) = channel_peer();
        let reader = stream::iter(frames(&["heartrate:72", "heartrate:73"]));

        run_relay(
            Role::Device,
            test_addr(),
            device.clone(),
            reader,
            Arc::clone(&registry),
            events,
        )
        .await;

        // The loop consumed its whole stream and the dead target was marked.
        assert!(!client.is_open());
        assert!(!device.is_open());
    }

    #[tokio::test]
    async fn forwarding_targets_the_most_recently_installed_opposite_peer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = test_events(&dir).await;
        let registry = Arc::new(ConnectionRegistry::new());

        let (first_client, mut first_rx) = channel_peer();
        registry.install(Role::Client, first_client);

        let (device, _device_rx) = channel_peer();
        let (mut feed, reader) = mpsc::unbounded::<Result<Message, WsError>>();

        let relay = tokio::spawn(run_relay(
            Role::Device,
            test_addr(),
            device,
            reader,
            Arc::clone(&registry),
            events,
        ));

        feed.send(Ok(Message::text("heartrate:72")))
            .await
            .expect("feed");
        assert_eq!(
            first_rx.next().await,
            Some(Message::text("heartrate:72"))
        );

        // A second client connection takes over the slot; the running loop
        // picks it up at the next forward.
        let (second_client, mut second_rx) = channel_peer();
        registry.install(Role::Client, second_client);

        feed.send(Ok(Message::text("heartrate:80")))
            .await
            .expect("feed");
        assert_eq!(
            second_rx.next().await,
            Some(Message::text("heartrate:80"))
        );

        drop(feed);
        relay.await.expect("relay task");

        // The first client never saw the second frame.
        assert_eq!(first_rx.next().await, None);
    }

    #[tokio::test]
    async fn a_close_frame_ends_the_relay_without_forwarding_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = test_events(&dir).await;
        let registry = Arc::new(ConnectionRegistry::new());

        let (client, mut client_rx) = channel_peer();
        registry.install(Role::Client, client.clone());

        let (device, _device_rx) = channel_peer();
        let reader = stream::iter(vec![
            Ok(Message::text("heartrate:72")),
            Ok(Message::Close(None)),
            Ok(Message::text("never-read")),
        ]);

        run_relay(
            Role::Device,
            test_addr(),
            device.clone(),
            reader,
            Arc::clone(&registry),
            events,
        )
        .await;

        assert_eq!(
            client_rx.next().await,
            Some(Message::text("heartrate:72"))
        );
        // The close frame itself was not relayed and the loop stopped.
        assert!(client.is_open());
        assert!(!device.is_open());
    }
}
