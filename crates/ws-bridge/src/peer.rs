use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Boxed send half of an accepted connection.
type BoxedSink = Box<dyn Sink<Message, Error = WsError> + Send + Unpin>;

/// Cloneable handle to one accepted connection's send half.
///
/// The relay loop that owns the connection's read half is the authority on
/// its lifecycle: it marks the handle closed when the read side ends. The
/// opposite role's loop only borrows the handle from the registry long
/// enough to forward a frame, and must treat [`is_open`](Self::is_open) as a
/// point-in-time answer: the connection can still close between the check
/// and the send.
#[derive(Clone)]
pub struct PeerHandle {
    id: uuid::Uuid,
    sink: Arc<Mutex<BoxedSink>>,
    open: Arc<AtomicBool>,
}

impl PeerHandle {
    /// Wrap the send half of a freshly accepted connection. The handle starts
    /// out open.
    pub fn new(
        id: uuid::Uuid,
        sink: impl Sink<Message, Error = WsError> + Send + Unpin + 'static,
    ) -> Self {
        Self {
            id,
            sink: Arc::new(Mutex::new(Box::new(sink))),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Identifier assigned to the connection when it was accepted.
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Whether the owning relay loop still considers this connection open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the connection closed. Called by the owning relay loop when its
    /// read side ends, and by [`send`](Self::send) when a write fails.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Send one frame to this connection.
    ///
    /// A failed send marks the handle closed before the error is returned, so
    /// later forwarders take the cheap [`is_open`](Self::is_open) path
    /// instead of failing the write again.
    pub async fn send(&self, message: Message) -> Result<(), WsError> {
        let result = self.sink.lock().await.send(message).await;
        if result.is_err() {
            self.mark_closed();
        }
        result
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
