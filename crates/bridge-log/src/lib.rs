//! Append-only structured JSON-lines event logging for the stream-bridge
//! project.
//!
//! Every component of the bridge records its lifecycle events (listener
//! startup, connections opening, being replaced, and closing, forwarding
//! faults) through this crate.  Each event is serialised as a single
//! newline-terminated JSON object and appended to a log file, producing a
//! [JSON Lines](https://jsonlines.org/) stream that is easy to ship, parse,
//! and replay.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use bridge_log::{EventRecord, EventSink, EventSource, EventType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, _handle) = EventSink::start("/var/log/stream-bridge/events.jsonl").await?;
//!
//! sink.log(EventRecord::new(
//!     EventType::ProcessStarted,
//!     EventSource::new("stream-bridge"),
//!     serde_json::json!({"version": "0.1.0"}),
//! ))
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use entry::{EventRecord, EventSource, EventType};
pub use sink::EventSink;
pub use writer::{EventWriteError, EventWriter};
