//! The relay task: sole owner of the relay engine and its pairing registry.
//!
//! Every connection's reader pushes onto one queue; this task drains it in
//! order, so registry mutations never race.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use pairlink_core::registry::PairingRegistry;
use pairlink_core::{ConnectionId, Inbound, RelayEngine, RelayError};
use tokio::sync::mpsc;

/// One unit of work for the relay task.
#[derive(Debug)]
pub enum RelayMessage {
    /// A decoded event, or the transport-originated disconnect.
    Event(ConnectionId, Inbound),
    /// A frame that could not be decoded.
    Rejected(ConnectionId, RelayError),
}

impl RelayMessage {
    fn conn(&self) -> &ConnectionId {
        match self {
            Self::Event(conn, _) | Self::Rejected(conn, _) => conn,
        }
    }
}

/// Drain the relay queue until every sender is dropped.
///
/// A panic while handling one event is logged and the loop moves on.
pub async fn run_relay<R: PairingRegistry>(
    mut rx: mpsc::Receiver<RelayMessage>,
    mut engine: RelayEngine<R>,
) {
    while let Some(msg) = rx.recv().await {
        let conn = msg.conn().clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| match msg {
            RelayMessage::Event(conn, inbound) => engine.handle(&conn, inbound),
            RelayMessage::Rejected(conn, err) => engine.reject(&conn, "frame", &err),
        }));

        if let Err(payload) = outcome {
            tracing::error!(
                conn_id = %conn,
                panic = panic_message(payload.as_ref()),
                "relay handler panicked"
            );
        }
    }
    tracing::info!("relay queue closed");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
