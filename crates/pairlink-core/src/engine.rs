//! Relay engine: validates inbound events against the pairing registry and
//! routes them to the paired peer or to a notification side channel.
//!
//! The engine is synchronous and owns its registry outright. Callers must
//! feed it from a single task; side effects on collaborators are spawned onto
//! the ambient tokio runtime and never awaited.
//!
//! Status writes are the exception to "spawn and forget": they go through one
//! queue drained by a single writer task, so the stored status of a
//! `(token, role)` always reflects the last event the engine handled.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collaborators::{
    Collaborators, ConnectionStatus, EmailRequest, Outbox, StatusRecorder,
};
use crate::errors::{CollaboratorError, RelayError};
use crate::ids::{ConnectionId, Role, SessionToken};
use crate::registry::{PairingRegistry, SessionRegistry};
use crate::wire::{Inbound, Outbound, RegisterPayload, RelayKind, SensorPayload};

pub const PAIRED_MESSAGE: &str = "Both devices connected";

/// One pending status write.
#[derive(Debug)]
struct StatusUpdate {
    token: SessionToken,
    role: Role,
    status: ConnectionStatus,
}

pub struct RelayEngine<R: PairingRegistry = SessionRegistry> {
    registry: R,
    outbox: Arc<dyn Outbox>,
    collaborators: Collaborators,
    /// Started on the first status write, inside the runtime.
    status_tx: Option<mpsc::UnboundedSender<StatusUpdate>>,
}

impl<R: PairingRegistry> RelayEngine<R> {
    pub fn new(registry: R, outbox: Arc<dyn Outbox>, collaborators: Collaborators) -> Self {
        Self {
            registry,
            outbox,
            collaborators,
            status_tx: None,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Process one event from `conn`. Rejections are reported to `conn` as
    /// an `error` event and leave the registry untouched.
    pub fn handle(&mut self, conn: &ConnectionId, inbound: Inbound) {
        let event = inbound.name();
        let result = match inbound {
            Inbound::Register(payload) => self.on_register(conn, payload),
            Inbound::SensorData(payload) => self.on_sensor_data(conn, payload),
            Inbound::Disconnect => {
                self.on_disconnect(conn);
                Ok(())
            }
        };

        if let Err(err) = result {
            self.reject(conn, event, &err);
        }
    }

    pub fn reject(&self, conn: &ConnectionId, event: &str, err: &RelayError) {
        debug!(conn_id = %conn, event, kind = err.error_kind(), "event rejected");
        self.outbox.emit(conn, &Outbound::error(err));
    }

    fn on_register(&mut self, conn: &ConnectionId, payload: RegisterPayload) -> Result<(), RelayError> {
        let token = SessionToken::parse(payload.auth_token.as_deref())
            .ok_or(RelayError::InvalidRegistration)?;
        let role: Role = payload
            .device_type
            .as_deref()
            .and_then(|s| s.parse().ok())
            .ok_or(RelayError::InvalidRegistration)?;

        let was_paired = self.registry.both_present(&token);
        self.registry.register(&token, role, conn.clone());
        info!(token = %token, role = %role, conn_id = %conn, "registered");

        self.record_status(&token, role, ConnectionStatus::Connected);

        if !was_paired && self.registry.both_present(&token) {
            let status = Outbound::Status {
                message: PAIRED_MESSAGE.to_string(),
            };
            for role in Role::ALL {
                if let Some(peer) = self.registry.lookup(&token, role) {
                    self.outbox.emit(&peer, &status);
                }
            }
            info!(token = %token, "pairing complete");
        }
        Ok(())
    }

    fn on_sensor_data(&mut self, conn: &ConnectionId, payload: SensorPayload) -> Result<(), RelayError> {
        let kind = payload.relay_kind();
        if kind == RelayKind::Mail {
            return self.dispatch_email(payload);
        }

        let token = SessionToken::parse(payload.auth_token.as_deref())
            .filter(|t| self.registry.lookup(t, Role::Device).is_some())
            .ok_or(RelayError::DeviceNotRegistered)?;
        let phone = self
            .registry
            .lookup(&token, Role::Phone)
            .ok_or(RelayError::PhoneNotConnected)?;

        let event = match kind {
            RelayKind::Sms => Outbound::Sms {
                number: payload.number,
                message: payload.message,
            },
            RelayKind::Push => {
                self.dispatch_push(&token, payload.message.as_ref());
                Outbound::Push {
                    message: payload.message,
                }
            }
            RelayKind::Reading | RelayKind::Mail => Outbound::SensorData {
                sensor_state: payload.sensor_state,
            },
        };

        if self.outbox.emit(&phone, &event) {
            debug!(token = %token, from = %conn, to = %phone, event = event.name(), "relayed");
        } else {
            warn!(token = %token, to = %phone, event = event.name(), "phone queue rejected relay");
        }
        Ok(())
    }

    fn on_disconnect(&mut self, conn: &ConnectionId) {
        let cleared = self.registry.remove_by_connection(conn);
        for (token, role) in &cleared {
            info!(token = %token, role = %role, conn_id = %conn, "slot released");
            self.record_status(token, *role, ConnectionStatus::Disconnected);
        }
        debug!(conn_id = %conn, released = cleared.len(), "disconnect handled");
    }

    fn dispatch_email(&self, payload: SensorPayload) -> Result<(), RelayError> {
        let (Some(title), Some(body), Some(recipient)) = (
            non_empty(payload.title),
            non_empty(payload.body),
            non_empty(payload.toaddr),
        ) else {
            return Err(RelayError::MissingEmailFields);
        };

        let Some(email) = self.collaborators.email.as_ref().map(Arc::clone) else {
            warn!(recipient = %recipient, "email requested but no email dispatcher configured");
            return Ok(());
        };

        info!(title = %title, recipient = %recipient, "dispatching email");
        let request = EmailRequest {
            title,
            body,
            recipient,
            attachment: None,
        };
        spawn_side_effect("email", async move { email.send_email(&request).await });
        Ok(())
    }

    fn dispatch_push(&self, token: &SessionToken, message: Option<&Value>) {
        let Some(push) = self.collaborators.push.as_ref().map(Arc::clone) else {
            debug!(token = %token, "no push dispatcher configured");
            return;
        };
        let Some(message) = message.and_then(notification_text) else {
            warn!(token = %token, "push relay without message, skipping notification");
            return;
        };
        let token = token.clone();
        spawn_side_effect("push", async move { push.send_push(&token, &message).await });
    }

    fn record_status(&mut self, token: &SessionToken, role: Role, status: ConnectionStatus) {
        let Some(tx) = self.status_writer() else {
            return;
        };
        let update = StatusUpdate {
            token: token.clone(),
            role,
            status,
        };
        if let Err(mpsc::error::SendError(update)) = tx.send(update) {
            warn!(token = %update.token, role = %update.role, "status writer stopped, dropping update");
            self.status_tx = None;
        }
    }

    /// The queue feeding the status writer, starting the writer if needed.
    fn status_writer(&mut self) -> Option<&mpsc::UnboundedSender<StatusUpdate>> {
        let recorder = self.collaborators.status.as_ref()?;
        if self.status_tx.is_none() {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                warn!("no async runtime, dropping status update");
                return None;
            };
            let (tx, rx) = mpsc::unbounded_channel();
            handle.spawn(write_statuses(Arc::clone(recorder), rx));
            self.status_tx = Some(tx);
        }
        self.status_tx.as_ref()
    }
}

/// Text for a push notification. Non-string messages are sent as their JSON form.
fn notification_text(message: &Value) -> Option<String> {
    let text = match message {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Apply status updates one at a time, in the order they were queued.
async fn write_statuses(
    recorder: Arc<dyn StatusRecorder>,
    mut rx: mpsc::UnboundedReceiver<StatusUpdate>,
) {
    while let Some(update) = rx.recv().await {
        if let Err(e) = recorder
            .record_status(&update.token, update.role, update.status)
            .await
        {
            warn!(
                token = %update.token,
                role = %update.role,
                status = %update.status,
                error_kind = e.error_kind(),
                error = %e,
                "status write failed"
            );
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Run a collaborator call in the background. Failures are logged only.
fn spawn_side_effect<F>(kind: &'static str, fut: F)
where
    F: Future<Output = Result<(), CollaboratorError>> + Send + 'static,
{
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!(kind, "no async runtime, dropping side effect");
        return;
    };
    handle.spawn(async move {
        if let Err(e) = fut.await {
            warn!(kind, error_kind = e.error_kind(), error = %e, "side effect failed");
        }
    });
}
