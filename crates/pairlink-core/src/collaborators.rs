//! Capabilities the relay engine calls out to but does not own.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CollaboratorError;
use crate::ids::{ConnectionId, Role, SessionToken};
use crate::wire::Outbound;

/// Delivery of events to connected clients.
///
/// Must not block: the relay engine calls this from its only task.
pub trait Outbox: Send + Sync {
    /// Queue `event` for `to`. Returns false if the connection is gone or
    /// its queue is full.
    fn emit(&self, to: &ConnectionId, event: &Outbound) -> bool;
}

/// Push notification delivery, targeted by session token.
#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn send_push(&self, token: &SessionToken, message: &str) -> Result<(), CollaboratorError>;
}

/// Transactional email delivery.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send_email(&self, request: &EmailRequest) -> Result<(), CollaboratorError>;
}

/// Durable log of pairing status changes, keyed by `(token, role)`.
#[async_trait]
pub trait StatusRecorder: Send + Sync {
    async fn record_status(
        &self,
        token: &SessionToken,
        role: Role,
        status: ConnectionStatus,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailRequest {
    pub title: String,
    pub body: String,
    pub recipient: String,
    pub attachment: Option<Attachment>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.content.len())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// The optional side channels handed to the relay engine.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub push: Option<Arc<dyn PushDispatcher>>,
    pub email: Option<Arc<dyn EmailDispatcher>>,
    pub status: Option<Arc<dyn StatusRecorder>>,
}

impl Collaborators {
    pub fn with_push(mut self, push: Arc<dyn PushDispatcher>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailDispatcher>) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusRecorder>) -> Self {
        self.status = Some(status);
        self
    }
}
