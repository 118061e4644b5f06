use std::time::Duration;

/// Rejections reported back to the originating connection as an `error` event.
///
/// The `Display` text is the wire message, so changing it changes the protocol.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    // Malformed input
    #[error("Malformed event")]
    MalformedEvent,
    #[error("Invalid registration data")]
    InvalidRegistration,
    #[error("Missing required fields for email.")]
    MissingEmailFields,

    // Unmet precondition
    #[error("Invalid authToken or device not registered")]
    DeviceNotRegistered,
    #[error("Phone not connected")]
    PhoneNotConnected,
}

impl RelayError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedEvent => "malformed_event",
            Self::InvalidRegistration => "invalid_registration",
            Self::MissingEmailFields => "missing_email_fields",
            Self::DeviceNotRegistered => "device_not_registered",
            Self::PhoneNotConnected => "phone_not_connected",
        }
    }
}

/// Failure of an external collaborator (push, email, persistence).
/// Only ever logged; never surfaced to a connection.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("rejected {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("service error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("template error: {0}")]
    Template(String),
}

impl CollaboratorError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::ServerError { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage_error",
            Self::Template(_) => "template_error",
        }
    }

    /// Classify a non-success HTTP status from a notification service.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            500..=599 => Self::ServerError { status, body },
            _ => Self::Rejected { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_wire_messages() {
        assert_eq!(RelayError::InvalidRegistration.to_string(), "Invalid registration data");
        assert_eq!(
            RelayError::MissingEmailFields.to_string(),
            "Missing required fields for email."
        );
        assert_eq!(RelayError::PhoneNotConnected.to_string(), "Phone not connected");
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            CollaboratorError::from_status(400, "bad".into()),
            CollaboratorError::Rejected { status: 400, .. }
        ));
        assert!(matches!(
            CollaboratorError::from_status(401, "auth".into()),
            CollaboratorError::Rejected { .. }
        ));
        assert!(matches!(
            CollaboratorError::from_status(503, "down".into()),
            CollaboratorError::ServerError { status: 503, .. }
        ));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(
            CollaboratorError::Storage("disk full".into()).error_kind(),
            "storage_error"
        );
        assert_eq!(
            CollaboratorError::Timeout(Duration::from_secs(10)).error_kind(),
            "timeout"
        );
        assert_eq!(RelayError::MalformedEvent.error_kind(), "malformed_event");
    }
}
