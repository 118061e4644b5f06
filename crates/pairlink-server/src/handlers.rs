//! Plain HTTP endpoints served next to the socket.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pairlink_core::collaborators::{Attachment, EmailRequest};
use pairlink_core::RelayError;
use pairlink_store::ConnectionRow;
use serde_json::json;

use crate::server::AppState;

/// Form field carrying the optional email attachment.
pub const ATTACHMENT_FIELD: &str = "image";

/// Failure of an HTTP request, rendered as a plain-text body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "connections": state.clients.count(),
    }))
}

/// Latest status row per `(token, role)`, most recent first.
pub async fn list_connections(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectionRow>>, ApiError> {
    let Some(repo) = state.connections.clone() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Persistence is disabled.",
        ));
    };

    let rows = tokio::task::spawn_blocking(move || repo.list())
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            tracing::error!(error = %e, "failed to list connections");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Error reading connections.")
        })?;
    Ok(Json(rows))
}

#[derive(Default)]
struct EmailForm {
    title: Option<String>,
    body: Option<String>,
    toaddr: Option<String>,
    attachment: Option<Attachment>,
}

impl EmailForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let bad_form = |e: axum::extract::multipart::MultipartError| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid form data: {e}"))
        };

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = Some(field.text().await.map_err(bad_form)?),
                "body" => form.body = Some(field.text().await.map_err(bad_form)?),
                "toaddr" => form.toaddr = Some(field.text().await.map_err(bad_form)?),
                ATTACHMENT_FIELD => {
                    let filename = field.file_name().unwrap_or("attachment").to_string();
                    let content_type = field.content_type().map(str::to_owned);
                    let content = field.bytes().await.map_err(bad_form)?;
                    if !content.is_empty() {
                        form.attachment = Some(Attachment {
                            filename,
                            content_type,
                            content: content.to_vec(),
                        });
                    }
                }
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }
        Ok(form)
    }

    fn into_request(self) -> Option<EmailRequest> {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        Some(EmailRequest {
            title: present(self.title)?,
            body: present(self.body)?,
            recipient: present(self.toaddr)?,
            attachment: self.attachment,
        })
    }
}

/// Send one email from a multipart form, waiting for the delivery result.
pub async fn send_email(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<&'static str, ApiError> {
    let request = EmailForm::read(multipart)
        .await?
        .into_request()
        .ok_or_else(|| {
            ApiError::new(StatusCode::BAD_REQUEST, RelayError::MissingEmailFields.to_string())
        })?;

    let Some(email) = state.email.as_ref().map(Arc::clone) else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Email delivery is not configured.",
        ));
    };

    match email.send_email(&request).await {
        Ok(()) => {
            tracing::info!(
                to = %request.recipient,
                attachment = request.attachment.is_some(),
                "email sent via HTTP endpoint"
            );
            Ok("Email sent successfully.")
        }
        Err(e) => {
            tracing::warn!(
                to = %request.recipient,
                kind = e.error_kind(),
                error = %e,
                "email delivery failed"
            );
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Error sending email."))
        }
    }
}
