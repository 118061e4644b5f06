use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

use pairlink_core::collaborators::{EmailDispatcher, EmailRequest};
use pairlink_core::CollaboratorError;

use crate::http;

pub struct EmailConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub from: String,
    pub subject: String,
    pub brand: String,
    pub timeout: Duration,
}

/// Transactional email over a JSON HTTP API with bearer auth.
pub struct HttpEmail {
    client: reqwest::Client,
    config: EmailConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingAttachment {
    filename: String,
    /// Base64 of the raw bytes.
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<OutgoingAttachment>,
}

impl HttpEmail {
    pub fn new(config: EmailConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: http::client(config.timeout)?,
            config,
        })
    }

    fn message<'a>(
        &'a self,
        request: &'a EmailRequest,
    ) -> Result<OutgoingEmail<'a>, CollaboratorError> {
        let attachments = request
            .attachment
            .iter()
            .map(|a| OutgoingAttachment {
                filename: a.filename.clone(),
                content: base64::engine::general_purpose::STANDARD.encode(&a.content),
                content_type: a.content_type.clone(),
            })
            .collect();

        Ok(OutgoingEmail {
            from: &self.config.from,
            to: &request.recipient,
            subject: &self.config.subject,
            html: render_email_html(&request.title, &request.body, &self.config.brand)?,
            attachments,
        })
    }
}

#[async_trait]
impl EmailDispatcher for HttpEmail {
    async fn send_email(&self, request: &EmailRequest) -> Result<(), CollaboratorError> {
        let message = self.message(request)?;
        debug!(
            to = %request.recipient,
            attachments = message.attachments.len(),
            "sending email"
        );

        let resp = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&message)
            .send()
            .await
            .map_err(|e| http::classify(e, self.config.timeout))?;
        http::check_status(resp).await?;

        info!(to = %request.recipient, "email sent");
        Ok(())
    }
}

#[derive(Template)]
#[template(path = "email.html")]
struct EmailTemplate<'a> {
    title: &'a str,
    body: &'a str,
    brand: &'a str,
}

/// Render the notification email body. Every field is HTML-escaped.
pub fn render_email_html(
    title: &str,
    body: &str,
    brand: &str,
) -> Result<String, CollaboratorError> {
    EmailTemplate { title, body, brand }
        .render()
        .map_err(|e| CollaboratorError::Template(e.to_string()))
}
