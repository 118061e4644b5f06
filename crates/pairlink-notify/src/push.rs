use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info};

use pairlink_core::collaborators::PushDispatcher;
use pairlink_core::{CollaboratorError, SessionToken};

use crate::http;

/// Tag key the phone app sets to its session token when subscribing.
pub const TOKEN_TAG: &str = "auth_token";

pub struct PushConfig {
    pub endpoint: String,
    pub app_id: String,
    pub api_key: SecretString,
    pub heading: String,
    pub timeout: Duration,
}

/// OneSignal REST push, targeted at subscribers tagged with the session token.
pub struct OneSignalPush {
    client: reqwest::Client,
    config: PushConfig,
}

impl OneSignalPush {
    pub fn new(config: PushConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: http::client(config.timeout)?,
            config,
        })
    }
}

/// Request body for one notification.
pub fn push_payload(app_id: &str, heading: &str, token: &str, message: &str) -> Value {
    json!({
        "app_id": app_id,
        "filters": [
            {
                "field": "tag",
                "key": TOKEN_TAG,
                "relation": "=",
                "value": token,
            }
        ],
        "headings": { "en": heading },
        "contents": { "en": message },
    })
}

#[async_trait]
impl PushDispatcher for OneSignalPush {
    async fn send_push(&self, token: &SessionToken, message: &str) -> Result<(), CollaboratorError> {
        let body = push_payload(&self.config.app_id, &self.config.heading, token.as_str(), message);
        debug!(token = %token, "sending push notification");

        let resp = self
            .client
            .post(&self.config.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Basic {}", self.config.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| http::classify(e, self.config.timeout))?;

        let resp = http::check_status(resp).await?;
        let id = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_owned));
        info!(token = %token, notification_id = ?id, "push notification sent");
        Ok(())
    }
}
