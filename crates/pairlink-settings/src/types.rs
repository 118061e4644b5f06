//! Settings type definitions.
//!
//! JSON field names are camelCase. Every section is `#[serde(default)]`, so a
//! settings file only needs the keys it changes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};
use crate::loader::pairlink_home;

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PairlinkSettings {
    pub server: ServerSettings,
    pub persistence: PersistenceSettings,
    pub push: PushSettings,
    pub email: EmailSettings,
    pub logging: LoggingSettings,
}

impl PairlinkSettings {
    /// Reject values that would only fail later at bind or connect time.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(SettingsError::InvalidValue("server.port must be non-zero".into()));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxSendQueue must be non-zero".into(),
            ));
        }
        if self.persistence.enabled && self.persistence.db_path.is_empty() {
            return Err(SettingsError::InvalidValue(
                "persistence.dbPath is required when persistence is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Outbound frames buffered per connection before relays are dropped.
    pub max_send_queue: usize,
    /// Directory served for non-API paths. `None` disables static serving.
    pub static_dir: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            max_send_queue: 256,
            static_dir: Some("public".to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceSettings {
    pub enabled: bool,
    pub db_path: String,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: pairlink_home()
                .join("connections.db")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushSettings {
    pub endpoint: String,
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Notification heading shown above the message.
    pub heading: String,
    pub timeout_ms: u64,
}

impl PushSettings {
    pub fn is_configured(&self) -> bool {
        self.app_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.api_key.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://onesignal.com/api/v1/notifications".to_string(),
            app_id: None,
            api_key: None,
            heading: "Alert".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for PushSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushSettings")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("heading", &self.heading)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailSettings {
    /// HTTP endpoint of the transactional email API.
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub from: Option<String>,
    pub subject: String,
    /// Name shown in the footer of rendered emails.
    pub brand: String,
    pub timeout_ms: u64,
}

impl EmailSettings {
    pub fn is_configured(&self) -> bool {
        self.endpoint.as_deref().is_some_and(|s| !s.is_empty())
            && self.api_key.as_deref().is_some_and(|s| !s.is_empty())
            && self.from.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            from: None,
            subject: "Notification".to_string(),
            brand: "pairlink".to_string(),
            timeout_ms: 15_000,
        }
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .field("subject", &self.subject)
            .field("brand", &self.brand)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module level overrides, e.g. `{"pairlink_core": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
