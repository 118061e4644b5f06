use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pairlink_core::collaborators::{Collaborators, EmailDispatcher, PushDispatcher, StatusRecorder};
use pairlink_notify::{EmailConfig, HttpEmail, OneSignalPush, PushConfig};
use pairlink_settings::{EmailSettings, PairlinkSettings, PushSettings};
use pairlink_store::{ConnectionRepo, Database};
use pairlink_telemetry::TelemetryConfig;
use secrecy::SecretString;

/// Pair sensor devices with phones and relay events between them.
#[derive(Debug, Parser)]
#[command(name = "pairlink", version)]
struct Cli {
    /// Settings file (defaults to ~/.pairlink/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database for connection status rows.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Do not record connection status.
    #[arg(long)]
    no_persistence: bool,
}

impl Cli {
    fn apply(&self, settings: &mut PairlinkSettings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db) = &self.db {
            settings.persistence.db_path = db.display().to_string();
        }
        if self.no_persistence {
            settings.persistence.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(pairlink_settings::settings_path);
    let mut settings = pairlink_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);
    settings
        .validate()
        .context("invalid command-line settings")?;

    let telemetry = pairlink_telemetry::init_telemetry(&TelemetryConfig::from_parts(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    ));
    tracing::info!(filter = telemetry.filter(), "Starting pairlink relay");
    tracing::debug!(?settings, "effective settings");

    let repo = if settings.persistence.enabled {
        let path = PathBuf::from(&settings.persistence.db_path);
        let db = Database::open(&path)
            .with_context(|| format!("opening database at {}", path.display()))?;
        Some(ConnectionRepo::new(db))
    } else {
        tracing::info!("persistence disabled");
        None
    };

    let mut collaborators = Collaborators::default();
    if let Some(repo) = &repo {
        let recorder: Arc<dyn StatusRecorder> = Arc::new(repo.clone());
        collaborators = collaborators.with_status(recorder);
    }
    if let Some(push) = push_dispatcher(&settings.push)? {
        collaborators = collaborators.with_push(push);
    }
    if let Some(email) = email_dispatcher(&settings.email)? {
        collaborators = collaborators.with_email(email);
    }

    let config = pairlink_server::ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        max_send_queue: settings.server.max_send_queue,
        static_dir: settings.server.static_dir.as_ref().map(PathBuf::from),
        ..Default::default()
    };
    let handle = pairlink_server::start(config, collaborators, repo)
        .await
        .context("starting server")?;

    tracing::info!(addr = %handle.addr, "pairlink relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown();
    Ok(())
}

fn push_dispatcher(settings: &PushSettings) -> anyhow::Result<Option<Arc<dyn PushDispatcher>>> {
    if !settings.is_configured() {
        tracing::info!("push notifications not configured");
        return Ok(None);
    }
    let (Some(app_id), Some(api_key)) = (&settings.app_id, &settings.api_key) else {
        return Ok(None);
    };

    let push = OneSignalPush::new(PushConfig {
        endpoint: settings.endpoint.clone(),
        app_id: app_id.clone(),
        api_key: SecretString::from(api_key.clone()),
        heading: settings.heading.clone(),
        timeout: Duration::from_millis(settings.timeout_ms),
    })
    .context("building push client")?;
    tracing::info!(endpoint = %settings.endpoint, "push notifications enabled");
    Ok(Some(Arc::new(push)))
}

fn email_dispatcher(settings: &EmailSettings) -> anyhow::Result<Option<Arc<dyn EmailDispatcher>>> {
    if !settings.is_configured() {
        tracing::info!("email delivery not configured");
        return Ok(None);
    }
    let (Some(endpoint), Some(api_key), Some(from)) =
        (&settings.endpoint, &settings.api_key, &settings.from)
    else {
        return Ok(None);
    };

    let email = HttpEmail::new(EmailConfig {
        endpoint: endpoint.clone(),
        api_key: SecretString::from(api_key.clone()),
        from: from.clone(),
        subject: settings.subject.clone(),
        brand: settings.brand.clone(),
        timeout: Duration::from_millis(settings.timeout_ms),
    })
    .context("building email client")?;
    tracing::info!(endpoint = %endpoint, "email delivery enabled");
    Ok(Some(Arc::new(email)))
}
