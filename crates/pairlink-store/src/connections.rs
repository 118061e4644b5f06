use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pairlink_core::collaborators::{ConnectionStatus, StatusRecorder};
use pairlink_core::{CollaboratorError, Role, SessionToken};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::parse_enum;

/// Latest known status of one `(token, role)` pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRow {
    pub id: i64,
    pub auth_token: String,
    pub device_type: Role,
    pub status: ConnectionStatus,
    pub timestamp: String,
}

const SELECT_COLUMNS: &str = "SELECT id, auth_token, device_type, status, timestamp FROM connections";

fn map_row(row: &rusqlite::Row<'_>) -> Result<ConnectionRow, StoreError> {
    let device_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(ConnectionRow {
        id: row.get(0)?,
        auth_token: row.get(1)?,
        device_type: parse_enum(&device_type, "connections", "device_type")?,
        status: parse_enum(&status, "connections", "status")?,
        timestamp: row.get(4)?,
    })
}

#[derive(Clone)]
pub struct ConnectionRepo {
    db: Database,
}

impl ConnectionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or update the status for `(token, role)`, refreshing its timestamp.
    #[instrument(skip_all, fields(token = %token, role = %role, status = %status))]
    pub fn record_status(
        &self,
        token: &SessionToken,
        role: Role,
        status: ConnectionStatus,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO connections (auth_token, device_type, status, timestamp)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(auth_token, device_type) DO UPDATE SET
                     status = excluded.status,
                     timestamp = excluded.timestamp",
                rusqlite::params![token.as_str(), role.as_str(), status.as_str(), now],
            )?;
            Ok(())
        })
    }

    #[instrument(skip_all, fields(token = %token, role = %role))]
    pub fn get(&self, token: &SessionToken, role: Role) -> Result<ConnectionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE auth_token = ?1 AND device_type = ?2"
            ))?;
            let mut rows = stmt.query(rusqlite::params![token.as_str(), role.as_str()])?;
            match rows.next()? {
                Some(row) => map_row(row),
                None => Err(StoreError::NotFound(format!("connection {token}/{role}"))),
            }
        })
    }

    /// All rows, most recently changed first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<ConnectionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC"))?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(map_row(row)?);
            }
            Ok(out)
        })
    }
}

#[async_trait]
impl StatusRecorder for ConnectionRepo {
    async fn record_status(
        &self,
        token: &SessionToken,
        role: Role,
        status: ConnectionStatus,
    ) -> Result<(), CollaboratorError> {
        let repo = self.clone();
        let token = token.clone();
        tokio::task::spawn_blocking(move || ConnectionRepo::record_status(&repo, &token, role, status))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;
        Ok(())
    }
}
