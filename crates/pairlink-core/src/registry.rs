use std::collections::HashMap;

use crate::ids::{ConnectionId, Role, SessionToken};

/// Per-token state: at most one connection per role.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PairingRecord {
    pub device: Option<ConnectionId>,
    pub phone: Option<ConnectionId>,
}

impl PairingRecord {
    pub fn slot(&self, role: Role) -> Option<&ConnectionId> {
        match role {
            Role::Device => self.device.as_ref(),
            Role::Phone => self.phone.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<ConnectionId> {
        match role {
            Role::Device => &mut self.device,
            Role::Phone => &mut self.phone,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.device.is_some() && self.phone.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.device.is_none() && self.phone.is_none()
    }
}

/// Storage of pairing state, injected into the relay engine.
///
/// Implementations are not synchronized; the owner serializes access.
pub trait PairingRegistry: Send {
    /// Bind `conn` to `role` for `token`, replacing whatever held that slot.
    fn register(&mut self, token: &SessionToken, role: Role, conn: ConnectionId);

    fn lookup(&self, token: &SessionToken, role: Role) -> Option<ConnectionId>;

    fn both_present(&self, token: &SessionToken) -> bool;

    /// Clear every slot held by `conn` across all tokens, dropping records
    /// that end up empty. Returns the `(token, role)` pairs cleared.
    fn remove_by_connection(&mut self, conn: &ConnectionId) -> Vec<(SessionToken, Role)>;

    /// Number of tokens with at least one occupied slot.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory pairing map keyed by session token.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    pairs: HashMap<SessionToken, PairingRecord>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, token: &SessionToken) -> Option<&PairingRecord> {
        self.pairs.get(token)
    }
}

impl PairingRegistry for SessionRegistry {
    fn register(&mut self, token: &SessionToken, role: Role, conn: ConnectionId) {
        let record = self.pairs.entry(token.clone()).or_default();
        *record.slot_mut(role) = Some(conn);
    }

    fn lookup(&self, token: &SessionToken, role: Role) -> Option<ConnectionId> {
        self.pairs.get(token).and_then(|r| r.slot(role)).cloned()
    }

    fn both_present(&self, token: &SessionToken) -> bool {
        self.pairs.get(token).is_some_and(PairingRecord::is_paired)
    }

    fn remove_by_connection(&mut self, conn: &ConnectionId) -> Vec<(SessionToken, Role)> {
        let mut cleared = Vec::new();
        self.pairs.retain(|token, record| {
            for role in Role::ALL {
                let slot = record.slot_mut(role);
                if slot.as_ref() == Some(conn) {
                    *slot = None;
                    cleared.push((token.clone(), role));
                }
            }
            !record.is_empty()
        });
        cleared
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}
