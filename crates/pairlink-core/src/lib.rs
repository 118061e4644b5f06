pub mod collaborators;
pub mod engine;
pub mod errors;
pub mod ids;
pub mod registry;
pub mod wire;

pub use engine::RelayEngine;
pub use errors::{CollaboratorError, RelayError};
pub use ids::{ConnectionId, Role, SessionToken};
pub use registry::{PairingRegistry, SessionRegistry};
pub use wire::{Inbound, Outbound};
