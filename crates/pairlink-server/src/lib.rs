pub mod client;
pub mod handlers;
pub mod relay;
pub mod server;

pub use relay::RelayMessage;
pub use server::{start, ServerConfig, ServerHandle};
