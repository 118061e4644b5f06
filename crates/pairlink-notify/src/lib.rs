//! HTTP clients for the relay's notification side channels.

pub mod email;
pub mod http;
pub mod push;

pub use email::{render_email_html, EmailConfig, HttpEmail};
pub use push::{OneSignalPush, PushConfig};
