//! Inbound push notifications.

pub mod envelope;
pub mod routes;

pub use envelope::{Notification, PushEnvelope, decode_notification};
pub use routes::{AppState, webhook_routes};
