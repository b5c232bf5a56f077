// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers for the alert and image API.

pub mod alert;
pub mod images;

/// Liveness line served on `/`
pub async fn index() -> &'static str {
    "Relay server is running"
}
