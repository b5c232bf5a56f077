// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const WS_REJECTED_FRAME: &str = "ws.rejected_frame";
pub const RELAY_DELIVERED: &str = "relay.delivered";
pub const RELAY_DROPPED: &str = "relay.dropped";
pub const RELAY_ROSTER_SIZE: &str = "relay.roster_size";
pub const ALERT_RECEIVED: &str = "alert.received";
pub const ALERT_MAIL_FAILED: &str = "alert.mail_failed";
pub const IMAGES_SWEPT: &str = "images.swept";
