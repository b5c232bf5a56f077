// ============================
// crates/backend-lib/src/handlers/alert.rs
// ============================
//! Intrusion alert intake.
//!
//! The camera posts `{message, distance}` plus an optional base64 snapshot.
//! The snapshot is stored first, then the alert is handed to the mail
//! dispatcher with the snapshot attached.
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::AppError;
use crate::mail::{AlertMail, Attachment};
use crate::metrics::{ALERT_MAIL_FAILED, ALERT_RECEIVED};
use crate::storage::NewImage;
use crate::AppState;

const DEFAULT_FILENAME: &str = "snapshot.jpg";
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Body of `POST /api/alert`
#[derive(Debug, Default, Deserialize)]
pub struct AlertRequest {
    #[serde(default)]
    pub message: Option<String>,
    /// Centimetres, as a number or a string
    #[serde(default)]
    pub distance: Option<Value>,
    /// Base64-encoded snapshot
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

fn distance_text(distance: &Value) -> Option<String> {
    match distance {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn missing_fields() -> AppError {
    AppError::InvalidInput("Missing required fields".to_string())
}

/// Summary line of the alert mail
pub fn alert_text(message: &str, distance: &str) -> String {
    format!("{message} Distance: {distance} cm.")
}

/// `POST /api/alert`
pub async fn send_alert(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AlertRequest>,
) -> Result<Response, AppError> {
    counter!(ALERT_RECEIVED).increment(1);

    let message = req
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(missing_fields)?
        .to_string();
    let distance = req
        .distance
        .as_ref()
        .and_then(distance_text)
        .ok_or_else(missing_fields)?;

    let mut attachment = None;
    let mut image_id = None;
    if let Some(encoded) = req.image.as_deref() {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AppError::InvalidInput(format!("image is not valid base64: {e}")))?;
        let filename = req.filename.unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let content_type = req
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let meta = state
            .images
            .save_image(
                bytes.clone(),
                NewImage {
                    filename: filename.clone(),
                    content_type: content_type.clone(),
                    message: Some(message.clone()),
                    distance: Some(distance.clone()),
                },
            )
            .await?;
        info!(id = %meta.id, size = meta.size, "alert snapshot stored");

        image_id = Some(meta.id);
        attachment = Some(Attachment {
            filename,
            content_type,
            bytes,
        });
    }

    let mail = AlertMail {
        subject: state.settings.mail.subject.clone(),
        text: alert_text(&message, &distance),
        body_fields: vec![
            ("message".to_string(), message),
            ("distance".to_string(), distance),
        ],
        attachment,
    };

    match state.mailer.send_alert(mail).await {
        Ok(()) => {
            info!("alert notification sent");
            let body = json!({
                "success": true,
                "message": "Notification sent",
                "image_id": image_id,
            });
            Ok((StatusCode::OK, Json(body)).into_response())
        },
        Err(e) => {
            error!("failed to send alert notification: {e}");
            counter!(ALERT_MAIL_FAILED).increment(1);
            let body = json!({
                "success": false,
                "error": "Failed to send notification",
            });
            Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_accepts_numbers_and_strings() {
        assert_eq!(distance_text(&json!(42)), Some("42".to_string()));
        assert_eq!(distance_text(&json!(12.5)), Some("12.5".to_string()));
        assert_eq!(distance_text(&json!(" 30 ")), Some("30".to_string()));
        assert_eq!(distance_text(&json!("")), None);
        assert_eq!(distance_text(&Value::Null), None);
    }

    #[test]
    fn test_alert_text() {
        assert_eq!(
            alert_text("Intruder at the gate", "85"),
            "Intruder at the gate Distance: 85 cm."
        );
    }
}
