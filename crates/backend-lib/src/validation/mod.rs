// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Client event validation.
//!
//! Everything here runs before an event reaches the registry or the comment
//! log; a failure is reported back to the sending connection only.

use camwatch_common::{ClientEvent, ExternalId, ThreadKind, ThreadRef};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const MAX_ID_LENGTH: usize = 128;
const MAX_COMMENT_LENGTH: usize = 10_000;

// Ids end up in logs and map keys; keep them to printable, non-control text
static ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\p{Cc}]+$").unwrap());

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("Invalid comment: {0}")]
    InvalidComment(String),

    #[error("Event {event} expects a {expected} thread")]
    ThreadMismatch {
        event: &'static str,
        expected: ThreadKind,
    },
}

impl ValidationError {
    /// Code sent back in the `error` event
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidUserId(_) => "INVALID_USER_ID",
            ValidationError::InvalidRoomId(_) => "INVALID_ROOM_ID",
            ValidationError::InvalidComment(_) => "INVALID_COMMENT",
            ValidationError::ThreadMismatch { .. } => "THREAD_MISMATCH",
        }
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

fn check_id(id: &ExternalId) -> Result<(), String> {
    let id = id.as_str();
    if id.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(format!("must be at most {MAX_ID_LENGTH} bytes"));
    }
    if !ID_REGEX.is_match(id) {
        return Err("must not contain control characters".to_string());
    }
    Ok(())
}

/// Validate an application user id
pub fn validate_user_id(id: &ExternalId) -> ValidationResult<()> {
    check_id(id).map_err(ValidationError::InvalidUserId)
}

/// Validate a course/blog room id
pub fn validate_room_id(id: &ExternalId) -> ValidationResult<()> {
    check_id(id).map_err(ValidationError::InvalidRoomId)
}

/// Validate comment text
pub fn validate_comment_text(text: &str) -> ValidationResult<()> {
    if text.trim().is_empty() {
        return Err(ValidationError::InvalidComment(
            "Comment must not be empty".to_string(),
        ));
    }
    if text.len() > MAX_COMMENT_LENGTH {
        return Err(ValidationError::InvalidComment(format!(
            "Comment cannot exceed {MAX_COMMENT_LENGTH} bytes"
        )));
    }
    Ok(())
}

fn validate_thread(
    event: &'static str,
    expected: ThreadKind,
    thread: &ThreadRef,
) -> ValidationResult<()> {
    if thread.kind() != expected {
        return Err(ValidationError::ThreadMismatch { event, expected });
    }
    validate_room_id(thread.id())
}

/// Validate a decoded client event
pub fn validate_client_event(event: &ClientEvent) -> ValidationResult<()> {
    let name = event.name();
    match event {
        ClientEvent::AddNewUser(user_id) => validate_user_id(user_id),
        ClientEvent::SendMessage(msg) => validate_user_id(&msg.receiver_id),
        ClientEvent::AddNewComment(room) => validate_room_id(room),
        ClientEvent::SendComment(new) | ClientEvent::SendCommentBlog(new) => {
            let expected = if matches!(event, ClientEvent::SendComment(_)) {
                ThreadKind::Course
            } else {
                ThreadKind::Blog
            };
            validate_thread(name, expected, &new.datas.thread)?;
            validate_comment_text(&new.datas.comment)
        },
        ClientEvent::DeleteComment(del) => validate_thread(name, ThreadKind::Course, &del.thread),
        ClientEvent::DeleteCommentBlog(del) => validate_thread(name, ThreadKind::Blog, &del.thread),
        ClientEvent::UpdateComment(upd) => {
            validate_thread(name, ThreadKind::Course, &upd.thread)?;
            validate_comment_text(&upd.comment)
        },
        ClientEvent::UpdateCommentBlog(upd) => {
            validate_thread(name, ThreadKind::Blog, &upd.thread)?;
            validate_comment_text(&upd.comment)
        },
    }
}
