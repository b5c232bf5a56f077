// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core library of the camwatch relay server.
//!
//! A WebSocket relay with presence tracking and room-scoped comment fan-out,
//! plus the camera alert intake and the stored-image API.

pub mod comments;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod storage;
pub mod sweeper;
pub mod validation;
pub mod websocket;
pub mod ws_router;

use std::sync::Arc;

use crate::comments::CommentLog;
use crate::config::Settings;
use crate::error::AppError;
use crate::mail::{LogMailer, MailDispatcher};
use crate::middleware::rate_limit::RateLimiter;
use crate::registry::PresenceRegistry;
use crate::storage::{FlatFileImageStore, ImageStore};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Presence roster, room interest and outbound queues
    pub registry: Arc<PresenceRegistry>,
    /// Server-owned comment threads
    pub comments: Arc<CommentLog>,
    /// Alert snapshots
    pub images: Arc<dyn ImageStore>,
    /// Alert notification sink
    pub mailer: Arc<dyn MailDispatcher>,
    pub settings: Arc<Settings>,
    /// Limiter for the alert endpoint
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Create a new application state around the given collaborators
    pub fn new(settings: Settings, images: Arc<dyn ImageStore>, mailer: Arc<dyn MailDispatcher>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::from_settings(&settings.rate_limit));
        Self {
            registry: Arc::new(PresenceRegistry::new()),
            comments: Arc::new(CommentLog::new()),
            images,
            mailer,
            settings: Arc::new(settings),
            rate_limiter,
        }
    }

    /// Flat-file image store under `data_dir` and the logging mailer
    pub fn from_settings(settings: Settings) -> Result<Self, AppError> {
        let images = Arc::new(FlatFileImageStore::new(&settings.data_dir)?);
        let mailer = Arc::new(LogMailer::new(&settings.mail));
        Ok(Self::new(settings, images, mailer))
    }
}
