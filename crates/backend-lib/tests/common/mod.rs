//! Shared setup for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use camwatch_backend::{
    config::Settings,
    error::AppError,
    mail::{AlertMail, LogMailer, MailDispatcher},
    storage::FlatFileImageStore,
    ws_router, AppState,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Mailer that records what it was asked to send, or always fails
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<AlertMail>>,
    pub fail: bool,
}

#[async_trait]
impl MailDispatcher for RecordingMailer {
    async fn send_alert(&self, mail: AlertMail) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Mail("smtp unreachable".to_string()));
        }
        self.sent.lock().push(mail);
        Ok(())
    }
}

/// App state backed by a fresh temporary directory
pub fn state_with(settings: Settings, mailer: Arc<dyn MailDispatcher>) -> (Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let images = Arc::new(FlatFileImageStore::new(temp_dir.path()).unwrap());
    (Arc::new(AppState::new(settings, images, mailer)), temp_dir)
}

pub fn default_state() -> (Arc<AppState>, TempDir) {
    let settings = Settings::default();
    let mailer = Arc::new(LogMailer::new(&settings.mail));
    state_with(settings, mailer)
}

/// Serve the full router on an ephemeral port
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = ws_router::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    addr
}
