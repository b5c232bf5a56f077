// crates/backend-lib/src/middleware/rate_limit.rs

//! Fixed-window request limiting keyed by client IP.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::warn;

use crate::config::RateLimitSettings;
use crate::{error::AppError, AppState};

/// Rate limit entry for a client
#[derive(Debug)]
struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

/// Per-client fixed-window counter
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            entries: DashMap::new(),
            window,
            max_requests,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(Duration::from_secs(settings.window_secs), settings.max_requests)
    }

    /// Count one request for `key`; `false` once the window's budget is spent
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| RateLimitEntry {
            requests: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.requests = 0;
            entry.window_start = now;
        }

        if entry.requests >= self.max_requests {
            return false;
        }
        entry.requests += 1;
        true
    }

    /// Forget clients whose window has expired
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}

/// Client identity used as the limiter key: proxy headers first, then the
/// socket peer address.
///
/// The headers are taken at face value, so the server is expected to sit
/// behind a reverse proxy that overwrites them. Exposed directly, a caller
/// can pick its own key and step around the limit.
fn client_key(request: &Request) -> String {
    let headers = request.headers();
    if let Some(ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        return ip.trim().to_string();
    }
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
    {
        return ip.trim().to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

/// Rate limiter middleware
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&request);
    if !state.rate_limiter.check(&key) {
        warn!(client = %key, path = %request.uri().path(), "rate limit exceeded");
        return Err(AppError::RateLimitExceeded);
    }
    Ok(next.run(request).await)
}
