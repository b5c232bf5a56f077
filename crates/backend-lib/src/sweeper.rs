// ============================
// crates/backend-lib/src/sweeper.rs
// ============================
//! Periodic deletion of expired images.
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::config::SweeperSettings;
use crate::error::AppError;
use crate::metrics::IMAGES_SWEPT;
use crate::storage::ImageStore;

// tokio intervals panic when `now + period` overflows an Instant
const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

fn max_age(secs: u64) -> ChronoDuration {
    i64::try_from(secs)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .unwrap_or(ChronoDuration::MAX)
}

/// Delete every image created more than `max_age` before `now`.
///
/// A failed delete is logged and skipped; returns how many were removed.
pub async fn sweep_expired(
    store: &dyn ImageStore,
    max_age: ChronoDuration,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    // an age reaching before the representable range expires nothing
    let Some(cutoff) = now.checked_sub_signed(max_age) else {
        return Ok(0);
    };
    let mut removed = 0;

    for image in store.list_images().await? {
        if image.created_at >= cutoff {
            continue;
        }
        match store.delete_image(&image.id).await {
            Ok(true) => removed += 1,
            Ok(false) => debug!(id = %image.id, "image vanished before sweep"),
            Err(e) => warn!(id = %image.id, "failed to delete expired image: {e}"),
        }
    }

    if removed > 0 {
        counter!(IMAGES_SWEPT).increment(removed as u64);
    }
    Ok(removed)
}

/// Run [`sweep_expired`] forever on the configured interval.
pub fn spawn_sweeper(store: Arc<dyn ImageStore>, settings: &SweeperSettings) -> JoinHandle<()> {
    let period = Duration::from_secs(settings.interval_secs.min(MAX_INTERVAL_SECS));
    let max_age = max_age(settings.max_age_secs);

    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            match sweep_expired(store.as_ref(), max_age, Utc::now()).await {
                Ok(0) => debug!("image sweep found nothing to delete"),
                Ok(n) => info!(removed = n, "image sweep finished"),
                Err(e) => warn!("image sweep failed: {e}"),
            }
        }
    })
}
