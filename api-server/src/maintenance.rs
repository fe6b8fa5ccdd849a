//! Periodic housekeeping for the refresh-token table.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::auth::RefreshTokenStore;

/// Delete expired refresh tokens and long-revoked ones once.
pub async fn sweep_refresh_tokens(store: &RefreshTokenStore) {
    match store.purge_expired(Utc::now()).await {
        Ok(count) if count > 0 => log::info!("purged {} stale refresh tokens", count),
        Ok(_) => log::debug!("refresh token sweep found nothing to purge"),
        Err(err) => log::error!("refresh token sweep failed: {}", err),
    }
}

/// Run the sweep on a fixed interval until the runtime shuts down.
pub fn spawn_refresh_sweeper(store: RefreshTokenStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("refresh token sweep every {}s", every.as_secs());
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            sweep_refresh_tokens(&store).await;
        }
    })
}
