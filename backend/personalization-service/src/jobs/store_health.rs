//! Store health probe
//!
//! Periodically pings the store through the shared handle. A successful
//! ping keeps the handle's health current and, after an outage, triggers
//! the handle's reconnect; failures are only logged.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::StoreConfig;
use crate::store::StoreHandle;

const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Clone)]
pub struct StoreHealthConfig {
    pub enabled: bool,
    pub check_interval: Duration,
}

impl From<&StoreConfig> for StoreHealthConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            enabled: config.health_interval_secs > 0,
            check_interval: Duration::from_secs(config.health_interval_secs),
        }
    }
}

/// Run one probe, updating the consecutive failure count.
pub async fn probe_once(store: &StoreHandle, consecutive_failures: &mut u32) {
    match store.ping().await {
        Ok(()) => {
            if *consecutive_failures > 0 {
                tracing::info!(
                    previous_failures = *consecutive_failures,
                    "Store connection recovered"
                );
            }
            *consecutive_failures = 0;
            tracing::debug!("Store health check: OK");
        }
        Err(e) => {
            *consecutive_failures += 1;
            if *consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                tracing::error!(
                    consecutive_failures = *consecutive_failures,
                    error = %e,
                    "Store health check: CRITICAL - multiple consecutive failures"
                );
            } else {
                tracing::warn!(
                    consecutive_failures = *consecutive_failures,
                    error = %e,
                    "Store health check: FAILED"
                );
            }
        }
    }
}

pub async fn start_store_health_check(store: Arc<StoreHandle>, config: StoreHealthConfig) {
    if !config.enabled {
        tracing::info!("Store health check disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.check_interval.as_secs(),
        "Starting store health check background job"
    );

    let mut consecutive_failures = 0;
    loop {
        sleep(config.check_interval).await;
        probe_once(&store, &mut consecutive_failures).await;
    }
}
