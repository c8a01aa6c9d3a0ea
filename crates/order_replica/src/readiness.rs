//! Startup gate that waits for a dependency to answer.

use crate::traits::ReadinessProbe;
use std::time::Duration;
use tracing::{info, warn};

/// Poll `probe` every `interval` until it succeeds. Returns the number of
/// failed attempts.
pub async fn wait_until_ready(probe: &dyn ReadinessProbe, interval: Duration) -> u32 {
    let mut failures = 0;

    loop {
        match probe.probe().await {
            Ok(()) => {
                info!("{} is ready", probe.name());
                return failures;
            }
            Err(e) => {
                failures += 1;
                warn!(
                    "{} not ready (attempt {}): {}. Retrying in {:?}",
                    probe.name(),
                    failures,
                    e,
                    interval
                );
                tokio::time::sleep(interval).await;
            }
        }
    }
}
