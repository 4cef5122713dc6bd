//! Best-effort metadata probe.

use crate::core::metrics;
use crate::download::source::{MediaSource, ProbeResult};
use std::time::Duration;
use url::Url;

/// Asks the source for title, duration and size without downloading.
///
/// Never fails: errors and timeouts are logged and yield an empty result.
pub async fn probe_metadata(source: &dyn MediaSource, url: &Url, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, source.probe(url)).await {
        Ok(Ok(probe)) => probe,
        Ok(Err(e)) => {
            log::warn!("Probe via {} failed for {}: {}", source.name(), url, e);
            metrics::record_error(e.category(), "probe");
            ProbeResult::default()
        }
        Err(_) => {
            log::warn!(
                "Probe via {} timed out after {}s for {}",
                source.name(),
                timeout.as_secs(),
                url
            );
            metrics::record_error("timeout", "probe");
            ProbeResult::default()
        }
    }
}
