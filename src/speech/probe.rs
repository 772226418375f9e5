//! Startup capability probe
//!
//! Only the TTS server is probed: one health check with a short timeout.
//! Hosted backends count as available when they are configured, and the
//! local model is discovered on first use. A failed probe is not retried.

use crate::state::config::Endpoints;
use log::{info, warn};
use std::time::Duration;

/// Health check timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Which backends were found reachable at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Availability {
    /// `GET {server}/health` answered with a success status
    pub server_reachable: bool,
}

/// Probe the configured backends
pub async fn probe(client: &reqwest::Client, endpoints: &Endpoints) -> Availability {
    let url = format!("{}/health", endpoints.server_url);

    let server_reachable = match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) if response.status().is_success() => {
            info!("TTS server detected at {}", endpoints.server_url);
            true
        }
        Ok(response) => {
            warn!("TTS server health check returned {}", response.status());
            false
        }
        Err(e) => {
            info!("TTS server not available, will use fallbacks: {}", e);
            false
        }
    };

    Availability { server_reachable }
}
