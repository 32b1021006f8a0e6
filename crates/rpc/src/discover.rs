//! Instance discovery for adapters.
//!
//! Several daemon instances may serve different workspaces on one host,
//! each bound to a different port in the range. An adapter probes every
//! port's `/health` and picks the instance whose workspace folders
//! intersect its own (from `WORKSPACE_FOLDER_PATHS`); the chosen port is
//! cached in-process.

use std::time::Duration;

use {
    serde::Deserialize,
    threadmirror_common::{Error, Result},
    tokio::sync::Mutex,
    tracing::debug,
};

use crate::server::{PORT_RANGE_LEN, PORT_RANGE_START};

/// Environment variable carrying the adapter's expected workspace folders,
/// comma-separated absolute paths.
pub const WORKSPACE_FOLDERS_ENV: &str = "WORKSPACE_FOLDER_PATHS";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    #[serde(default)]
    workspace_folders: Vec<String>,
}

/// Parse the expected-workspace list from the environment.
#[must_use]
pub fn expected_workspaces_from_env() -> Vec<String> {
    std::env::var(WORKSPACE_FOLDERS_ENV)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Probing client with an in-process port cache.
pub struct DiscoveryClient {
    http: reqwest::Client,
    expected: Vec<String>,
    cached: Mutex<Option<u16>>,
}

impl DiscoveryClient {
    #[must_use]
    pub fn new(expected: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            expected,
            cached: Mutex::new(None),
        }
    }

    /// From the environment (legacy fallback: empty list accepts the first
    /// healthy instance).
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(expected_workspaces_from_env())
    }

    /// The port of the daemon serving our workspace.
    pub async fn port(&self) -> Result<u16> {
        let mut cached = self.cached.lock().await;
        if let Some(port) = *cached {
            return Ok(port);
        }
        let port = self.probe().await?;
        *cached = Some(port);
        Ok(port)
    }

    /// Forget the cached port (after a failed request, say).
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn probe(&self) -> Result<u16> {
        for port in PORT_RANGE_START..PORT_RANGE_START + PORT_RANGE_LEN {
            let url = format!("http://127.0.0.1:{port}/health");
            let response = self
                .http
                .get(&url)
                .timeout(Duration::from_millis(750))
                .send()
                .await;
            let Ok(response) = response else {
                continue;
            };
            let Ok(health) = response.json::<HealthResponse>().await else {
                debug!(port, "unparseable health response");
                continue;
            };
            if self.matches(&health.workspace_folders) {
                return Ok(port);
            }
        }
        Err(Error::not_found(if self.expected.is_empty() {
            "no bridge daemon responded on the discovery range".to_string()
        } else {
            format!(
                "no bridge daemon serves workspace(s) {}",
                self.expected.join(", ")
            )
        }))
    }

    fn matches(&self, folders: &[String]) -> bool {
        if self.expected.is_empty() {
            // Legacy fallback: first healthy instance wins.
            return true;
        }
        folders.iter().any(|f| self.expected.contains(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_expectation_accepts_anything() {
        let client = DiscoveryClient::new(Vec::new());
        assert!(client.matches(&["/some/workspace".to_string()]));
    }

    #[test]
    fn expectation_requires_intersection() {
        let client = DiscoveryClient::new(vec!["/home/u/mine".to_string()]);
        assert!(client.matches(&["/home/u/mine".to_string(), "/x".to_string()]));
        assert!(!client.matches(&["/home/u/other".to_string()]));
    }
}
