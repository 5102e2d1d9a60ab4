//! Session client configuration, loadable from TOML.
//!
//! ```toml
//! api_base_url = "http://localhost:8000"
//! ws_base_url = "ws://localhost:8000"
//! mutation_timeout_ms = 8000
//!
//! [reconnect]
//! initial_backoff_ms = 500
//! max_backoff_ms = 15000
//! ```

use std::path::Path;
use std::time::Duration;

use caucus_core::{CommitteeId, ReconnectPolicy};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The server broadcasts on two sockets per committee: procedure changes
/// on the session feed, roll updates on the attendance feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Session,
    Attendance,
}

impl Feed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Attendance => "attendance",
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the committee resource API.
    pub api_base_url: String,
    /// Base URL of the session transport (`ws://` or `wss://`).
    pub ws_base_url: String,
    /// Liveness signal period while the channel is open (default 1000).
    pub heartbeat_interval_ms: u64,
    /// Bound on a mutation intent's full round trip (default 8000).
    pub mutation_timeout_ms: u64,
    /// How long `load` waits for a first channel message (default 500).
    pub first_event_grace_ms: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            ws_base_url: "ws://localhost:8000".into(),
            heartbeat_interval_ms: 1_000,
            mutation_timeout_ms: 8_000,
            first_event_grace_ms: 500,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Transport address of one of a committee's broadcast feeds.
    pub fn feed_url(&self, feed: Feed, committee_id: CommitteeId) -> String {
        let base = self.ws_base_url.trim_end_matches('/');
        match feed {
            Feed::Session => format!("{base}/committees/{committee_id}/ws"),
            Feed::Attendance => format!("{base}/attendance/{committee_id}/ws"),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    pub fn first_event_grace(&self) -> Duration {
        Duration::from_millis(self.first_event_grace_ms)
    }
}
