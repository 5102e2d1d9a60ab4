//! Error types for the session IO boundary.

use std::path::PathBuf;
use std::time::Duration;

use caucus_core::{CommitteeId, DecodeError};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Transport-level failure of the session channel. Recovered locally by
/// reconnecting; surfaced to the view only as connectivity state.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },

    #[error("session connection dropped: {0}")]
    Dropped(#[source] Box<tungstenite::Error>),

    #[error("server closed the session connection")]
    ClosedByPeer,

    #[error("malformed session frame: {0}")]
    MalformedFrame(#[from] DecodeError),
}

/// Failure talking to the committee resource API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The initial snapshot fetch failed. Fatal for this store instance.
    #[error("loading committee {committee_id} failed: {source}")]
    Load {
        committee_id: CommitteeId,
        #[source]
        source: ApiError,
    },

    #[error("committee {0} has not finished loading")]
    NotLoaded(CommitteeId),

    /// No confirming broadcast arrived in time. Local state is unchanged.
    #[error("no broadcast confirmed the change within {0:?}")]
    MutationTimeout(Duration),

    #[error("mutation request failed: {0}")]
    Mutation(#[source] ApiError),

    #[error("session store for committee {0} is closed")]
    Closed(CommitteeId),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
