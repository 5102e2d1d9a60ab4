//! Error types for the pure committee-session core.

use thiserror::Error;

use crate::types::{CommitteeId, DelegationId};

/// An integer wire code that does not map to any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} code: {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: i128,
}

/// An inbound session frame that could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    UnknownCode(#[from] UnknownCode),

    #[error("unsupported frame shape: {0}")]
    UnsupportedShape(String),
}

/// A delegation selection the identity resolver refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("delegation {delegation_id} is not a member of committee {committee_id}")]
    NotMember {
        committee_id: CommitteeId,
        delegation_id: DelegationId,
    },

    #[error("committee {0} has no loaded snapshot to select from")]
    SnapshotUnavailable(CommitteeId),
}
