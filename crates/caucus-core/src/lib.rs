//! caucus-core: pure committee-session model.
//! Domain types, session-frame decoding and snapshot patching, view
//! selection, delegation identity and reconnect backoff. No IO, no async.

pub mod backoff;
pub mod error;
pub mod event;
pub mod identity;
pub mod selector;
pub mod types;

pub use backoff::{ReconnectBackoff, ReconnectPolicy, jittered_ms};
pub use error::{DecodeError, SelectionError, UnknownCode};
pub use event::{Applied, HEARTBEAT_TOKEN, SessionEvent, apply_event, decode_frame};
pub use identity::{attendance_status, resolve_selection, vote_status};
pub use selector::{PollWidget, ViewSelection, ViewerContext, select_view};
pub use types::{
    AttendanceEntry, AttendanceEntryType, AttendanceSession, AttendanceStatus, ChannelState,
    CommitteeId, CommitteeSnapshot, CommitteeUpdate, Delegation, DelegationId, PollState,
    Procedure, SessionStatus, Vote, VoteRecord, VoteTally, ViewerIdentity, VotingSession,
    WorkingPaper,
};
