use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::UnknownCode;

/// Implements the integer wire encoding shared by every coded enum the
/// committee API exchanges (`TryFrom<u8>` in, `From<Self> for u8` out).
macro_rules! wire_code {
    ($ty:ident, $kind:literal, { $($variant:ident = $code:literal),+ $(,)? }) => {
        impl $ty {
            pub fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $code,)+
                }
            }
        }

        impl TryFrom<u8> for $ty {
            type Error = UnknownCode;

            fn try_from(code: u8) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok(Self::$variant),)+
                    other => Err(UnknownCode {
                        kind: $kind,
                        code: i128::from(other),
                    }),
                }
            }
        }

        impl From<$ty> for u8 {
            fn from(value: $ty) -> u8 {
                value.code()
            }
        }
    };
}

// ─── Identifiers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitteeId(pub u32);

impl fmt::Display for CommitteeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationId(pub u32);

impl fmt::Display for DelegationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Procedure & Session Status ───────────────────────────────────

/// The committee's current mode of operation. Exactly one is active.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Procedure {
    /// Normal floor, no poll running.
    #[default]
    None,
    Voting,
    Attendance,
}

wire_code!(Procedure, "procedure", { None = 1, Voting = 2, Attendance = 3 });

impl Procedure {
    pub const ALL: [Self; 3] = [Self::None, Self::Voting, Self::Attendance];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Voting => "voting",
            Self::Attendance => "attendance",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SessionStatus {
    InSession,
    Suspended,
    #[default]
    OutOfSession,
    Unmoderated,
    Moderated,
}

wire_code!(SessionStatus, "session status", {
    InSession = 1,
    Suspended = 2,
    OutOfSession = 3,
    Unmoderated = 4,
    Moderated = 5,
});

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InSession => "in session",
            Self::Suspended => "suspended",
            Self::OutOfSession => "out of session",
            Self::Unmoderated => "unmoderated caucus",
            Self::Moderated => "moderated caucus",
        }
    }
}

// ─── Attendance & Votes ───────────────────────────────────────────

/// A submitted attendance entry. Absence has no wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AttendanceEntryType {
    Present,
    PresentAndVoting,
}

wire_code!(AttendanceEntryType, "attendance entry", { Present = 1, PresentAndVoting = 2 });

/// Derived attendance of one delegation; a missing entry means `Absent`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    Absent,
    Present,
    PresentAndVoting,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Present => "present",
            Self::PresentAndVoting => "present and voting",
        }
    }
}

impl From<AttendanceEntryType> for AttendanceStatus {
    fn from(entry: AttendanceEntryType) -> Self {
        match entry {
            AttendanceEntryType::Present => Self::Present,
            AttendanceEntryType::PresentAndVoting => Self::PresentAndVoting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Vote {
    Yes,
    No,
    Abstain,
}

wire_code!(Vote, "vote", { Yes = 1, No = 2, Abstain = 3 });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub attendance_entry_id: u32,
    pub attendance_session_id: u32,
    pub delegation_id: DelegationId,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    pub entry: AttendanceEntryType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub attendance_session_id: u32,
    pub committee_id: CommitteeId,
    pub live: bool,
    #[serde(default)]
    pub open_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub close_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub entries: Vec<AttendanceEntry>,
}

impl AttendanceSession {
    /// The roll keyed by delegation. Later entries for the same
    /// delegation replace earlier ones.
    pub fn roll(&self) -> HashMap<DelegationId, AttendanceEntryType> {
        self.entries
            .iter()
            .map(|e| (e.delegation_id, e.entry))
            .collect()
    }

    pub fn status_of(&self, delegation_id: DelegationId) -> AttendanceStatus {
        self.entries
            .iter()
            .rev()
            .find(|e| e.delegation_id == delegation_id)
            .map(|e| AttendanceStatus::from(e.entry))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub vote_id: u32,
    pub voting_session_id: u32,
    pub delegation_id: DelegationId,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    pub vote: Vote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingSession {
    pub voting_session_id: u32,
    pub committee_id: CommitteeId,
    pub live: bool,
    #[serde(default)]
    pub open_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub close_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub votes: Vec<VoteRecord>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub yes: usize,
    pub no: usize,
    pub abstain: usize,
}

impl VotingSession {
    pub fn vote_of(&self, delegation_id: DelegationId) -> Option<Vote> {
        self.votes
            .iter()
            .rev()
            .find(|v| v.delegation_id == delegation_id)
            .map(|v| v.vote)
    }

    /// Count one vote per delegation (its most recent).
    pub fn tally(&self) -> VoteTally {
        let latest: HashMap<DelegationId, Vote> = self
            .votes
            .iter()
            .map(|v| (v.delegation_id, v.vote))
            .collect();
        let mut tally = VoteTally::default();
        for vote in latest.values() {
            match vote {
                Vote::Yes => tally.yes += 1,
                Vote::No => tally.no += 1,
                Vote::Abstain => tally.abstain += 1,
            }
        }
        tally
    }
}

/// Poll-specific payload carried by the snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState {
    pub attendance: Option<AttendanceSession>,
    pub voting: Option<VotingSession>,
}

// ─── Roster & Documents ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegation_id: DelegationId,
    pub delegation_name: String,
    #[serde(default)]
    pub committees: Vec<CommitteeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingPaper {
    pub working_paper_id: u32,
    pub working_group_name: String,
    pub paper_link: String,
    pub committee_id: CommitteeId,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
}

// ─── Committee Snapshot ───────────────────────────────────────────

/// Full in-memory state of one committee session, as served by
/// `GET /committees/{id}` plus the poll payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeSnapshot {
    pub committee_id: CommitteeId,
    pub committee_name: String,
    #[serde(default)]
    pub committee_abbreviation: String,
    #[serde(default)]
    pub committee_description: String,
    #[serde(default)]
    pub committee_announcement: String,
    #[serde(default, rename = "committee_status")]
    pub status: SessionStatus,
    #[serde(default, rename = "committee_poll")]
    pub procedure: Procedure,
    #[serde(default)]
    pub speaker_list_open: bool,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
    #[serde(default)]
    pub working_papers: Vec<WorkingPaper>,
    #[serde(default)]
    pub poll: PollState,
}

impl CommitteeSnapshot {
    pub fn delegation(&self, delegation_id: DelegationId) -> Option<&Delegation> {
        self.delegations
            .iter()
            .find(|d| d.delegation_id == delegation_id)
    }

    pub fn is_member(&self, delegation_id: DelegationId) -> bool {
        self.delegation(delegation_id).is_some()
    }
}

/// Body of the admin mutation (`PATCH /committees/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeUpdate {
    pub committee_id: CommitteeId,
    pub committee_name: String,
    pub committee_abbreviation: String,
    pub committee_announcement: String,
    pub committee_description: String,
    pub committee_status: SessionStatus,
    pub committee_poll: Procedure,
    pub speaker_list_open: bool,
}

impl CommitteeUpdate {
    pub fn with_procedure(mut self, procedure: Procedure) -> Self {
        self.committee_poll = procedure;
        self
    }
}

impl From<&CommitteeSnapshot> for CommitteeUpdate {
    fn from(snapshot: &CommitteeSnapshot) -> Self {
        Self {
            committee_id: snapshot.committee_id,
            committee_name: snapshot.committee_name.clone(),
            committee_abbreviation: snapshot.committee_abbreviation.clone(),
            committee_announcement: snapshot.committee_announcement.clone(),
            committee_description: snapshot.committee_description.clone(),
            committee_status: snapshot.status,
            committee_poll: snapshot.procedure,
            speaker_list_open: snapshot.speaker_list_open,
        }
    }
}

// ─── Viewer & Connection ──────────────────────────────────────────

/// Tab-local binding of a visitor to one delegation of one committee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerIdentity {
    pub committee_id: CommitteeId,
    pub delegation_id: DelegationId,
    pub delegation_name: String,
}

/// Lifecycle of the session channel's underlying connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    #[default]
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
