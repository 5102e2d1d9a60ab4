//! Session frames: decoding inbound server pushes and applying them to a
//! committee snapshot.
//!
//! The server historically pushed a bare procedure code (`2`). Richer
//! events use a `type` tag so new kinds can be added without breaking
//! older decoders: unknown tags decode to [`SessionEvent::Unrecognized`].

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DecodeError, UnknownCode};
use crate::types::{AttendanceSession, CommitteeSnapshot, Procedure, VotingSession};

/// Liveness token sent on the session channel while it is open.
pub const HEARTBEAT_TOKEN: &str = "heartbeat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The committee's active procedure changed.
    Procedure(Procedure),
    /// Attendance roll broadcast (session opened, entry submitted, closed).
    Attendance(AttendanceSession),
    /// Vote tally broadcast.
    Voting(VotingSession),
    /// A tagged event kind this client does not know.
    Unrecognized { kind: String },
}

impl SessionEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Procedure(_) => "procedure",
            Self::Attendance(_) => "attendance",
            Self::Voting(_) => "voting",
            Self::Unrecognized { kind } => kind,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedFrame {
    Procedure { procedure: Procedure },
    Attendance { session: AttendanceSession },
    Voting { session: VotingSession },
}

const KNOWN_TAGS: [&str; 3] = ["procedure", "attendance", "voting"];

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<SessionEvent, DecodeError> {
    let value: Value = serde_json::from_str(text)?;

    match value {
        Value::Number(n) => {
            let code = n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .ok_or_else(|| DecodeError::UnsupportedShape(format!("non-integer code {n}")))?;
            let code = u8::try_from(code).map_err(|_| UnknownCode {
                kind: "procedure",
                code,
            })?;
            Ok(SessionEvent::Procedure(Procedure::try_from(code)?))
        }
        Value::Object(map) => {
            if let Some(tag) = map.get("type") {
                let tag = tag
                    .as_str()
                    .ok_or_else(|| DecodeError::UnsupportedShape("non-string type tag".into()))?;
                if !KNOWN_TAGS.contains(&tag) {
                    return Ok(SessionEvent::Unrecognized {
                        kind: tag.to_owned(),
                    });
                }
                return Ok(match serde_json::from_value::<TaggedFrame>(Value::Object(map))? {
                    TaggedFrame::Procedure { procedure } => SessionEvent::Procedure(procedure),
                    TaggedFrame::Attendance { session } => SessionEvent::Attendance(session),
                    TaggedFrame::Voting { session } => SessionEvent::Voting(session),
                });
            }

            // Untagged session records, as the poll broadcasters emit them.
            if map.contains_key("attendance_session_id") {
                Ok(SessionEvent::Attendance(serde_json::from_value(Value::Object(map))?))
            } else if map.contains_key("voting_session_id") {
                Ok(SessionEvent::Voting(serde_json::from_value(Value::Object(map))?))
            } else {
                Err(DecodeError::UnsupportedShape(
                    "object without type tag or session id".into(),
                ))
            }
        }
        other => Err(DecodeError::UnsupportedShape(format!(
            "unexpected JSON {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Which part of the snapshot an event touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Procedure,
    Poll,
    /// The event did not concern this snapshot and left it untouched.
    Ignored,
}

impl Applied {
    pub fn changed(self) -> bool {
        self != Self::Ignored
    }
}

/// Patch `snapshot` with one event. Procedure events write only the
/// `procedure` field; poll events replace the matching poll payload.
/// Applying the same event twice leaves the same state.
pub fn apply_event(snapshot: &mut CommitteeSnapshot, event: &SessionEvent) -> Applied {
    match event {
        SessionEvent::Procedure(procedure) => {
            snapshot.procedure = *procedure;
            Applied::Procedure
        }
        SessionEvent::Attendance(session) if session.committee_id == snapshot.committee_id => {
            snapshot.poll.attendance = Some(session.clone());
            Applied::Poll
        }
        SessionEvent::Voting(session) if session.committee_id == snapshot.committee_id => {
            snapshot.poll.voting = Some(session.clone());
            Applied::Poll
        }
        SessionEvent::Attendance(_) | SessionEvent::Voting(_) | SessionEvent::Unrecognized { .. } => {
            Applied::Ignored
        }
    }
}
