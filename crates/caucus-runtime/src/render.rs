//! Plain-text rendering of committee state for the terminal.

use caucus_core::{
    AttendanceStatus, ChannelState, CommitteeSnapshot, Delegation, PollWidget, ViewSelection,
    ViewerIdentity,
};

fn committee_label(snapshot: &CommitteeSnapshot) -> &str {
    if snapshot.committee_abbreviation.is_empty() {
        &snapshot.committee_name
    } else {
        &snapshot.committee_abbreviation
    }
}

fn attendance_summary(snapshot: &CommitteeSnapshot) -> String {
    let Some(session) = &snapshot.poll.attendance else {
        return "attendance: not opened".to_string();
    };
    let roll = session.roll();
    let present = snapshot
        .delegations
        .iter()
        .filter(|d| roll.contains_key(&d.delegation_id))
        .count();
    let phase = if session.live { "open" } else { "closed" };
    format!(
        "attendance {phase}: {present}/{} present",
        snapshot.delegations.len()
    )
}

fn voting_summary(snapshot: &CommitteeSnapshot) -> String {
    let Some(session) = &snapshot.poll.voting else {
        return "voting: not opened".to_string();
    };
    let tally = session.tally();
    let phase = if session.live { "open" } else { "closed" };
    format!(
        "voting {phase}: yes {} / no {} / abstain {}",
        tally.yes, tally.no, tally.abstain
    )
}

/// One line per store notification.
pub fn status_line(
    snapshot: &CommitteeSnapshot,
    view: &ViewSelection,
    identity: Option<&ViewerIdentity>,
    attendance: Option<AttendanceStatus>,
) -> String {
    let mut parts = vec![
        format!("{} [{}]", committee_label(snapshot), snapshot.status.as_str()),
        format!("procedure: {}", snapshot.procedure),
    ];
    match view.poll_widget {
        Some(PollWidget::Attendance) => parts.push(attendance_summary(snapshot)),
        Some(PollWidget::Voting) => parts.push(voting_summary(snapshot)),
        None => {}
    }
    if view.admin_controls {
        parts.push("admin controls".to_string());
    }
    if let Some(identity) = identity {
        parts.push(format!(
            "{}: {}",
            identity.delegation_name,
            attendance.unwrap_or_default().as_str()
        ));
    }
    parts.join(" | ")
}

pub fn connection_line(state: ChannelState) -> String {
    match state {
        ChannelState::Open => "connection: live".to_string(),
        ChannelState::Connecting | ChannelState::Reconnecting => {
            format!("connection: {state}, showing last known state")
        }
        ChannelState::Closed => "connection: closed".to_string(),
    }
}

pub fn delegation_table(delegations: &[Delegation]) -> String {
    if delegations.is_empty() {
        return "(no delegations)".to_string();
    }
    let width = delegations
        .iter()
        .map(|d| d.delegation_id.to_string().len())
        .max()
        .unwrap_or(1);
    delegations
        .iter()
        .map(|d| {
            let committees: Vec<String> = d.committees.iter().map(|c| c.to_string()).collect();
            if committees.is_empty() {
                format!("{:>width$}  {}", d.delegation_id.0, d.delegation_name)
            } else {
                format!(
                    "{:>width$}  {}  (committees {})",
                    d.delegation_id.0,
                    d.delegation_name,
                    committees.join(", ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
