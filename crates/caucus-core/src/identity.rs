//! Delegation identity: validating a visitor's delegation pick and
//! deriving that delegation's poll status from a snapshot.

use crate::error::SelectionError;
use crate::types::{
    AttendanceStatus, CommitteeSnapshot, DelegationId, PollState, ViewerIdentity, Vote,
};

/// Bind `delegation_id` to the committee in `snapshot`. Only current
/// members of the committee are selectable.
pub fn resolve_selection(
    snapshot: &CommitteeSnapshot,
    delegation_id: DelegationId,
) -> Result<ViewerIdentity, SelectionError> {
    let delegation =
        snapshot
            .delegation(delegation_id)
            .ok_or(SelectionError::NotMember {
                committee_id: snapshot.committee_id,
                delegation_id,
            })?;
    Ok(ViewerIdentity {
        committee_id: snapshot.committee_id,
        delegation_id,
        delegation_name: delegation.delegation_name.clone(),
    })
}

/// Attendance of `delegation_id` in the latest attendance session.
/// No session, or no entry for the delegation, means absent.
pub fn attendance_status(poll: &PollState, delegation_id: DelegationId) -> AttendanceStatus {
    poll.attendance
        .as_ref()
        .map(|session| session.status_of(delegation_id))
        .unwrap_or_default()
}

pub fn vote_status(poll: &PollState, delegation_id: DelegationId) -> Option<Vote> {
    poll.voting.as_ref()?.vote_of(delegation_id)
}
