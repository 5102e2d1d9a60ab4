//! Delegation identity for one viewer of one committee.
//!
//! The binding is local to the resolver instance (one per view) and is
//! never persisted or shared. Status is always computed from the store's
//! latest snapshot, so it can never go stale.

use std::sync::{Arc, Mutex};

use caucus_core::{
    AttendanceStatus, CommitteeSnapshot, DelegationId, SelectionError, ViewerIdentity, Vote,
    attendance_status, resolve_selection, vote_status,
};
use tracing::{info, warn};

use crate::lock;
use crate::store::{SnapshotState, StoreReader, SubscriptionId};

pub struct DelegationResolver {
    reader: StoreReader,
    identity: Arc<Mutex<Option<ViewerIdentity>>>,
}

impl DelegationResolver {
    pub fn new(reader: StoreReader) -> Self {
        Self {
            reader,
            identity: Arc::new(Mutex::new(None)),
        }
    }

    /// Bind this viewer to a delegation of the committee. Fails without
    /// touching the current binding if the delegation is not a member.
    pub fn select(&self, delegation_id: DelegationId) -> Result<ViewerIdentity, SelectionError> {
        let SnapshotState::Ready(snapshot) = self.reader.current() else {
            return Err(SelectionError::SnapshotUnavailable(self.reader.committee_id()));
        };
        let identity = resolve_selection(&snapshot, delegation_id).inspect_err(|e| {
            warn!(error = %e, "delegation selection rejected");
        })?;
        info!(
            committee_id = %identity.committee_id,
            delegation = %identity.delegation_name,
            "delegation selected"
        );
        *lock(&self.identity) = Some(identity.clone());
        Ok(identity)
    }

    pub fn clear(&self) {
        lock(&self.identity).take();
    }

    pub fn current_identity(&self) -> Option<ViewerIdentity> {
        lock(&self.identity).clone()
    }

    /// Attendance of the bound delegation in the latest roll, or `None`
    /// while no delegation is selected.
    pub fn attendance_status(&self) -> Option<AttendanceStatus> {
        let snapshot = self.reader.current();
        self.status_in(snapshot.ready()?)
    }

    pub fn vote_status(&self) -> Option<Vote> {
        let delegation_id = self.bound_delegation()?;
        let snapshot = self.reader.current();
        vote_status(&snapshot.ready()?.poll, delegation_id)
    }

    /// Attendance of the bound delegation within a given snapshot. Meant
    /// for store subscribers, which already hold the latest one.
    pub fn status_in(&self, snapshot: &CommitteeSnapshot) -> Option<AttendanceStatus> {
        let delegation_id = self.bound_delegation()?;
        Some(attendance_status(&snapshot.poll, delegation_id))
    }

    /// Call `listener` with the bound delegation's status after every store
    /// change. The subscription is released with the store's
    /// `unsubscribe`, or when the store closes.
    pub fn on_status_change(
        &self,
        listener: impl Fn(Option<AttendanceStatus>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let identity = Arc::clone(&self.identity);
        self.reader.subscribe(move |snapshot| {
            let bound = lock(&identity).as_ref().map(|i| i.delegation_id);
            listener(bound.map(|id| attendance_status(&snapshot.poll, id)));
        })
    }

    fn bound_delegation(&self) -> Option<DelegationId> {
        lock(&self.identity).as_ref().map(|i| i.delegation_id)
    }
}
