//! `caucus attend`: submit attendance for a delegation.

use std::sync::Arc;

use anyhow::Context;
use caucus_core::{AttendanceEntryType, AttendanceStatus, CommitteeId, DelegationId};
use caucus_session::{CommitteeStore, DelegationResolver};

use crate::settings::Settings;

/// Entry point for `caucus attend`.
pub async fn cmd_attend(
    settings: &Settings,
    committee_id: CommitteeId,
    delegation_id: DelegationId,
    entry: AttendanceEntryType,
) -> anyhow::Result<()> {
    let store = CommitteeStore::new(
        committee_id,
        Arc::new(settings.api()),
        settings.session.clone(),
    );
    store
        .load()
        .await
        .with_context(|| format!("cannot load committee {committee_id}"))?;

    // Only members of the committee may answer its roll.
    let resolver = DelegationResolver::new(store.reader());
    let identity = resolver.select(delegation_id)?;

    store
        .request_attendance_submission(delegation_id, entry)
        .await
        .context("attendance not confirmed")?;

    let status = resolver
        .attendance_status()
        .unwrap_or(AttendanceStatus::from(entry));
    println!("{}: {}", identity.delegation_name, status.as_str());
    Ok(())
}
