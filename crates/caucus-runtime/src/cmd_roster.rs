//! `caucus roster`: replace the committee's delegation roster.

use std::sync::Arc;

use anyhow::Context;
use caucus_core::{CommitteeId, DelegationId};
use caucus_session::{CommitteeStore, StoreError};

use crate::render::delegation_table;
use crate::settings::Settings;

/// Entry point for `caucus roster`.
pub async fn cmd_roster(
    settings: &Settings,
    committee_id: CommitteeId,
    delegations: Vec<DelegationId>,
) -> anyhow::Result<()> {
    if !settings.is_admin() {
        anyhow::bail!("editing the roster needs an administrator token (--token or CAUCUS_TOKEN)");
    }

    let store = CommitteeStore::new(
        committee_id,
        Arc::new(settings.api()),
        settings.session.clone(),
    );
    store
        .load()
        .await
        .with_context(|| format!("cannot load committee {committee_id}"))?;

    match store.request_roster_change(delegations).await {
        Ok(snapshot) => {
            let mut members = snapshot.delegations.clone();
            members.sort_by_key(|d| d.delegation_id);
            println!("{} now seats:", snapshot.committee_name);
            println!("{}", delegation_table(&members));
            Ok(())
        }
        Err(StoreError::MutationTimeout(after)) => anyhow::bail!(
            "the roster change did not complete within {after:?}; check the committee before retrying"
        ),
        Err(e) => Err(e.into()),
    }
}
