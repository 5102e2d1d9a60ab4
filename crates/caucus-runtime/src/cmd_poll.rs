//! `caucus poll`: switch the committee's active procedure.

use std::sync::Arc;

use anyhow::Context;
use caucus_core::{CommitteeId, Procedure};
use caucus_session::{CommitteeStore, StoreError};

use crate::settings::Settings;

/// Entry point for `caucus poll`.
pub async fn cmd_poll(
    settings: &Settings,
    committee_id: CommitteeId,
    procedure: Procedure,
) -> anyhow::Result<()> {
    if !settings.is_admin() {
        anyhow::bail!("changing the procedure needs an administrator token (--token or CAUCUS_TOKEN)");
    }

    let store = CommitteeStore::new(
        committee_id,
        Arc::new(settings.api()),
        settings.session.clone(),
    );
    let snapshot = store
        .load()
        .await
        .with_context(|| format!("cannot load committee {committee_id}"))?;

    match store.request_procedure_change(procedure).await {
        Ok(()) => {
            println!(
                "{}: procedure {} -> {}",
                snapshot.committee_name, snapshot.procedure, procedure
            );
            Ok(())
        }
        Err(StoreError::MutationTimeout(after)) => anyhow::bail!(
            "no confirmation from the session within {after:?}; the procedure may not have changed"
        ),
        Err(e) => Err(e.into()),
    }
}
