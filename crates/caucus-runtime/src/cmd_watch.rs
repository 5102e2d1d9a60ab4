//! `caucus watch`: follow a committee session live.

use std::sync::Arc;

use anyhow::Context;
use caucus_core::{ChannelState, CommitteeId, CommitteeSnapshot, DelegationId, select_view};
use caucus_session::{CommitteeStore, DelegationResolver};
use tokio::sync::watch;

use crate::cli::WatchOpts;
use crate::render;
use crate::settings::Settings;

/// Entry point for `caucus watch`.
pub async fn cmd_watch(settings: &Settings, opts: &WatchOpts) -> anyhow::Result<()> {
    let committee_id = CommitteeId(opts.committee_id);
    let store = CommitteeStore::new(
        committee_id,
        Arc::new(settings.api()),
        settings.session.clone(),
    );
    let resolver = Arc::new(DelegationResolver::new(store.reader()));
    let viewer = settings.viewer(opts.user.as_deref());

    store.load().await.with_context(|| {
        format!(
            "cannot load committee {committee_id}; check that it exists and that {} is reachable, then retry",
            settings.session.api_base_url
        )
    })?;

    if let Some(delegation) = opts.delegation {
        let identity = resolver.select(DelegationId(delegation))?;
        tracing::info!(delegation = %identity.delegation_name, "following delegation");
    }

    let print_status = {
        let resolver = Arc::clone(&resolver);
        move |snapshot: &CommitteeSnapshot| {
            let view = select_view(snapshot.procedure, &viewer);
            let identity = resolver.current_identity();
            println!(
                "{}",
                render::status_line(
                    snapshot,
                    &view,
                    identity.as_ref(),
                    resolver.status_in(snapshot)
                )
            );
        }
    };
    if let Some(snapshot) = store.current().ready() {
        print_status(snapshot.as_ref());
    }
    store.subscribe(print_status);

    let mut connection = store.connection_watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => { break; }
            state = next_state(&mut connection) => match state {
                Some(state) => println!("{}", render::connection_line(state)),
                None => break,
            },
        }
    }

    store.close();
    Ok(())
}

async fn next_state(rx: &mut Option<watch::Receiver<ChannelState>>) -> Option<ChannelState> {
    let rx = rx.as_mut()?;
    rx.changed().await.ok()?;
    let state = *rx.borrow_and_update();
    Some(state)
}
