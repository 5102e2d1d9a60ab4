//! `caucus delegations`: print the delegation catalog.

use caucus_session::ResourceApi;

use crate::render::delegation_table;
use crate::settings::Settings;

/// Entry point for `caucus delegations`.
pub async fn cmd_delegations(settings: &Settings) -> anyhow::Result<()> {
    let mut delegations = settings.api().list_delegations().await?;
    delegations.sort_by_key(|d| d.delegation_id);
    println!("{}", delegation_table(&delegations));
    Ok(())
}
