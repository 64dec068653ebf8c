//! Initial catalog population and tag backfill.
//!
//! Each step is skipped when the cache already holds data, unless forced.

use tracing::info;

use crate::api::LabApi;
use crate::error::Result;
use crate::storage::Database;

/// Cache the VPN server list. Returns how many servers were received.
pub async fn ensure_vpns<A: LabApi>(db: &Database, api: &A, force: bool) -> Result<usize> {
    if !force && db.count_vpns().await? > 0 {
        return Ok(0);
    }
    let vpns = api.fetch_vpns().await?;
    db.add_vpns(&vpns).await?;
    Ok(vpns.len())
}

/// Cache every playable and retired machine, then recompute availability.
pub async fn ensure_machines<A: LabApi>(db: &Database, api: &A, force: bool) -> Result<usize> {
    if !force && db.count_machines().await? > 0 {
        return Ok(0);
    }
    let batch = api.fetch_boxes().await?;
    db.add_machines(&batch).await?;
    db.apply_availability(&batch.active_ids(), &batch.free_ids())
        .await?;
    info!(
        playable = batch.active.len(),
        retired = batch.retired.len(),
        "Machine catalog synced"
    );
    Ok(batch.len())
}

/// Fetch tags for retired machines that have none. Returns links received.
pub async fn backfill_tags<A: LabApi>(db: &Database, api: &A) -> Result<usize> {
    let missing = db.machines_missing_tags().await?;
    if missing.is_empty() {
        return Ok(0);
    }
    info!(machines = missing.len(), "Backfilling machine tags");
    let batch = api.fetch_tags(&missing).await?;
    db.add_tags(&batch).await?;
    Ok(batch.links.len())
}
