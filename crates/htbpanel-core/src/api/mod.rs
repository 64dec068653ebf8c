//! Remote lab API.
//!
//! [`LabApi`] is the capability set the store sync and the session
//! reconciler consume; [`HtbClient`] implements it over the REST API v4.

mod client;
pub mod types;


pub use client::HtbClient;
pub use types::{FlagResponse, MachineBatch, MachineRecord, TagBatch, TagRecord, VpnRecord};

use crate::error::Result;
use crate::models::{ActiveBox, ActiveVpn, MachineAction, UserInfo};

/// Authenticated calls against the lab platform.
///
/// Implementations own their request timeouts and report one failure per
/// call; callers never retry automatically.
#[allow(async_fn_in_trait)]
pub trait LabApi {
    async fn fetch_user_info(&self) -> Result<UserInfo>;

    /// Machines in the current playable rotation.
    async fn fetch_playable_machines(&self) -> Result<Vec<MachineRecord>>;

    /// Every retired machine, across all pages.
    async fn fetch_retired_machines(&self) -> Result<Vec<MachineRecord>>;

    /// Playable and retired listings together.
    async fn fetch_boxes(&self) -> Result<MachineBatch> {
        let active = self.fetch_playable_machines().await?;
        let retired = self.fetch_retired_machines().await?;
        Ok(MachineBatch { active, retired })
    }

    async fn fetch_vpns(&self) -> Result<Vec<VpnRecord>>;

    async fn fetch_tags(&self, machine_ids: &[i64]) -> Result<TagBatch>;

    /// The running machine, `None` when nothing is spawned.
    async fn fetch_active_box(&self) -> Result<Option<ActiveBox>>;

    async fn fetch_active_vpn(&self) -> Result<ActiveVpn>;

    async fn machine_action(&self, action: MachineAction, machine_id: i64) -> Result<()>;

    async fn submit_flag(&self, machine_id: i64, flag: &str) -> Result<FlagResponse>;
}
