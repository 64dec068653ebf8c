//! Session reconciliation.
//!
//! [`SessionReconciler`] owns the in-memory view of the running machine and
//! VPN assignment. Every reload replaces both snapshots together and
//! publishes the result on a watch channel; the presentation layer
//! re-renders from that channel.

use std::collections::BTreeSet;
use std::fmt;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{LabApi, MachineBatch};
use crate::db::DatabaseError;
use crate::error::{Error, Result};
use crate::flag::validate_flag;
use crate::models::{ActiveBox, ActiveVpn, MachineAction, OwnType};
use crate::storage::Database;

/// Whether a machine is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Running,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// Snapshot of what is running right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub active_box: Option<ActiveBox>,
    /// `None` until the first successful reload.
    pub active_vpn: Option<ActiveVpn>,
}

impl SessionState {
    pub const fn activity(&self) -> Activity {
        if self.active_box.is_some() {
            Activity::Running
        } else {
            Activity::Idle
        }
    }
}

/// Result of [`SessionReconciler::refresh_catalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRefresh {
    /// The playable rotation matched the cache; nothing was written.
    Unchanged,
    Updated { new_ids: Vec<i64> },
}

/// Result of a flag submission the platform answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagOutcome {
    /// Wrong flag. Nothing was changed.
    Rejected { message: String },
    Accepted { own_type: OwnType, message: String },
}

/// Keeps the session snapshot consistent with the lab platform and writes
/// availability and ownership changes back into the store.
pub struct SessionReconciler<A> {
    api: A,
    db: Database,
    state_tx: watch::Sender<SessionState>,
}

impl<A: LabApi> SessionReconciler<A> {
    pub fn new(api: A, db: Database) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self { api, db, state_tx }
    }

    pub const fn api(&self) -> &A {
        &self.api
    }

    pub const fn db(&self) -> &Database {
        &self.db
    }

    /// Current snapshot.
    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Receiver notified after every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Refetch the running machine and VPN and replace the snapshot.
    ///
    /// Both calls must succeed; on failure the previous snapshot stays
    /// published untouched.
    pub async fn reload(&self) -> Result<SessionState> {
        let state = match self.fetch_session().await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    error = %e,
                    transient = e.is_transient(),
                    "Reload failed, keeping previous snapshot"
                );
                return Err(e);
            }
        };
        let previous = self.state_tx.send_replace(state.clone());
        if previous.activity() != state.activity() {
            info!(from = %previous.activity(), to = %state.activity(), "Session activity changed");
        }
        Ok(state)
    }

    async fn fetch_session(&self) -> Result<SessionState> {
        let active_box = self.api.fetch_active_box().await?;
        let active_vpn = self.api.fetch_active_vpn().await?;
        Ok(SessionState {
            active_box,
            active_vpn: Some(active_vpn),
        })
    }

    /// Persist newly playable machines and recompute availability.
    ///
    /// No-op when every playable id is already recorded active.
    pub async fn refresh_catalog(&self) -> Result<CatalogRefresh> {
        let playable = self.api.fetch_playable_machines().await?;
        let known: BTreeSet<i64> = self.db.active_machine_ids().await?.into_iter().collect();
        let new_ids: Vec<i64> = playable
            .iter()
            .map(|m| m.id)
            .filter(|id| !known.contains(id))
            .collect();
        if new_ids.is_empty() {
            return Ok(CatalogRefresh::Unchanged);
        }

        let retired = self.api.fetch_retired_machines().await?;
        let batch = MachineBatch {
            active: playable,
            retired,
        }
        .with_free_retired();
        self.db.add_machines(&batch).await?;
        self.db
            .apply_availability(&batch.active_ids(), &batch.free_ids())
            .await?;

        info!(new = new_ids.len(), "Catalog refreshed with new machines");
        Ok(CatalogRefresh::Updated { new_ids })
    }

    /// Submit a flag and record the captured ownership.
    pub async fn submit_flag(&self, machine_id: i64, token: &str) -> Result<FlagOutcome> {
        let flag = validate_flag(token)?;
        let resp = self.api.submit_flag(machine_id, flag).await?;

        if resp.is_incorrect() {
            warn!(machine_id, message = %resp.message, "Flag rejected");
            return Ok(FlagOutcome::Rejected {
                message: resp.message,
            });
        }

        let own_type: OwnType = resp
            .own_type
            .as_deref()
            .ok_or_else(|| Error::MalformedResponse("flag reply has no own_type".into()))?
            .parse()
            .map_err(Error::MalformedResponse)?;

        // A machine missing from the catalog gets no local mark.
        match self.db.set_owned(machine_id, own_type).await {
            Ok(()) => {}
            Err(DatabaseError::NotFound(_)) => {
                warn!(
                    machine_id,
                    %own_type,
                    "Flag accepted for a machine missing from the catalog"
                );
            }
            Err(e) => return Err(e.into()),
        }
        self.state_tx.send_if_modified(|state| match &mut state.active_box {
            Some(active) if active.id == machine_id && !active.is_owned(own_type) => {
                match own_type {
                    OwnType::User => active.user_owned = true,
                    OwnType::Root => active.root_owned = true,
                }
                true
            }
            _ => false,
        });

        info!(machine_id, %own_type, "Flag accepted");
        Ok(FlagOutcome::Accepted {
            own_type,
            message: resp.message,
        })
    }

    /// Run a lifecycle action, then reload to observe its effect.
    pub async fn machine_action(
        &self,
        action: MachineAction,
        machine_id: i64,
    ) -> Result<SessionState> {
        self.api.machine_action(action, machine_id).await?;
        self.reload().await
    }
}
