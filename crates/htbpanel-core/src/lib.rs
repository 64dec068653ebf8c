//! htbpanel Core Library
//!
//! Lab dashboard core shared by the htbpanel front-ends:
//! - Local `SQLite` catalog cache with composite filter queries
//! - Session reconciliation against the lab platform
//! - Lab REST API client contract and implementation
//! - Configuration resolution and common error types

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod flag;
pub mod models;
pub mod reconciler;
pub mod storage;
pub mod sync;
pub mod tracing_init;

pub use api::{HtbClient, LabApi};
pub use config::Config;
pub use error::{Error, Result};
pub use reconciler::{Activity, CatalogRefresh, FlagOutcome, SessionReconciler, SessionState};
pub use storage::{Database, MachineFilters};
