//! Local catalog store.
//!
//! `SQLite` cache of machines, VPN servers and tags, plus the listing queries
//! the machine table is built from.

mod db;
pub mod filters;
pub mod models;
mod queries;
mod queries_catalog;


pub use db::Database;
pub use filters::{
    AVAILABILITY_POLICY, Availability, AvailabilityPolicy, CompletionStatus, MachineFilters,
};
pub use models::{Machine, MachineListing, NamedId};

pub use crate::db::DatabaseError;
