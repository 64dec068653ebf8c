//! htbpanel CLI Library
//!
//! Terminal front-end for the lab dashboard: catalog sync and listings,
//! machine lifecycle actions and flag submission.

pub mod catalog_cmd;
pub mod context;
pub mod fmt;
pub mod machine_cmd;
