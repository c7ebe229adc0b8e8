//! Sync coordinator for the remotely-sorted collections.
//!
//! A sync cycle mirrors one page of a remote listing into its collection:
//! - **Fetch**: one page from the catalog, bounded by a deadline
//! - **Transform**: records copied into rows
//! - **Replace**: a single store transaction swaps the whole collection
//! - **Notify**: one change event for the collection path

mod config;
mod coordinator;
pub mod transform;
mod types;

pub use config::SyncConfig;
pub use coordinator::{RefreshHandle, SyncCoordinator};
pub use types::{SyncError, SyncPhase, SyncReport, SyncStatus};
