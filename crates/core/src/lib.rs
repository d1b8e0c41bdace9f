//! Grove core library.
//!
//! Grove manages packages as nested git repositories pinned to specific
//! revisions: one top-level repository enumerates what is installed, and
//! each installed package is itself a full repository. This crate provides
//! the manifest model, the VCS adapter boundary, and the three engines built
//! on them: checkpoint, restore, and reconciliation.

pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod manifest;
pub mod reconcile;
pub mod restore;
pub mod vcs;

// Re-exports for convenience.
pub use checkpoint::CheckpointEngine;
pub use config::GroveConfig;
pub use errors::CoreError;
pub use manifest::Manifest;
pub use reconcile::ReconcileEngine;
pub use restore::RestoreEngine;
pub use vcs::{GitCli, VcsAdapter};
