//! Restore engine.
//!
//! Brings a working tree and every nested repository back to the state the
//! manifest records at a target revision: force-update the top level, update
//! nested repositories to their pinned revisions, re-point nested heads at
//! their recorded branches, and only then clean out untracked files. The
//! destructive untracked-file removal is always the last action of the
//! sequence.

use tracing::{debug, info};

use crate::errors::RestoreError;
use crate::manifest::{section_key, Manifest, Value};
use crate::vcs::VcsAdapter;

/// Applies a recorded manifest state to the working tree.
pub struct RestoreEngine<'a, V: VcsAdapter + ?Sized> {
    vcs: &'a V,
    manifest_file: String,
}

impl<'a, V: VcsAdapter + ?Sized> RestoreEngine<'a, V> {
    pub fn new(vcs: &'a V, manifest_file: impl Into<String>) -> Self {
        Self {
            vcs,
            manifest_file: manifest_file.into(),
        }
    }

    pub async fn restore(&self, target_revision: &str) -> Result<(), RestoreError> {
        info!(target = target_revision, "restoring working tree");
        self.vcs.force_checkout(target_revision).await?;

        // Nested repositories share the local object store as a cache so a
        // restore does not re-fetch objects it already has.
        let cache = self.vcs.workdir().to_path_buf();
        self.vcs.update_nested(Some(&cache)).await?;

        self.repoint_branches().await?;

        // Destructive, runs last: undoes artifacts left by a previous
        // package installation attempt.
        self.vcs.remove_untracked().await?;
        info!("restore complete");
        Ok(())
    }

    /// Re-point each nested head with a recorded branch at that branch,
    /// positioned at the pinned revision, so later development starts from a
    /// named branch instead of a detached head. Unresolvable branches are
    /// skipped.
    async fn repoint_branches(&self) -> Result<(), RestoreError> {
        let manifest_path = self.vcs.workdir().join(&self.manifest_file);
        let manifest = match std::fs::read_to_string(&manifest_path) {
            Ok(text) => Manifest::parse(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut repos = self.vcs.enumerate_nested(true).await?;
        repos.sort_by(|a, b| a.path.cmp(&b.path));

        for repo in &repos {
            let branch = match manifest.get(&section_key(&repo.name, "branch")) {
                Some(Value::Single(branch)) => branch,
                Some(Value::Conflicted(..)) => {
                    debug!(package = %repo.name, "branch entry is conflicted, leaving head detached");
                    continue;
                }
                None => continue,
            };
            let pointed = self
                .vcs
                .checkout_nested_branch(&repo.path, branch, &repo.revision)
                .await?;
            if !pointed {
                debug!(package = %repo.name, branch, "recorded branch does not resolve, leaving head detached");
            }
        }
        Ok(())
    }
}
