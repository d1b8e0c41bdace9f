//! Checkpoint engine.
//!
//! Walks the nested-repository tree, pins every repository's current head
//! with an idempotent revision marker, and records tracked branches into the
//! manifest. The updated manifest is staged for the next commit; committing
//! itself belongs to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::CheckpointError;
use crate::manifest::{section_key, Manifest};
use crate::vcs::VcsAdapter;

/// Summary of one checkpoint pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub packages: usize,
    pub branches_recorded: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Records the live state of every nested repository.
pub struct CheckpointEngine<'a, V: VcsAdapter + ?Sized> {
    vcs: &'a V,
    manifest_file: String,
    tag_namespace: String,
}

impl<'a, V: VcsAdapter + ?Sized> CheckpointEngine<'a, V> {
    pub fn new(
        vcs: &'a V,
        manifest_file: impl Into<String>,
        tag_namespace: impl Into<String>,
    ) -> Self {
        Self {
            vcs,
            manifest_file: manifest_file.into(),
            tag_namespace: tag_namespace.into(),
        }
    }

    /// Marker label binding `(relative_path, short_revision)` to the full
    /// revision it tags.
    fn tag_label(&self, path: &str, revision: &str) -> String {
        let short = revision.get(..12).unwrap_or(revision);
        format!("{}/{}@{}", self.tag_namespace, path.replace('/', "-"), short)
    }

    /// Checkpoint the whole tree. Repeated on an unchanged tree, this
    /// produces no new markers and an unchanged manifest.
    pub async fn checkpoint(&self) -> Result<CheckpointSummary, CheckpointError> {
        let mut repos = self.vcs.enumerate_nested(true).await?;
        // Stable, deterministic order regardless of what the VCS returned.
        repos.sort_by(|a, b| a.path.cmp(&b.path));

        let manifest_path = self.vcs.workdir().join(&self.manifest_file);
        let mut manifest = match std::fs::read_to_string(&manifest_path) {
            Ok(text) => Manifest::parse(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Manifest::default(),
            Err(e) => return Err(e.into()),
        };

        let mut branches_recorded = 0;
        for repo in &repos {
            let label = self.tag_label(&repo.path, &repo.revision);
            self.vcs.tag_revision(&label, &repo.revision).await?;

            let branch_key = section_key(&repo.name, "branch");
            match self.vcs.head_branch(&repo.path).await? {
                Some(branch) => {
                    manifest.set(&branch_key, branch.clone());
                    self.vcs.set_nested_branch(&repo.name, Some(&branch)).await?;
                    branches_recorded += 1;
                }
                None => {
                    if !manifest.remove(&branch_key) {
                        debug!(package = %repo.name, "no recorded branch to remove");
                    }
                    self.vcs.set_nested_branch(&repo.name, None).await?;
                }
            }
        }

        std::fs::write(&manifest_path, manifest.serialize())?;
        self.vcs.stage_path(&self.manifest_file).await?;

        info!(packages = repos.len(), branches_recorded, "checkpoint recorded");
        Ok(CheckpointSummary {
            packages: repos.len(),
            branches_recorded,
            recorded_at: Utc::now(),
        })
    }
}
