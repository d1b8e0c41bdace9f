//! The external version-control collaborator boundary.
//!
//! Everything grove knows about revisions, trees, and nested repositories it
//! learns through [`VcsAdapter`]. The engines never touch the VCS directly,
//! which keeps them testable against an in-memory fake and keeps all
//! subprocess plumbing in one place.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::VcsError;

/// One checked-out nested repository, discovered by traversing the working
/// tree. Consumed to populate or reconcile the manifest; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedRepo {
    /// Section name of the package.
    pub name: String,
    /// Working-tree location, relative to the top-level root.
    pub path: String,
    /// Full revision identifier of the nested repository's head.
    pub revision: String,
}

/// Result of a tree-level or nested merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Clean,
    Conflicted,
}

/// Capabilities grove requires from the underlying version-control tool.
///
/// Calls block until completion or fail; no timeouts are imposed here. A
/// non-success result aborts the current step with no rollback of completed
/// prior steps.
#[async_trait]
pub trait VcsAdapter: Send + Sync {
    /// Root of the working tree this adapter operates on. Passed explicitly
    /// everywhere; nothing depends on the ambient process directory.
    fn workdir(&self) -> &Path;

    /// Head revision of the repository at `path` (empty = top level).
    async fn head_revision(&self, path: &str) -> Result<String, VcsError>;

    /// Named branch the head at `path` is on, or `None` when detached.
    async fn head_branch(&self, path: &str) -> Result<Option<String>, VcsError>;

    /// Most recent common ancestor of two revisions.
    async fn merge_base(&self, a: &str, b: &str) -> Result<String, VcsError>;

    /// Whether the content at `path` differs between two revisions.
    async fn diff_changed(&self, a: &str, b: &str, path: &str) -> Result<bool, VcsError>;

    /// Contents of `path` as it existed at `revision`, or `None` if the file
    /// was absent at that revision.
    async fn read_blob_at(&self, revision: &str, path: &str) -> Result<Option<String>, VcsError>;

    /// Force-update the working tree to `revision`, discarding local
    /// modifications to tracked files.
    async fn force_checkout(&self, revision: &str) -> Result<(), VcsError>;

    /// Delete untracked files from the working tree. Destructive.
    async fn remove_untracked(&self) -> Result<(), VcsError>;

    /// Attempt a direct tree-level merge of `revision` into the current
    /// head. A clean merge commits itself; a conflicted one leaves the merge
    /// in progress for reconciliation to finish.
    async fn merge_tree(&self, revision: &str) -> Result<MergeOutcome, VcsError>;

    /// Enumerate checked-out nested repositories. Order is not guaranteed;
    /// callers must sort before use.
    async fn enumerate_nested(&self, recursive: bool) -> Result<Vec<NestedRepo>, VcsError>;

    /// Revision the nested repository at `path` was pinned to, as recorded
    /// in the tree at `revision`.
    async fn nested_revision_at(&self, revision: &str, path: &str) -> Result<String, VcsError>;

    /// Merge `revision` into the nested repository checked out at `path`.
    async fn merge_nested(&self, path: &str, revision: &str) -> Result<MergeOutcome, VcsError>;

    /// Record (or with `None`, clear) the tracked branch for a nested
    /// repository. Clearing an absent entry succeeds silently.
    async fn set_nested_branch(&self, name: &str, branch: Option<&str>) -> Result<(), VcsError>;

    /// Re-point the head of the nested repository at `path` to `branch`,
    /// positioned at `revision`. Returns `false` when the branch does not
    /// resolve (the caller treats that as "no branch to restore").
    async fn checkout_nested_branch(
        &self,
        path: &str,
        branch: &str,
        revision: &str,
    ) -> Result<bool, VcsError>;

    /// Initialize/update every nested repository to its recorded revision,
    /// recursively. `reference_cache` shares a local object store to avoid
    /// redundant network fetches; purely an optimization.
    async fn update_nested(&self, reference_cache: Option<&Path>) -> Result<(), VcsError>;

    /// Remove `path` from the working tree and from version-control
    /// tracking.
    async fn remove_nested(&self, path: &str) -> Result<(), VcsError>;

    /// Record an immutable marker binding `label` to `revision`. Re-tagging
    /// the same pair is a no-op; re-tagging a label at a different revision
    /// fails.
    async fn tag_revision(&self, label: &str, revision: &str) -> Result<(), VcsError>;

    /// Stage `path` for inclusion in the next commit.
    async fn stage_path(&self, path: &str) -> Result<(), VcsError>;

    /// Paths still marked as unresolved by the VCS after a merge.
    async fn unresolved_paths(&self) -> Result<Vec<String>, VcsError>;

    /// Commit staged changes, returning the new head revision.
    async fn commit(&self, message: &str) -> Result<String, VcsError>;
}
