//! Reconciliation engine: the three-way merge of two divergent manifests
//! against their common ancestor, plus the per-package content merges that
//! follow from it.
//!
//! A reconciliation run is:
//!
//! 1. Try a direct tree-level merge; if it is clean, stop.
//! 2. Load the local, remote, and ancestor manifests.
//! 3. Expunge sections deleted on either side since the ancestor.
//! 4. Merge the remaining keys three-way; divergent keys become
//!    [`Value::Conflicted`] pairs and set the conflict flag.
//! 5. Merge package content for every installed path that diverged.
//! 6. If anything is left unresolved, fail without committing; if only
//!    manifest keys conflicted, stop before the commit so the user can
//!    resolve them; otherwise commit, restore, and re-checkpoint.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointEngine;
use crate::errors::ReconcileError;
use crate::manifest::{Manifest, Value};
use crate::restore::RestoreEngine;
use crate::vcs::{MergeOutcome, VcsAdapter};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// One key whose local and remote values could not be merged automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConflict {
    pub key: String,
    pub local: Option<String>,
    pub remote: Option<String>,
}

/// Result of a reconciliation run that did not fail outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// The tree-level merge succeeded directly; manifest handling was
    /// skipped entirely.
    pub fast_forward: bool,
    /// Manifest keys left in a conflicted state for manual resolution. Both
    /// candidates are preserved in the staged manifest.
    pub conflicts: Vec<KeyConflict>,
    /// Revision of the merge commit, when one was produced.
    pub merged_revision: Option<String>,
}

impl ReconcileOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Pure merge logic
// ---------------------------------------------------------------------------

/// Key-wise three-way merge over the union of keys in `local` and `remote`.
///
/// The ancestor disambiguates which side changed: a key equal on both sides,
/// or unchanged on the remote, keeps the local value; a key only the remote
/// changed takes the remote value; a key changed differently on both sides
/// becomes [`Value::Conflicted`] with the local candidate first.
pub fn merge_models(
    local: &Manifest,
    remote: &Manifest,
    base: &Manifest,
) -> (Manifest, Vec<KeyConflict>) {
    let mut merged = Manifest::default();
    let mut conflicts = Vec::new();

    let keys: BTreeSet<&str> = local.keys().chain(remote.keys()).collect();
    for key in keys {
        let lv = local.get(key);
        let rv = remote.get(key);
        let bv = base.get(key);

        if lv == rv || rv == bv {
            if let Some(v) = lv {
                merged.insert(key, v.clone());
            }
        } else if lv == bv {
            if let Some(v) = rv {
                merged.insert(key, v.clone());
            }
        } else {
            let conflict = KeyConflict {
                key: key.to_string(),
                local: value_text(lv),
                remote: value_text(rv),
            };
            warn!(
                key,
                local = ?conflict.local,
                remote = ?conflict.remote,
                "manifest key conflict"
            );
            match (lv, rv) {
                (Some(Value::Single(l)), Some(Value::Single(r))) => {
                    merged.insert(key, Value::Conflicted(l.clone(), r.clone()));
                }
                // Delete-vs-modify: keep the surviving value, still flagged.
                (Some(v), None) | (None, Some(v)) => {
                    merged.insert(key, v.clone());
                }
                // A side already conflicted from an earlier aborted merge
                // keeps the local candidate set.
                (Some(v), Some(_)) => {
                    merged.insert(key, v.clone());
                }
                (None, None) => unreachable!("key came from the union of local and remote"),
            }
            conflicts.push(conflict);
        }
    }

    (merged, conflicts)
}

fn value_text(value: Option<&Value>) -> Option<String> {
    value.map(|v| match v {
        Value::Single(s) => s.clone(),
        Value::Conflicted(l, r) => format!("{l} <> {r}"),
    })
}

/// Sections present in the ancestor but missing from either current side.
/// Deletion on one side wins over modification on the other.
fn doomed_sections(local: &Manifest, remote: &Manifest, base: &Manifest) -> Vec<String> {
    let ls = local.sections();
    let rs = remote.sections();
    base.sections()
        .into_iter()
        .filter(|s| !(ls.contains(s) && rs.contains(s)))
        .collect()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Reconciles a local and remote head into a single consistent state.
pub struct ReconcileEngine<'a, V: VcsAdapter + ?Sized> {
    vcs: &'a V,
    manifest_file: String,
    tag_namespace: String,
}

impl<'a, V: VcsAdapter + ?Sized> ReconcileEngine<'a, V> {
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

    pub async fn reconcile(
        &self,
        local_head: &str,
        remote_head: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        // Fast path: a direct tree-level merge that succeeds needs none of
        // the manifest machinery.
        if self.vcs.merge_tree(remote_head).await? == MergeOutcome::Clean {
            let head = self.vcs.head_revision("").await?;
            info!(revision = %head, "merged directly at tree level");
            return Ok(ReconcileOutcome {
                fast_forward: true,
                conflicts: Vec::new(),
                merged_revision: Some(head),
            });
        }
        debug!("tree-level merge conflicted, reconciling manifests");

        let base_rev = self.vcs.merge_base(local_head, remote_head).await?;
        let mut local = self.manifest_at(local_head).await?;
        let mut remote = self.manifest_at(remote_head).await?;
        let base = self.manifest_at(&base_rev).await?;

        // Sections dropped on either side since the ancestor are expunged
        // from both working copies (never from the ancestor snapshot).
        for section in doomed_sections(&local, &remote, &base) {
            let path = local
                .get(&format!("{section}.path"))
                .and_then(Value::as_single)
                .map(ToOwned::to_owned);
            if let Some(path) = path {
                info!(section = %section, path = %path, "removing deleted package");
                self.vcs.remove_nested(&path).await?;
            }
            local.remove_section(&section);
            remote.remove_section(&section);
        }

        let (merged, conflicts) = merge_models(&local, &remote, &base);

        let manifest_path = self.vcs.workdir().join(&self.manifest_file);
        std::fs::write(&manifest_path, merged.serialize())?;
        self.vcs.stage_path(&self.manifest_file).await?;

        // Per-package content merges for installed paths that diverged
        // between the two heads.
        let mut residual: Vec<String> = Vec::new();
        for section in remote.sections() {
            let Some(path) = remote
                .get(&format!("{section}.path"))
                .and_then(Value::as_single)
            else {
                continue;
            };
            if !self.vcs.diff_changed(local_head, remote_head, path).await? {
                continue;
            }
            let pinned = self.vcs.nested_revision_at(remote_head, path).await?;
            info!(path, pinned = %pinned, "merging package content");
            match self.vcs.merge_nested(path, &pinned).await? {
                MergeOutcome::Clean => self.vcs.stage_path(path).await?,
                MergeOutcome::Conflicted => {
                    warn!(path, "package content merge left conflicts");
                    residual.push(path.to_string());
                }
            }
        }

        residual.extend(self.vcs.unresolved_paths().await?);
        residual.sort();
        residual.dedup();
        if !residual.is_empty() {
            return Err(ReconcileError::UnresolvedConflicts { paths: residual });
        }

        if !conflicts.is_empty() {
            // Recoverable: both candidates sit in the staged manifest for
            // the user to resolve. No commit happens until they do.
            return Ok(ReconcileOutcome {
                fast_forward: false,
                conflicts,
                merged_revision: None,
            });
        }

        let merged_revision = self.vcs.commit("grove: merge manifests").await?;
        RestoreEngine::new(self.vcs, &self.manifest_file)
            .restore(&merged_revision)
            .await?;
        CheckpointEngine::new(self.vcs, &self.manifest_file, &self.tag_namespace)
            .checkpoint()
            .await?;
        info!(revision = %merged_revision, "reconciliation committed");
        Ok(ReconcileOutcome {
            fast_forward: false,
            conflicts: Vec::new(),
            merged_revision: Some(merged_revision),
        })
    }

    async fn manifest_at(&self, revision: &str) -> Result<Manifest, ReconcileError> {
        match self.vcs.read_blob_at(revision, &self.manifest_file).await? {
            Some(text) => Ok(Manifest::parse(&text)?),
            None => Ok(Manifest::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::section_key;

    fn manifest(pairs: &[(&str, &str)]) -> Manifest {
        let mut m = Manifest::default();
        for (k, v) in pairs {
            m.set(k, *v);
        }
        m
    }

    #[test]
    fn test_merge_table_identical_both_sides() {
        let base = manifest(&[("submodule.pkgA.path", "old")]);
        let local = manifest(&[("submodule.pkgA.path", "new")]);
        let remote = manifest(&[("submodule.pkgA.path", "new")]);
        let (merged, conflicts) = merge_models(&local, &remote, &base);
        assert!(conflicts.is_empty());
        assert_eq!(
            merged.get("submodule.pkgA.path").unwrap().as_single(),
            Some("new")
        );
    }

    #[test]
    fn test_merge_table_remote_unchanged_keeps_local() {
        let base = manifest(&[("submodule.pkgA.branch", "main")]);
        let local = manifest(&[("submodule.pkgA.branch", "dev")]);
        let remote = manifest(&[("submodule.pkgA.branch", "main")]);
        let (merged, conflicts) = merge_models(&local, &remote, &base);
        assert!(conflicts.is_empty());
        assert_eq!(
            merged.get("submodule.pkgA.branch").unwrap().as_single(),
            Some("dev")
        );
    }

    #[test]
    fn test_merge_table_local_unchanged_takes_remote() {
        let base = manifest(&[("submodule.pkgA.branch", "main")]);
        let local = manifest(&[("submodule.pkgA.branch", "main")]);
        let remote = manifest(&[("submodule.pkgA.branch", "release")]);
        let (merged, conflicts) = merge_models(&local, &remote, &base);
        assert!(conflicts.is_empty());
        assert_eq!(
            merged.get("submodule.pkgA.branch").unwrap().as_single(),
            Some("release")
        );
    }

    #[test]
    fn test_merge_table_all_distinct_conflicts() {
        // Scenario B: branch changed differently on both sides.
        let base = manifest(&[("submodule.pkgA.branch", "main")]);
        let local = manifest(&[("submodule.pkgA.branch", "dev")]);
        let remote = manifest(&[("submodule.pkgA.branch", "release")]);
        let (merged, conflicts) = merge_models(&local, &remote, &base);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, "submodule.pkgA.branch");
        assert_eq!(conflicts[0].local.as_deref(), Some("dev"));
        assert_eq!(conflicts[0].remote.as_deref(), Some("release"));
        assert_eq!(
            merged.get("submodule.pkgA.branch"),
            Some(&Value::Conflicted("dev".into(), "release".into()))
        );
    }

    #[test]
    fn test_merge_section_added_remotely() {
        // Scenario A: remote installs pkgB, local untouched.
        let base = manifest(&[(&section_key("pkgA", "path"), "pkgA")]);
        let local = manifest(&[(&section_key("pkgA", "path"), "pkgA")]);
        let remote = manifest(&[
            (&section_key("pkgA", "path"), "pkgA"),
            (&section_key("pkgB", "path"), "pkgB"),
        ]);
        let (merged, conflicts) = merge_models(&local, &remote, &base);
        assert!(conflicts.is_empty());
        assert_eq!(merged.sections().len(), 2);
    }

    #[test]
    fn test_merge_key_added_locally() {
        let base = Manifest::default();
        let local = manifest(&[("submodule.pkgA.branch", "dev")]);
        let remote = Manifest::default();
        let (merged, conflicts) = merge_models(&local, &remote, &base);
        assert!(conflicts.is_empty());
        assert_eq!(
            merged.get("submodule.pkgA.branch").unwrap().as_single(),
            Some("dev")
        );
    }

    #[test]
    fn test_merge_delete_vs_modify_flags_conflict() {
        let base = manifest(&[("submodule.pkgA.branch", "main")]);
        let local = Manifest::default();
        let remote = manifest(&[("submodule.pkgA.branch", "release")]);
        let (merged, conflicts) = merge_models(&local, &remote, &base);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].local, None);
        // The surviving value is kept rather than fabricating a pair.
        assert_eq!(
            merged.get("submodule.pkgA.branch").unwrap().as_single(),
            Some("release")
        );
    }

    #[test]
    fn test_doomed_sections_either_side_deletion_wins() {
        let base = manifest(&[
            (&section_key("pkgA", "path"), "pkgA"),
            (&section_key("pkgB", "path"), "pkgB"),
        ]);
        let local = manifest(&[(&section_key("pkgA", "path"), "pkgA")]);
        let remote = manifest(&[
            (&section_key("pkgA", "path"), "pkgA"),
            (&section_key("pkgB", "path"), "pkgB"),
        ]);
        let doomed = doomed_sections(&local, &remote, &base);
        assert_eq!(doomed, vec!["submodule.pkgB".to_string()]);
    }

    #[test]
    fn test_doomed_sections_ignores_additions() {
        let base = manifest(&[(&section_key("pkgA", "path"), "pkgA")]);
        let local = manifest(&[
            (&section_key("pkgA", "path"), "pkgA"),
            (&section_key("pkgC", "path"), "pkgC"),
        ]);
        let remote = manifest(&[(&section_key("pkgA", "path"), "pkgA")]);
        assert!(doomed_sections(&local, &remote, &base).is_empty());
    }
}
