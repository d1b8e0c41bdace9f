//! Subprocess `git` implementation of the [`VcsAdapter`] boundary.
//!
//! Grove does not link a VCS library; it drives the `git` binary the same
//! way a user would, captures its output, and maps non-zero exits to
//! [`VcsError::CommandFailed`]. The working-tree root is explicit on every
//! invocation (`git -C <root>`).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::adapter::{MergeOutcome, NestedRepo, VcsAdapter};
use crate::errors::VcsError;

/// Client for a single working tree, driving the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Wrap an existing working tree at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "created GitCli");
        Self { root }
    }

    /// Initialize a fresh repository at `root`, creating the directory if
    /// needed.
    #[instrument]
    pub async fn init(root: &Path) -> Result<Self, VcsError> {
        std::fs::create_dir_all(root)?;
        let cli = Self::new(root);
        cli.run(&["init", "--quiet"]).await?;
        info!(root = %root.display(), "initialized repository");
        Ok(cli)
    }

    /// Clone `url` (nested repositories included) into `dest`.
    #[instrument]
    pub async fn clone_recursive(url: &str, dest: &Path) -> Result<Self, VcsError> {
        let parent = dest.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent)?;
        }
        let dest_str = dest.to_string_lossy().to_string();
        Self::exec(Path::new("."), &["clone", "--recursive", "--quiet", url, &dest_str]).await?;
        info!(url, dest = %dest.display(), "clone completed");
        Ok(Self::new(dest))
    }

    /// Add a nested repository at `path`, fetched from `url`, optionally
    /// tracking `branch`. The section name is the path itself.
    #[instrument(skip(self))]
    pub async fn add_nested(
        &self,
        url: &str,
        path: &str,
        branch: Option<&str>,
    ) -> Result<(), VcsError> {
        let mut args = vec!["submodule", "add", "--name", path];
        if let Some(branch) = branch {
            args.push("-b");
            args.push(branch);
        }
        args.extend(["--", url, path]);
        self.run(&args).await?;
        info!(url, path, "added nested repository");
        Ok(())
    }

    /// Fetch from `remote`, tags included.
    #[instrument(skip(self))]
    pub async fn fetch(&self, remote: &str) -> Result<(), VcsError> {
        self.run(&["fetch", "--tags", remote]).await?;
        debug!(remote, "fetch completed");
        Ok(())
    }

    /// Head revision produced by the most recent fetch.
    pub async fn fetched_head(&self) -> Result<String, VcsError> {
        Ok(self.run(&["rev-parse", "FETCH_HEAD"]).await?.trim().to_string())
    }

    /// Push the current branch and all checkpoint tags to `remote`.
    #[instrument(skip(self))]
    pub async fn push(&self, remote: &str) -> Result<(), VcsError> {
        self.run(&["push", remote, "HEAD"]).await?;
        self.run(&["push", "--tags", remote]).await?;
        info!(remote, "push completed");
        Ok(())
    }

    /// Whether the index holds changes relative to the current head.
    pub async fn has_staged_changes(&self) -> Result<bool, VcsError> {
        let (code, _, _) = self
            .run_status(&self.root, &["diff", "--cached", "--quiet"])
            .await?;
        Ok(code != 0)
    }

    // -----------------------------------------------------------------------
    // Subprocess plumbing
    // -----------------------------------------------------------------------

    async fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        Self::exec(&self.root, args).await
    }

    async fn run_in(&self, dir: &Path, args: &[&str]) -> Result<String, VcsError> {
        Self::exec(dir, args).await
    }

    async fn exec(dir: &Path, args: &[&str]) -> Result<String, VcsError> {
        let (code, stdout, stderr) = Self::exec_status(dir, args).await?;
        if code != 0 {
            warn!(code, %stderr, cmd = %args.join(" "), "git command failed");
            return Err(VcsError::CommandFailed {
                command: args.first().copied().unwrap_or("git").to_string(),
                exit_code: code,
                stderr,
            });
        }
        Ok(stdout)
    }

    /// Run a command whose non-zero exit is meaningful rather than an error.
    async fn run_status(&self, dir: &Path, args: &[&str]) -> Result<(i32, String, String), VcsError> {
        Self::exec_status(dir, args).await
    }

    async fn exec_status(dir: &Path, args: &[&str]) -> Result<(i32, String, String), VcsError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(dir)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = %format!("git {}", args.join(" ")), dir = %dir.display(), "running git command");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VcsError::BinaryNotFound("git".into())
            } else {
                VcsError::Io(e)
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Ok((output.status.code().unwrap_or(-1), stdout, stderr))
    }

    fn subdir(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl VcsAdapter for GitCli {
    fn workdir(&self) -> &Path {
        &self.root
    }

    async fn head_revision(&self, path: &str) -> Result<String, VcsError> {
        let out = self.run_in(&self.subdir(path), &["rev-parse", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    async fn head_branch(&self, path: &str) -> Result<Option<String>, VcsError> {
        let (code, stdout, _) = self
            .run_status(&self.subdir(path), &["symbolic-ref", "--short", "-q", "HEAD"])
            .await?;
        if code == 0 {
            Ok(Some(stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    async fn merge_base(&self, a: &str, b: &str) -> Result<String, VcsError> {
        Ok(self.run(&["merge-base", a, b]).await?.trim().to_string())
    }

    async fn diff_changed(&self, a: &str, b: &str, path: &str) -> Result<bool, VcsError> {
        let out = self.run(&["diff", "--name-only", a, b, "--", path]).await?;
        Ok(!out.trim().is_empty())
    }

    async fn read_blob_at(&self, revision: &str, path: &str) -> Result<Option<String>, VcsError> {
        let spec = format!("{revision}:{path}");
        let (code, _, _) = self.run_status(&self.root, &["cat-file", "-e", &spec]).await?;
        if code != 0 {
            debug!(%spec, "blob absent at revision");
            return Ok(None);
        }
        Ok(Some(self.run(&["show", &spec]).await?))
    }

    async fn force_checkout(&self, revision: &str) -> Result<(), VcsError> {
        self.run(&["reset", "--hard", revision]).await?;
        info!(revision, "working tree force-updated");
        Ok(())
    }

    async fn remove_untracked(&self) -> Result<(), VcsError> {
        self.run(&["clean", "-fdq"]).await?;
        debug!("removed untracked files");
        Ok(())
    }

    async fn merge_tree(&self, revision: &str) -> Result<MergeOutcome, VcsError> {
        let (code, stdout, stderr) = self
            .run_status(&self.root, &["merge", "--no-edit", revision])
            .await?;
        if code == 0 {
            info!(revision, "tree-level merge succeeded");
            return Ok(MergeOutcome::Clean);
        }
        let (merge_head, _, _) = self
            .run_status(&self.root, &["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .await?;
        if merge_head == 0 || stdout.contains("CONFLICT") {
            debug!(revision, "tree-level merge conflicted");
            return Ok(MergeOutcome::Conflicted);
        }
        Err(VcsError::CommandFailed {
            command: "merge".into(),
            exit_code: code,
            stderr,
        })
    }

    async fn enumerate_nested(&self, recursive: bool) -> Result<Vec<NestedRepo>, VcsError> {
        // Explicit worklist over path prefixes instead of `--recursive`,
        // so traversal depth and ordering stay visible and testable.
        let mut found = Vec::new();
        let mut pending: Vec<String> = vec![String::new()];

        while let Some(prefix) = pending.pop() {
            let dir = self.subdir(&prefix);
            if !dir.join(".gitmodules").exists() {
                continue;
            }
            let (code, stdout, _) = self
                .run_status(
                    &dir,
                    &[
                        "config",
                        "--file",
                        ".gitmodules",
                        "--get-regexp",
                        r"^submodule\..*\.path$",
                    ],
                )
                .await?;
            if code != 0 {
                // No entries in the file.
                continue;
            }

            for line in stdout.lines() {
                let Some((name, rel_path)) = parse_module_entry(line) else {
                    continue;
                };
                let path = if prefix.is_empty() {
                    rel_path.to_string()
                } else {
                    format!("{prefix}/{rel_path}")
                };
                // Skip entries that are declared but not checked out.
                if !self.subdir(&path).join(".git").exists() {
                    debug!(%path, "nested repository not initialized, skipping");
                    continue;
                }
                let revision = self.head_revision(&path).await?;
                if recursive {
                    pending.push(path.clone());
                }
                found.push(NestedRepo {
                    name: name.to_string(),
                    path,
                    revision,
                });
            }
        }

        debug!(count = found.len(), "enumerated nested repositories");
        Ok(found)
    }

    async fn nested_revision_at(&self, revision: &str, path: &str) -> Result<String, VcsError> {
        let spec = format!("{revision}:{path}");
        Ok(self.run(&["rev-parse", &spec]).await?.trim().to_string())
    }

    async fn merge_nested(&self, path: &str, revision: &str) -> Result<MergeOutcome, VcsError> {
        let dir = self.subdir(path);
        // Make sure the incoming revision's objects are present locally.
        let (code, _, stderr) = self.run_status(&dir, &["fetch", "--all", "--quiet"]).await?;
        if code != 0 {
            debug!(path, %stderr, "nested fetch failed, merging with local objects");
        }
        let (code, stdout, stderr) = self
            .run_status(&dir, &["merge", "--no-edit", revision])
            .await?;
        if code == 0 {
            info!(path, revision, "nested merge succeeded");
            return Ok(MergeOutcome::Clean);
        }
        let (merge_head, _, _) = self
            .run_status(&dir, &["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .await?;
        if merge_head == 0 || stdout.contains("CONFLICT") {
            warn!(path, revision, "nested merge conflicted");
            return Ok(MergeOutcome::Conflicted);
        }
        Err(VcsError::CommandFailed {
            command: "merge".into(),
            exit_code: code,
            stderr,
        })
    }

    async fn set_nested_branch(&self, name: &str, branch: Option<&str>) -> Result<(), VcsError> {
        let key = format!("submodule.{name}.branch");
        match branch {
            Some(branch) => {
                self.run(&["config", "-f", ".gitmodules", &key, branch]).await?;
                debug!(name, branch, "recorded tracked branch");
            }
            None => {
                let (code, _, _) = self
                    .run_status(&self.root, &["config", "-f", ".gitmodules", "--unset", &key])
                    .await?;
                if code != 0 {
                    debug!(name, "no tracked branch entry to remove");
                }
            }
        }
        Ok(())
    }

    async fn checkout_nested_branch(
        &self,
        path: &str,
        branch: &str,
        revision: &str,
    ) -> Result<bool, VcsError> {
        let dir = self.subdir(path);
        let local_ref = format!("refs/heads/{branch}");
        let remote_ref = format!("refs/remotes/origin/{branch}");
        let (local, _, _) = self
            .run_status(&dir, &["rev-parse", "--verify", "-q", &local_ref])
            .await?;
        let (remote, _, _) = self
            .run_status(&dir, &["rev-parse", "--verify", "-q", &remote_ref])
            .await?;
        if local != 0 && remote != 0 {
            debug!(path, branch, "recorded branch does not resolve");
            return Ok(false);
        }
        self.run_in(&dir, &["checkout", "-q", "-B", branch, revision]).await?;
        debug!(path, branch, revision, "re-pointed nested head at branch");
        Ok(true)
    }

    async fn update_nested(&self, reference_cache: Option<&Path>) -> Result<(), VcsError> {
        let cache_str;
        let mut args = vec!["submodule", "update", "--init", "--recursive", "--quiet"];
        if let Some(cache) = reference_cache {
            cache_str = cache.to_string_lossy().to_string();
            args.push("--reference");
            args.push(&cache_str);
        }
        self.run(&args).await?;
        info!("nested repositories updated");
        Ok(())
    }

    async fn remove_nested(&self, path: &str) -> Result<(), VcsError> {
        let (code, _, stderr) = self
            .run_status(&self.root, &["submodule", "deinit", "-f", "--", path])
            .await?;
        if code != 0 {
            debug!(path, %stderr, "deinit failed, removing tracked path anyway");
        }
        self.run(&["rm", "-r", "-f", "--ignore-unmatch", "--", path]).await?;
        info!(path, "removed nested repository");
        Ok(())
    }

    async fn tag_revision(&self, label: &str, revision: &str) -> Result<(), VcsError> {
        let probe = format!("refs/tags/{label}^{{commit}}");
        let (code, stdout, _) = self
            .run_status(&self.root, &["rev-parse", "--verify", "-q", &probe])
            .await?;
        if code == 0 {
            if stdout.trim() == revision {
                debug!(label, "checkpoint marker already recorded");
                return Ok(());
            }
            return Err(VcsError::CommandFailed {
                command: "tag".into(),
                exit_code: 128,
                stderr: format!("tag '{label}' already exists at a different revision"),
            });
        }
        self.run(&["tag", label, revision]).await?;
        debug!(label, revision, "recorded checkpoint marker");
        Ok(())
    }

    async fn stage_path(&self, path: &str) -> Result<(), VcsError> {
        self.run(&["add", "--", path]).await?;
        Ok(())
    }

    async fn unresolved_paths(&self) -> Result<Vec<String>, VcsError> {
        let out = self.run(&["diff", "--name-only", "--diff-filter=U"]).await?;
        let mut paths: Vec<String> = out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(ToOwned::to_owned)
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    async fn commit(&self, message: &str) -> Result<String, VcsError> {
        self.run(&["commit", "-m", message]).await?;
        let head = self.head_revision("").await?;
        info!(revision = %head, "created commit");
        Ok(head)
    }
}

/// Parse one `git config --get-regexp` line of the form
/// `submodule.<name>.path <path>` into `(name, path)`.
fn parse_module_entry(line: &str) -> Option<(&str, &str)> {
    let (key, path) = line.trim().split_once(' ')?;
    let name = key.strip_prefix("submodule.")?.strip_suffix(".path")?;
    if name.is_empty() || path.is_empty() {
        return None;
    }
    Some((name, path))
}
