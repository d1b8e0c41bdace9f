//! Subcommand implementations: straight-line VCS call sequences around the
//! core engines.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use comfy_table::Table;
use tracing::info;

use grove_core::checkpoint::CheckpointEngine;
use grove_core::config::GroveConfig;
use grove_core::manifest::{section_key, Manifest};
use grove_core::reconcile::ReconcileEngine;
use grove_core::restore::RestoreEngine;
use grove_core::vcs::{GitCli, VcsAdapter};

/// Last path component of a repository URL, without a `.git` suffix.
fn repo_name(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("package")
        .trim_end_matches(".git")
        .to_string()
}

fn read_manifest(root: &Path, cfg: &GroveConfig) -> Result<Manifest> {
    let path = root.join(&cfg.manifest_file);
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Manifest::parse(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
        Err(e) => Err(e).context("reading manifest"),
    }
}

fn write_manifest(root: &Path, cfg: &GroveConfig, manifest: &Manifest) -> Result<()> {
    std::fs::write(root.join(&cfg.manifest_file), manifest.serialize())
        .context("writing manifest")
}

async fn commit_if_staged(git: &GitCli, message: &str) -> Result<()> {
    if git.has_staged_changes().await? {
        git.commit(message).await?;
    } else {
        info!("nothing to commit");
    }
    Ok(())
}

pub async fn init(dir: &Path) -> Result<()> {
    let cfg = GroveConfig::default();
    let git = GitCli::init(dir).await?;
    write_manifest(dir, &cfg, &Manifest::default())?;
    git.stage_path(&cfg.manifest_file).await?;
    git.commit("grove: initialize").await?;
    println!("initialized grove repository in {}", dir.display());
    Ok(())
}

pub async fn clone(url: &str, dest: Option<&Path>) -> Result<()> {
    let derived;
    let dest = match dest {
        Some(dest) => dest,
        None => {
            derived = PathBuf::from(repo_name(url));
            &derived
        }
    };
    let git = GitCli::clone_recursive(url, dest).await?;
    let cfg = GroveConfig::load_or_default(git.workdir())?;
    let head = git.head_revision("").await?;
    RestoreEngine::new(&git, &cfg.manifest_file).restore(&head).await?;
    println!("cloned into {}", dest.display());
    Ok(())
}

pub async fn install(
    dir: &Path,
    url: &str,
    path: Option<&str>,
    branch: Option<&str>,
) -> Result<()> {
    let cfg = GroveConfig::load_or_default(dir)?;
    let git = GitCli::new(dir);

    let derived;
    let path = match path {
        Some(path) => path,
        None => {
            derived = repo_name(url);
            &derived
        }
    };

    let mut manifest = read_manifest(dir, &cfg)?;
    if manifest.get(&section_key(path, "path")).is_some() {
        bail!("package '{path}' is already installed");
    }

    git.add_nested(url, path, branch).await?;

    manifest.set(&section_key(path, "path"), path);
    manifest.set(&section_key(path, "url"), url);
    if let Some(branch) = branch {
        manifest.set(&section_key(path, "branch"), branch);
    }
    write_manifest(dir, &cfg, &manifest)?;
    git.stage_path(&cfg.manifest_file).await?;

    CheckpointEngine::new(&git, &cfg.manifest_file, &cfg.tag_namespace)
        .checkpoint()
        .await?;
    commit_if_staged(&git, &format!("grove: install {path}")).await?;
    println!("installed {path}");
    Ok(())
}

pub async fn remove(dir: &Path, name: &str) -> Result<()> {
    let cfg = GroveConfig::load_or_default(dir)?;
    let git = GitCli::new(dir);

    let mut manifest = read_manifest(dir, &cfg)?;
    let Some(path) = manifest
        .get(&section_key(name, "path"))
        .and_then(|v| v.as_single())
        .map(ToOwned::to_owned)
    else {
        bail!("package '{name}' is not installed");
    };

    git.remove_nested(&path).await?;
    manifest.remove_section(&format!("submodule.{name}"));
    write_manifest(dir, &cfg, &manifest)?;
    git.stage_path(&cfg.manifest_file).await?;
    commit_if_staged(&git, &format!("grove: remove {name}")).await?;
    println!("removed {name}");
    Ok(())
}

pub async fn checkpoint(dir: &Path) -> Result<()> {
    let cfg = GroveConfig::load_or_default(dir)?;
    let git = GitCli::new(dir);
    let summary = CheckpointEngine::new(&git, &cfg.manifest_file, &cfg.tag_namespace)
        .checkpoint()
        .await?;
    commit_if_staged(&git, "grove: checkpoint").await?;
    println!(
        "checkpointed {} package(s), {} tracking a branch",
        summary.packages, summary.branches_recorded
    );
    Ok(())
}

pub async fn push(dir: &Path) -> Result<()> {
    let cfg = GroveConfig::load_or_default(dir)?;
    let git = GitCli::new(dir);
    git.push(&cfg.remote).await?;
    println!("pushed to {}", cfg.remote);
    Ok(())
}

pub async fn pull(dir: &Path) -> Result<bool> {
    let cfg = GroveConfig::load_or_default(dir)?;
    let git = GitCli::new(dir);

    git.fetch(&cfg.remote).await?;
    let local_head = git.head_revision("").await?;
    let remote_head = git.fetched_head().await?;

    let outcome = ReconcileEngine::new(&git, &cfg.manifest_file, &cfg.tag_namespace)
        .reconcile(&local_head, &remote_head)
        .await?;

    if outcome.is_clean() {
        match outcome.merged_revision {
            Some(revision) => println!("merged at {revision}"),
            None => println!("up to date"),
        }
        return Ok(true);
    }

    eprintln!("manifest conflicts need manual resolution:");
    for conflict in &outcome.conflicts {
        eprintln!(
            "  {}: local={} remote={}",
            conflict.key,
            conflict.local.as_deref().unwrap_or("(deleted)"),
            conflict.remote.as_deref().unwrap_or("(deleted)"),
        );
    }
    eprintln!("both candidates are staged in {}; edit it and commit", cfg.manifest_file);
    Ok(false)
}

pub async fn status(dir: &Path, json: bool) -> Result<()> {
    let cfg = GroveConfig::load_or_default(dir)?;
    let git = GitCli::new(dir);

    let mut repos = git.enumerate_nested(true).await?;
    repos.sort_by(|a, b| a.path.cmp(&b.path));
    let manifest = read_manifest(dir, &cfg)?;

    if json {
        let rows: Vec<serde_json::Value> = repos
            .iter()
            .map(|repo| {
                serde_json::json!({
                    "name": repo.name,
                    "path": repo.path,
                    "revision": repo.revision,
                    "branch": manifest
                        .get(&section_key(&repo.name, "branch"))
                        .and_then(|v| v.as_single()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["NAME", "PATH", "REVISION", "BRANCH"]);
    for repo in &repos {
        let branch = manifest
            .get(&section_key(&repo.name, "branch"))
            .and_then(|v| v.as_single())
            .unwrap_or("(detached)");
        let short = repo.revision.get(..12).unwrap_or(&repo.revision);
        table.add_row(vec![repo.name.as_str(), repo.path.as_str(), short, branch]);
    }
    println!("{table}");

    for key in manifest.conflicted_keys() {
        eprintln!("warning: unresolved manifest conflict on {key}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name() {
        assert_eq!(repo_name("https://example.com/libs/pkgA.git"), "pkgA");
        assert_eq!(repo_name("https://example.com/libs/pkgA"), "pkgA");
        assert_eq!(repo_name("git@example.com:team/pkgB.git/"), "pkgB");
    }
}
