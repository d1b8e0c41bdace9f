//! Error types for the grove core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Manifest *key* conflicts are deliberately not errors: both candidate
//! values are preserved in the merged manifest and reported through
//! [`ReconcileOutcome`](crate::reconcile::ReconcileOutcome), so the operation
//! can stage everything else and defer resolution to the user.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Manifest errors
// ---------------------------------------------------------------------------

/// Errors from manifest parsing. Fatal: no partial model is produced.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A line does not match the `key value` structure, or a key is not an
    /// ASCII token free of whitespace.
    #[error("malformed manifest line {line}: '{content}'")]
    Malformed { line: usize, content: String },
}

// ---------------------------------------------------------------------------
// VCS adapter errors
// ---------------------------------------------------------------------------

/// Errors from external `git` invocations. Propagated immediately; completed
/// prior steps are not rolled back.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with a non-zero status.
    #[error("git {command} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// Generic I/O wrapper.
    #[error("vcs I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Checkpoint errors
// ---------------------------------------------------------------------------

/// Errors from the checkpoint engine.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("checkpoint manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Restore errors
// ---------------------------------------------------------------------------

/// Errors from the restore engine.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("restore vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("restore manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("restore I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// Errors from the reconciliation engine.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Files were still marked unresolved after the per-package merges. The
    /// working tree is left in its partially-merged state and nothing is
    /// committed; paths are sorted and de-duplicated.
    #[error("unresolved conflicts remain: {}", paths.join(", "))]
    UnresolvedConflicts { paths: Vec<String> },

    #[error("reconcile vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("reconcile manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error("reconcile I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ManifestError::Malformed {
            line: 3,
            content: "no-separator".into(),
        };
        assert_eq!(err.to_string(), "malformed manifest line 3: 'no-separator'");

        let err = VcsError::CommandFailed {
            command: "merge".into(),
            exit_code: 1,
            stderr: "boom".into(),
        };
        assert_eq!(err.to_string(), "git merge failed (exit 1): boom");

        let err = ReconcileError::UnresolvedConflicts {
            paths: vec!["pkgA/main.c".into(), "pkgB/lib.rs".into()],
        };
        assert!(err.to_string().contains("pkgA/main.c, pkgB/lib.rs"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let vcs_err = VcsError::BinaryNotFound("git".into());
        let core_err: CoreError = vcs_err.into();
        assert!(matches!(core_err, CoreError::Vcs(_)));

        let manifest_err = ManifestError::Malformed {
            line: 1,
            content: "x".into(),
        };
        let core_err: CoreError = manifest_err.into();
        assert!(matches!(core_err, CoreError::Manifest(_)));
    }
}
