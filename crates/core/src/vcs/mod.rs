//! Version-control adapter boundary and its `git` implementation.

pub mod adapter;
pub mod git;

pub use adapter::{MergeOutcome, NestedRepo, VcsAdapter};
pub use git::GitCli;
