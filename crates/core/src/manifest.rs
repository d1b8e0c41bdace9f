//! In-memory model of the grove manifest.
//!
//! The manifest is a flat text file with one `key value` pair per line, keys
//! namespaced as `submodule.<name>.<field>` where `<field>` is `path`, `url`,
//! or `branch`. A section's presence means the package is installed; an
//! absent `branch` key means the package is pinned to a detached revision.
//!
//! Serialization is sorted by key, so two processes producing the same
//! logical content emit byte-identical manifests. The only ordering that is
//! semantically significant is *within* a [`Value::Conflicted`] pair: local
//! candidate first, remote second, for a human resolving the conflict.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::errors::ManifestError;

/// Key namespace prefix identifying package sections.
pub const SECTION_PREFIX: &str = "submodule";

/// Build the manifest key for a package field, e.g.
/// `section_key("pkgA", "path")` -> `submodule.pkgA.path`.
pub fn section_key(name: &str, field: &str) -> String {
    format!("{SECTION_PREFIX}.{name}.{field}")
}

/// Section prefix of a key: everything before the final `.` separator.
pub fn section_of(key: &str) -> Option<&str> {
    key.rsplit_once('.').map(|(section, _)| section)
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A manifest value.
///
/// `Conflicted` exists only to represent an unresolved merge conflict: both
/// candidate values are preserved for manual inspection, local first. Any
/// `Conflicted` entry surviving a reconciliation blocks the commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Single(String),
    Conflicted(String, String),
}

impl Value {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Value::Single(v) => Some(v),
            Value::Conflicted(..) => None,
        }
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, Value::Conflicted(..))
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// The manifest model: a sorted key/value store over package sections.
///
/// Instances are ephemeral: parsed fresh from serialized text, reconciled or
/// edited, written back, and discarded. Nothing is cached across operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, Value>,
}

impl Manifest {
    /// Parse serialized manifest text.
    ///
    /// Keys must be ASCII tokens without whitespace; values may contain
    /// spaces. Blank lines are skipped. A key repeated on two lines folds
    /// into a [`Value::Conflicted`] pair (so conflicted manifests
    /// round-trip); a third occurrence is malformed.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut entries: BTreeMap<String, Value> = BTreeMap::new();

        for (idx, raw) in text.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            let malformed = || ManifestError::Malformed {
                line: idx + 1,
                content: raw.to_string(),
            };

            let Some((key, value)) = raw.split_once(char::is_whitespace) else {
                return Err(malformed());
            };
            let value = value.trim();
            if key.is_empty()
                || value.is_empty()
                || !key.chars().all(|c| c.is_ascii() && !c.is_ascii_whitespace())
            {
                return Err(malformed());
            }

            match entries.remove(key) {
                None => {
                    entries.insert(key.to_string(), Value::Single(value.to_string()));
                }
                Some(Value::Single(first)) => {
                    entries.insert(key.to_string(), Value::Conflicted(first, value.to_string()));
                }
                Some(Value::Conflicted(..)) => return Err(malformed()),
            }
        }

        Ok(Self { entries })
    }

    /// Serialize to text, sorted ascending by key. Conflicted entries are
    /// emitted as repeated lines with the same key, pair order preserved.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            match value {
                Value::Single(v) => {
                    let _ = writeln!(out, "{key} {v}");
                }
                Value::Conflicted(local, remote) => {
                    let _ = writeln!(out, "{key} {local}");
                    let _ = writeln!(out, "{key} {remote}");
                }
            }
        }
        out
    }

    /// Structural union of two manifests; `other` wins on overlap. Not
    /// conflict-aware (that policy lives in the reconciliation engine).
    pub fn merge(base: &Manifest, other: &Manifest) -> Manifest {
        let mut entries = base.entries.clone();
        for (key, value) in &other.entries {
            entries.insert(key.clone(), value.clone());
        }
        Manifest { entries }
    }

    /// Set of section prefixes present in the manifest.
    pub fn sections(&self) -> BTreeSet<String> {
        self.entries
            .keys()
            .filter_map(|k| section_of(k))
            .map(ToOwned::to_owned)
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), Value::Single(value.into()));
    }

    /// Remove a key. Removing an absent key succeeds silently; the return
    /// value says whether anything was actually removed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Delete every key belonging to `section` (a `submodule.<name>` prefix).
    pub fn remove_section(&mut self, section: &str) {
        self.entries.retain(|k, _| section_of(k) != Some(section));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_conflicted(&self) -> bool {
        self.entries.values().any(Value::is_conflicted)
    }

    /// Keys carrying unresolved conflict pairs, in sorted order.
    pub fn conflicted_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_conflicted())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_roundtrip() {
        let text = "submodule.pkgA.path libs/pkgA\nsubmodule.pkgA.url https://example.com/pkgA.git\n";
        let m = Manifest::parse(text).unwrap();
        assert_eq!(
            m.get("submodule.pkgA.path"),
            Some(&Value::Single("libs/pkgA".into()))
        );
        assert_eq!(Manifest::parse(&m.serialize()).unwrap(), m);
    }

    #[test]
    fn test_serialize_is_sorted() {
        let mut m = Manifest::default();
        m.set("submodule.zeta.path", "zeta");
        m.set("submodule.alpha.path", "alpha");
        let text = m.serialize();
        let alpha = text.find("alpha").unwrap();
        let zeta = text.find("zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_value_may_contain_spaces() {
        let m = Manifest::parse("submodule.pkgA.url url with spaces\n").unwrap();
        assert_eq!(
            m.get("submodule.pkgA.url").unwrap().as_single(),
            Some("url with spaces")
        );
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            Manifest::parse("keywithoutvalue"),
            Err(ManifestError::Malformed { line: 1, .. })
        ));
        // Non-ASCII key.
        assert!(Manifest::parse("submodule.pkgÄ.path x").is_err());
        // Third occurrence of the same key.
        assert!(Manifest::parse("k a\nk b\nk c\n").is_err());
    }

    #[test]
    fn test_conflicted_roundtrip_preserves_order() {
        let m = Manifest::parse("submodule.pkgA.branch dev\nsubmodule.pkgA.branch release\n").unwrap();
        assert_eq!(
            m.get("submodule.pkgA.branch"),
            Some(&Value::Conflicted("dev".into(), "release".into()))
        );
        assert_eq!(
            m.serialize(),
            "submodule.pkgA.branch dev\nsubmodule.pkgA.branch release\n"
        );
        assert!(m.is_conflicted());
        assert_eq!(m.conflicted_keys(), vec!["submodule.pkgA.branch"]);
    }

    #[test]
    fn test_sections() {
        let mut m = Manifest::default();
        m.set(&section_key("pkgA", "path"), "pkgA");
        m.set(&section_key("pkgA", "url"), "u");
        m.set(&section_key("pkgB", "path"), "pkgB");
        let sections = m.sections();
        assert_eq!(sections.len(), 2);
        assert!(sections.contains("submodule.pkgA"));
        assert!(sections.contains("submodule.pkgB"));
    }

    #[test]
    fn test_remove_section() {
        let mut m = Manifest::default();
        m.set(&section_key("pkgA", "path"), "pkgA");
        m.set(&section_key("pkgA", "branch"), "main");
        m.set(&section_key("pkgB", "path"), "pkgB");
        m.remove_section("submodule.pkgA");
        assert_eq!(m.sections().len(), 1);
        assert!(m.get(&section_key("pkgB", "path")).is_some());
    }

    #[test]
    fn test_remove_absent_key_is_silent() {
        let mut m = Manifest::default();
        assert!(!m.remove("submodule.pkgA.branch"));
        m.set("submodule.pkgA.branch", "main");
        assert!(m.remove("submodule.pkgA.branch"));
    }

    #[test]
    fn test_structural_merge_other_wins() {
        let mut base = Manifest::default();
        base.set("submodule.pkgA.path", "old");
        base.set("submodule.pkgB.path", "pkgB");
        let mut other = Manifest::default();
        other.set("submodule.pkgA.path", "new");
        let merged = Manifest::merge(&base, &other);
        assert_eq!(
            merged.get("submodule.pkgA.path").unwrap().as_single(),
            Some("new")
        );
        assert!(merged.get("submodule.pkgB.path").is_some());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let m = Manifest::parse("\nsubmodule.pkgA.path pkgA\n\n").unwrap();
        assert_eq!(m.sections().len(), 1);
    }
}
