//! Path resolution — map a model-given path onto the canonical snapshot path.
//!
//! Models hallucinate casing and drop subdirectories, so an exact lookup is
//! tried first, then a case-insensitive full-path match, then a match on the
//! file basename. The configured [`ResolutionPolicy`] decides which basename
//! candidates count and what happens when several do.
//!
//! ```text
//! "foo.cs"          ──exact?──▶ no
//!                   ──ci path?─▶ no
//!                   ──basename─▶ ["Assets/Scripts/Foo.cs"]  → Matched
//! "Editor/Foo.cs"   ──basename─▶ ["Assets/Scripts/Foo.cs"]  → Unresolved (closest)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::basename;
use crate::snapshot::{canonical_key, ProjectSnapshot};

/// How to pick among several snapshot files sharing a basename.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Only candidates that end with every component of the requested path
    /// count. None falls through to the requested path; several are
    /// ambiguous.
    #[default]
    Closest,
    /// First basename candidate in snapshot order wins, whatever its
    /// directories.
    FirstMatch,
    /// Any second candidate is ambiguous.
    Unambiguous,
}

impl std::str::FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closest" => Ok(Self::Closest),
            "first_match" | "first-match" | "first" => Ok(Self::FirstMatch),
            "unambiguous" | "strict" => Ok(Self::Unambiguous),
            other => Err(format!("unknown path resolution policy `{other}`")),
        }
    }
}

/// Outcome of resolving one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The path is in the snapshot as given.
    Exact(String),
    /// The path was mapped onto a different snapshot entry.
    Matched { requested: String, path: String },
    /// Nothing in the snapshot matches; the model-given path stands.
    Unresolved(String),
}

impl Resolution {
    /// The path downstream stages should use.
    pub fn path(&self) -> &str {
        match self {
            Self::Exact(p) | Self::Unresolved(p) => p,
            Self::Matched { path, .. } => path,
        }
    }

    /// `true` when the path names an existing snapshot file.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unresolved(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("path `{requested}` is ambiguous: matches {}", .candidates.join(", "))]
    Ambiguous {
        requested: String,
        candidates: Vec<String>,
    },
}

/// Resolves paths against a borrowed snapshot.
pub struct PathResolver<'a> {
    snapshot: &'a ProjectSnapshot,
    policy: ResolutionPolicy,
}

impl<'a> PathResolver<'a> {
    pub fn new(snapshot: &'a ProjectSnapshot, policy: ResolutionPolicy) -> Self {
        Self { snapshot, policy }
    }

    pub fn resolve(&self, requested: &str) -> Result<Resolution, ResolveError> {
        let key = canonical_key(requested);
        if self.snapshot.contains(&key) {
            return Ok(Resolution::Exact(key));
        }

        let lowered = key.to_lowercase();
        let same_path: Vec<&str> = self
            .snapshot
            .paths()
            .filter(|p| p.to_lowercase() == lowered)
            .collect();
        if !same_path.is_empty() {
            return self.pick(&key, same_path);
        }

        let wanted = basename(&key).to_lowercase();
        if wanted.is_empty() {
            return Ok(Resolution::Unresolved(key));
        }
        let same_name: Vec<&str> = self
            .snapshot
            .paths()
            .filter(|p| basename(p).to_lowercase() == wanted)
            .collect();
        if same_name.is_empty() {
            return Ok(Resolution::Unresolved(key));
        }
        self.pick(&key, same_name)
    }

    fn pick(&self, requested: &str, candidates: Vec<&str>) -> Result<Resolution, ResolveError> {
        let matched = |path: &str| Resolution::Matched {
            requested: requested.to_string(),
            path: path.to_string(),
        };
        let ambiguous = |paths: &[&str]| ResolveError::Ambiguous {
            requested: requested.to_string(),
            candidates: paths.iter().map(|p| p.to_string()).collect(),
        };

        match self.policy {
            ResolutionPolicy::FirstMatch => Ok(matched(candidates[0])),
            ResolutionPolicy::Unambiguous if candidates.len() == 1 => Ok(matched(candidates[0])),
            ResolutionPolicy::Unambiguous => Err(ambiguous(&candidates[..])),
            ResolutionPolicy::Closest => {
                let wanted = requested.split('/').count();
                let winners: Vec<&str> = candidates
                    .iter()
                    .copied()
                    .filter(|c| shared_suffix_len(requested, c) == wanted)
                    .collect();
                match winners.len() {
                    0 => Ok(Resolution::Unresolved(requested.to_string())),
                    1 => Ok(matched(winners[0])),
                    _ => Err(ambiguous(&winners[..])),
                }
            }
        }
    }
}

/// Number of trailing path components two paths share, case-insensitively.
fn shared_suffix_len(a: &str, b: &str) -> usize {
    let a: Vec<String> = a.split('/').map(str::to_lowercase).collect();
    let b: Vec<String> = b.split('/').map(str::to_lowercase).collect();
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}
