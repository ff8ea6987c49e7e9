//! Core types for toolstrap

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Tool import path → (dependency repository import path → revision)
///
/// A sorted map, so flattening and build ordering are reproducible across runs.
/// An empty revision means "the repository's default head".
pub type ToolTable = BTreeMap<String, BTreeMap<String, String>>;

/// One repository to fetch at one revision
///
/// Equality is structural: two entries naming the same repository at the same
/// revision are the same dependency.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepInfo {
    /// Import path of the repository (or of any package inside it)
    pub repo: String,
    /// Revision to check out (empty = default branch head)
    #[serde(default)]
    pub rev: String,
}

impl DepInfo {
    /// Create a new DepInfo
    pub fn new(repo: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            rev: rev.into(),
        }
    }

    /// Whether a specific revision was requested
    pub fn has_rev(&self) -> bool {
        !self.rev.is_empty()
    }
}

impl std::fmt::Display for DepInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_rev() {
            write!(f, "{}@{}", self.repo, self.rev)
        } else {
            write!(f, "{}", self.repo)
        }
    }
}

/// Version control systems toolstrap knows how to drive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    /// Git
    Git,
    /// Mercurial
    Hg,
    /// Subversion
    Svn,
    /// Bazaar
    Bzr,
}

impl VcsKind {
    /// All supported systems, in the order suffix matching tries them
    pub const ALL: [VcsKind; 4] = [VcsKind::Git, VcsKind::Hg, VcsKind::Svn, VcsKind::Bzr];

    /// Name of the command line binary
    pub fn cmd(&self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Hg => "hg",
            VcsKind::Svn => "svn",
            VcsKind::Bzr => "bzr",
        }
    }
}

impl std::fmt::Display for VcsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cmd())
    }
}

impl std::str::FromStr for VcsKind {
    type Err = crate::error::VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(VcsKind::Git),
            "hg" => Ok(VcsKind::Hg),
            "svn" => Ok(VcsKind::Svn),
            "bzr" => Ok(VcsKind::Bzr),
            other => Err(crate::error::VcsError::UnknownVcs(other.to_string())),
        }
    }
}

/// Where an import path lives: repository root, VCS and clone URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoRoot {
    /// Import path prefix that corresponds to the repository root
    pub root: String,
    /// Version control system of the repository
    pub vcs: VcsKind,
    /// URL to clone from
    pub repo: String,
}

/// A repository checked out on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoInfo {
    /// Directory the repository was checked out into
    pub root: PathBuf,
    /// Import path of the repository root
    pub import_path: String,
    /// Version control system used
    pub vcs: VcsKind,
}

/// Result of a successful build
#[derive(Clone, Debug)]
pub struct BuildOutput {
    /// Build target import path
    pub target: String,
    /// Directory the binary was written to
    pub binary_dir: PathBuf,
    /// Anything the compiler wrote to stderr (warnings)
    pub stderr: String,
}

/// The two strictly sequenced phases of a bootstrap run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Fetch repositories into the workspace
    Download,
    /// Build tools into the binary directory
    Build,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Download => f.write_str("download"),
            Phase::Build => f.write_str("build"),
        }
    }
}

/// Counts for one finished batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Number of work items in the batch
    pub total: usize,
    /// Number of workers that were launched
    pub workers: usize,
    /// Number of actions that were started
    pub started: usize,
    /// Number of actions that finished successfully
    pub succeeded: usize,
}

impl BatchStats {
    /// Items that were never started because the batch was cancelled
    pub fn skipped(&self) -> usize {
        self.total - self.started
    }
}
