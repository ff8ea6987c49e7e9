//! Configuration types for toolstrap

use crate::error::{Error, Result};
use crate::types::{ToolTable, VcsKind};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

/// Directory layout (scratch workspace and binary output)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Scratch directory repositories are fetched into (default: "./toolsdir")
    ///
    /// Used as `GOPATH` for the build phase; sources land under `<workspace_dir>/src`.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Directory built binaries are written to (default: "$HOME/gotools")
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,

    /// Keep the scratch workspace after the run instead of deleting it (default: false)
    #[serde(default)]
    pub keep_workspace: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            bin_dir: default_bin_dir(),
            keep_workspace: false,
        }
    }
}

/// Worker pool sizes and the optional overall deadline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Workers for the download phase (default: 2 × available parallelism)
    ///
    /// Fetches are network bound, so the pool is oversubscribed.
    #[serde(default = "default_download_workers")]
    pub download_workers: usize,

    /// Workers for the build phase (default: available parallelism)
    #[serde(default = "default_build_workers")]
    pub build_workers: usize,

    /// Cancel everything still running after this long (None = no deadline)
    #[serde(
        default,
        with = "optional_duration_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Duration>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            download_workers: default_download_workers(),
            build_workers: default_build_workers(),
            deadline: None,
        }
    }
}

/// External binary paths (go, git, hg, svn, bzr) and the subprocess environment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BinariesConfig {
    /// Path to go executable (auto-detected if None)
    #[serde(default)]
    pub go_path: Option<PathBuf>,

    /// Path to git executable (auto-detected if None)
    #[serde(default)]
    pub git_path: Option<PathBuf>,

    /// Path to hg executable (auto-detected if None)
    #[serde(default)]
    pub hg_path: Option<PathBuf>,

    /// Path to svn executable (auto-detected if None)
    #[serde(default)]
    pub svn_path: Option<PathBuf>,

    /// Path to bzr executable (auto-detected if None)
    #[serde(default)]
    pub bzr_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Extra environment variables passed to every subprocess
    ///
    /// Applied per command; the process environment of toolstrap itself is never modified.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for BinariesConfig {
    fn default() -> Self {
        Self {
            go_path: None,
            git_path: None,
            hg_path: None,
            svn_path: None,
            bzr_path: None,
            search_path: true,
            env: BTreeMap::new(),
        }
    }
}

impl BinariesConfig {
    /// Locate the `go` binary
    pub fn go(&self) -> Result<PathBuf> {
        self.locate("go", self.go_path.as_ref())
    }

    /// Locate the binary that drives a version control system
    pub fn vcs(&self, kind: VcsKind) -> Result<PathBuf> {
        let explicit = match kind {
            VcsKind::Git => self.git_path.as_ref(),
            VcsKind::Hg => self.hg_path.as_ref(),
            VcsKind::Svn => self.svn_path.as_ref(),
            VcsKind::Bzr => self.bzr_path.as_ref(),
        };
        self.locate(kind.cmd(), explicit)
    }

    fn locate(&self, name: &str, explicit: Option<&PathBuf>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.clone());
        }
        if !self.search_path {
            return Err(Error::NotSupported(format!(
                "{name} path not configured and PATH search is disabled"
            )));
        }
        which::which(name)
            .map_err(|e| Error::NotSupported(format!("{name} not found in PATH: {e}")))
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for a bootstrap run
///
/// Sections map one to one onto TOML tables:
///
/// ```toml
/// [workspace]
/// bin_dir = "/home/me/gotools"
///
/// [concurrency]
/// download_workers = 8
/// deadline = 900
///
/// [tools."golang.org/x/lint/golint"]
/// "golang.org/x/lint" = ""
/// "golang.org/x/tools" = ""
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory layout
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Worker pool sizes and deadline
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// External binaries and subprocess environment
    #[serde(default)]
    pub binaries: BinariesConfig,

    /// Fetch retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Tools to build and the repositories each one needs (default: built-in set)
    #[serde(default = "crate::manifest::default_tools")]
    pub tools: ToolTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: WorkspaceConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            binaries: BinariesConfig::default(),
            retry: RetryConfig::default(),
            tools: crate::manifest::default_tools(),
        }
    }
}

impl Config {
    /// Read a config file, falling back to defaults for anything it leaves out
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|source| {
            tracing::warn!(path = %path.display(), error = %source, "Failed to parse config");
            Error::TomlParse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency.download_workers == 0 {
            return Err(Error::Config {
                message: "download_workers must be at least 1".into(),
                key: Some("download_workers".into()),
            });
        }
        if self.concurrency.build_workers == 0 {
            return Err(Error::Config {
                message: "build_workers must be at least 1".into(),
                key: Some("build_workers".into()),
            });
        }
        if self.workspace.workspace_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "workspace_dir must not be empty".into(),
                key: Some("workspace_dir".into()),
            });
        }
        if self.workspace.bin_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "bin_dir must not be empty".into(),
                key: Some("bin_dir".into()),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: format!("backoff_multiplier must be a finite number >= 1.0, got {multiplier}"),
                key: Some("backoff_multiplier".into()),
            });
        }
        for (tool, deps) in &self.tools {
            if deps.is_empty() {
                return Err(Error::Config {
                    message: format!("tool {tool} lists no repositories to fetch"),
                    key: Some("tools".into()),
                });
            }
        }
        Ok(())
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("./toolsdir")
}

fn default_bin_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("gotools"))
        .unwrap_or_else(|| PathBuf::from("./gotools"))
}

fn default_download_workers() -> usize {
    available_parallelism() * 2
}

fn default_build_workers() -> usize {
    available_parallelism()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
