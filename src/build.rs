//! Building tool binaries with the Go toolchain

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::types::BuildOutput;

/// Builds one target into a binary
#[async_trait]
pub trait Builder: Send + Sync {
    /// Build `target` (an import path naming a main package)
    ///
    /// `cancel` fires on shutdown or deadline; a running compiler is killed.
    async fn build(&self, target: &str, cancel: &CancellationToken) -> Result<BuildOutput>;

    /// Name of this builder implementation
    fn name(&self) -> &'static str;
}

/// Builder running `go build <target>` inside the binary directory
///
/// The workspace is passed to the compiler as `GOPATH` and modules are switched off,
/// so imports resolve against the freshly fetched sources. Both are set on the child
/// command only.
///
/// # Examples
///
/// ```no_run
/// use toolstrap::build::{Builder, GoBuilder};
/// use toolstrap::Config;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> toolstrap::Result<()> {
/// let builder = GoBuilder::from_config(&Config::default())?;
/// builder
///     .build("golang.org/x/tools/cmd/guru", &CancellationToken::new())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct GoBuilder {
    go: PathBuf,
    gopath: PathBuf,
    bin_dir: PathBuf,
    env: BTreeMap<String, String>,
}

impl GoBuilder {
    /// Create a builder with an explicit `go` binary
    ///
    /// # Arguments
    ///
    /// * `go` - Path to the go binary
    /// * `gopath` - Workspace holding the fetched sources under `src/`
    /// * `bin_dir` - Directory the binaries are written to
    pub fn new(go: PathBuf, gopath: PathBuf, bin_dir: PathBuf) -> Self {
        Self {
            go,
            gopath,
            bin_dir,
            env: BTreeMap::new(),
        }
    }

    /// Extra environment variables for every build (override the defaults)
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Create a builder from the configuration, locating `go` on PATH if needed
    pub fn from_config(config: &Config) -> Result<Self> {
        let go = config.binaries.go()?;
        Ok(Self::new(
            go,
            absolute(&config.workspace.workspace_dir)?,
            config.workspace.bin_dir.clone(),
        )
        .with_env(config.binaries.env.clone()))
    }
}

/// GOPATH must be absolute; the compiler rejects relative entries
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[async_trait]
impl Builder for GoBuilder {
    async fn build(&self, target: &str, cancel: &CancellationToken) -> Result<BuildOutput> {
        tracing::info!(target_path = %target, bin_dir = %self.bin_dir.display(), "Building");

        let mut cmd = Command::new(&self.go);
        cmd.arg("build")
            .arg(target)
            .current_dir(&self.bin_dir)
            .env("GOPATH", &self.gopath)
            .env("GO111MODULE", "off")
            .envs(&self.env);

        let output = crate::process::run(cmd, cancel).await?;
        let stderr = crate::process::text(&output.stderr);

        if !output.status.success() {
            tracing::error!(target_path = %target, stderr = %stderr, "Error with");
            return Err(BuildError::Failed {
                target: target.to_string(),
                status: output.status.to_string(),
                stderr,
            }
            .into());
        }

        if !stderr.is_empty() {
            tracing::warn!(target_path = %target, stderr = %stderr, "Compiler output");
        }
        Ok(BuildOutput {
            target: target.to_string(),
            binary_dir: self.bin_dir.clone(),
            stderr,
        })
    }

    fn name(&self) -> &'static str {
        "go-build"
    }
}
