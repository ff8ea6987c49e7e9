//! Download-then-build orchestration
//!
//! [`run_downloads`] and [`run_builds`] wire the batch engine to the fetch and build
//! collaborators. [`Bootstrapper`] adds the workspace lifecycle around them: the
//! scratch workspace is created first and removed when the run ends (successfully
//! or not), and the binary directory is created between the two phases.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchAction, BatchRunner, flatten};
use crate::build::{Builder, GoBuilder};
use crate::config::Config;
use crate::error::Result;
use crate::manifest::build_targets;
use crate::types::{BuildOutput, DepInfo, Phase, RepoInfo, ToolTable};
use crate::vcs::{CliFetcher, Fetcher, Resolver};

struct FetchAction {
    fetcher: Arc<dyn Fetcher>,
    src_dir: PathBuf,
    fetched: Mutex<Vec<RepoInfo>>,
}

#[async_trait]
impl BatchAction<DepInfo> for FetchAction {
    async fn run(&self, dep: &DepInfo, cancel: &CancellationToken) -> Result<()> {
        let info = self.fetcher.fetch(dep, &self.src_dir, cancel).await?;
        match self.fetched.lock() {
            Ok(mut fetched) => fetched.push(info),
            Err(poisoned) => poisoned.into_inner().push(info),
        }
        Ok(())
    }
}

struct BuildAction {
    builder: Arc<dyn Builder>,
    built: Mutex<Vec<BuildOutput>>,
}

#[async_trait]
impl BatchAction<String> for BuildAction {
    async fn run(&self, target: &String, cancel: &CancellationToken) -> Result<()> {
        let output = self.builder.build(target, cancel).await?;
        match self.built.lock() {
            Ok(mut built) => built.push(output),
            Err(poisoned) => poisoned.into_inner().push(output),
        }
        Ok(())
    }
}

fn drain<T>(slot: &Mutex<Vec<T>>) -> Vec<T> {
    match slot.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    }
}

/// Fetch every distinct dependency of `groups` into `dest_root/src`
///
/// The table is flattened first, so a repository shared by several tools is fetched
/// once. Returns the checkouts sorted by directory.
///
/// # Errors
///
/// The first failed fetch, as [`Error::ActionFailed`](crate::Error::ActionFailed)
/// naming the dependency, or [`Error::Cancelled`](crate::Error::Cancelled).
pub async fn run_downloads(
    groups: &ToolTable,
    dest_root: &Path,
    workers: usize,
    fetcher: Arc<dyn Fetcher>,
    cancel: &CancellationToken,
) -> Result<Vec<RepoInfo>> {
    let runner = BatchRunner::new(workers)?.with_phase(Phase::Download);
    let deps = flatten(groups);
    tracing::info!(
        tools = groups.len(),
        dependencies = deps.len(),
        fetcher = fetcher.name(),
        "Fetching dependencies"
    );

    let action = Arc::new(FetchAction {
        fetcher,
        src_dir: dest_root.join("src"),
        fetched: Mutex::new(Vec::new()),
    });
    runner.run(deps, action.clone(), cancel).await?;

    let mut fetched = drain(&action.fetched);
    fetched.sort_by(|a, b| a.root.cmp(&b.root));
    Ok(fetched)
}

/// Build every target, one `Builder::build` call per target
///
/// # Errors
///
/// The first failed build, as [`Error::ActionFailed`](crate::Error::ActionFailed)
/// naming the target, or [`Error::Cancelled`](crate::Error::Cancelled).
pub async fn run_builds(
    targets: Vec<String>,
    workers: usize,
    builder: Arc<dyn Builder>,
    cancel: &CancellationToken,
) -> Result<Vec<BuildOutput>> {
    let runner = BatchRunner::new(workers)?.with_phase(Phase::Build);
    tracing::info!(targets = targets.len(), builder = builder.name(), "Building tools");

    let action = Arc::new(BuildAction {
        builder,
        built: Mutex::new(Vec::new()),
    });
    runner.run(targets, action.clone(), cancel).await?;

    let mut built = drain(&action.built);
    built.sort_by(|a, b| a.target.cmp(&b.target));
    Ok(built)
}

/// Outcome of a complete run
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Repositories checked out during the download phase
    pub fetched: Vec<RepoInfo>,
    /// Tools built during the build phase
    pub built: Vec<BuildOutput>,
}

/// Runs the whole bootstrap: workspace, downloads, binary directory, builds
pub struct Bootstrapper {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    builder: Arc<dyn Builder>,
}

impl Bootstrapper {
    /// Create a bootstrapper with explicit collaborators
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>, builder: Arc<dyn Builder>) -> Self {
        Self {
            config,
            fetcher,
            builder,
        }
    }

    /// Create a bootstrapper using the VCS command line clients and `go build`
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = CliFetcher::new(
            Resolver::new()?,
            config.binaries.clone(),
            config.retry.clone(),
        );
        let builder = GoBuilder::from_config(&config)?;
        Ok(Self::new(config, Arc::new(fetcher), Arc::new(builder)))
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch the dependencies of `table` and build its tools
    ///
    /// A workspace created by this run is removed afterwards unless `keep_workspace`
    /// is set, whether or not the run succeeded. A directory that already existed is
    /// left in place.
    pub async fn run(&self, table: &ToolTable, cancel: &CancellationToken) -> Result<RunSummary> {
        let targets = build_targets(table);
        self.with_workspace(cancel, |scope| async move {
            let fetched = self.download(table, &scope).await?;
            self.create_bin_dir().await?;
            let built = run_builds(
                targets,
                self.config.concurrency.build_workers,
                Arc::clone(&self.builder),
                &scope,
            )
            .await?;
            Ok(RunSummary { fetched, built })
        })
        .await
    }

    /// Only fetch the dependencies of `table`
    pub async fn fetch(&self, table: &ToolTable, cancel: &CancellationToken) -> Result<Vec<RepoInfo>> {
        self.with_workspace(cancel, |scope| async move { self.download(table, &scope).await })
            .await
    }

    async fn download(&self, table: &ToolTable, cancel: &CancellationToken) -> Result<Vec<RepoInfo>> {
        run_downloads(
            table,
            &self.config.workspace.workspace_dir,
            self.config.concurrency.download_workers,
            Arc::clone(&self.fetcher),
            cancel,
        )
        .await
    }

    async fn with_workspace<F, Fut, T>(&self, cancel: &CancellationToken, body: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let workspace = &self.config.workspace.workspace_dir;
        // Only a workspace this run created is removed afterwards
        let created = !tokio::fs::try_exists(workspace).await?;
        create_private_dir(workspace).await?;
        tracing::debug!(workspace = %workspace.display(), created, "Workspace ready");

        let scope = cancel.child_token();
        let deadline = self.config.concurrency.deadline.map(|limit| {
            let scope = scope.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!(deadline_secs = limit.as_secs_f64(), "Deadline reached, cancelling");
                        scope.cancel();
                    }
                    _ = scope.cancelled() => {}
                }
            })
        });

        let result = body(scope).await;

        if let Some(handle) = deadline {
            handle.abort();
        }
        if self.config.workspace.keep_workspace {
            tracing::info!(workspace = %workspace.display(), "Keeping workspace");
        } else if !created {
            tracing::info!(workspace = %workspace.display(), "Workspace existed before the run, leaving it in place");
        } else if let Err(e) = tokio::fs::remove_dir_all(workspace).await {
            tracing::warn!(workspace = %workspace.display(), error = %e, "Failed to remove workspace");
        }
        result
    }

    async fn create_bin_dir(&self) -> Result<()> {
        let bin_dir = &self.config.workspace.bin_dir;
        create_private_dir(bin_dir).await?;
        tracing::info!(bin_dir = %bin_dir.display(), "Binary directory ready");
        Ok(())
    }
}

/// Create `dir` and its parents; on unix new directories get mode 0700
async fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await?;
    Ok(())
}
