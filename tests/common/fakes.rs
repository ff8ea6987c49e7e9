//! In-memory fetch and build collaborators

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolstrap::{BuildOutput, Builder, DepInfo, Error, Fetcher, RepoInfo, Result, VcsKind};

/// Fetcher that creates the repository directory and records every call
#[derive(Default)]
pub struct FakeFetcher {
    /// Dependencies fetched, in call order
    pub fetched: Mutex<Vec<DepInfo>>,
    /// Repository that fails instead of being fetched
    pub fail_repo: Option<String>,
    /// Simulated network latency per fetch
    pub delay: Duration,
}

impl FakeFetcher {
    /// A fetcher that fails on `repo`
    pub fn failing_on(repo: &str) -> Self {
        Self {
            fail_repo: Some(repo.to_string()),
            ..Default::default()
        }
    }

    /// Number of fetch calls so far
    pub fn calls(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(
        &self,
        dep: &DepInfo,
        src_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<RepoInfo> {
        self.fetched.lock().unwrap().push(dep.clone());
        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
        if self.fail_repo.as_deref() == Some(dep.repo.as_str()) {
            return Err(Error::ExternalTool(format!("unreachable host for {}", dep.repo)));
        }
        let root = src_dir.join(&dep.repo);
        tokio::fs::create_dir_all(&root).await?;
        Ok(RepoInfo {
            root,
            import_path: dep.repo.clone(),
            vcs: VcsKind::Git,
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Builder that writes an empty file named after the target's last path element
pub struct FakeBuilder {
    /// Directory binaries are written to
    pub bin_dir: PathBuf,
    /// Number of build calls so far
    pub calls: AtomicUsize,
    /// Target that fails to compile
    pub fail_target: Option<String>,
}

impl FakeBuilder {
    /// A builder writing into `bin_dir`
    pub fn new(bin_dir: &Path) -> Self {
        Self {
            bin_dir: bin_dir.to_path_buf(),
            calls: AtomicUsize::new(0),
            fail_target: None,
        }
    }
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn build(&self, target: &str, _cancel: &CancellationToken) -> Result<BuildOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_target.as_deref() == Some(target) {
            return Err(toolstrap::BuildError::Failed {
                target: target.to_string(),
                status: "exit status: 2".into(),
                stderr: "undefined: Foo".into(),
            }
            .into());
        }
        let name = target.rsplit('/').next().unwrap_or(target);
        tokio::fs::write(self.bin_dir.join(name), b"").await?;
        Ok(BuildOutput {
            target: target.to_string(),
            binary_dir: self.bin_dir.clone(),
            stderr: String::new(),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
