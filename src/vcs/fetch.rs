//! Clone-or-checkout of one dependency into the workspace

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::{BinariesConfig, RetryConfig};
use crate::error::{Result, VcsError};
use crate::retry::with_retry;
use crate::types::{DepInfo, RepoInfo, RepoRoot, VcsKind};

use super::resolve::Resolver;

/// Fetches a dependency's repository into a source directory
///
/// Implementations must overwrite anything already present at the repository's
/// root so reruns start from a clean checkout.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `dep` under `src_dir`, returning where it was checked out
    ///
    /// `cancel` fires on shutdown or deadline; running VCS commands are killed.
    async fn fetch(
        &self,
        dep: &DepInfo,
        src_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<RepoInfo>;

    /// Name of this fetcher implementation
    fn name(&self) -> &'static str;
}

/// One VCS command invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VcsStep {
    /// Arguments after the binary name
    pub args: Vec<OsString>,
    /// Working directory (None = inherit)
    pub cwd: Option<PathBuf>,
}

impl VcsStep {
    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

/// Commands that create a checkout of `repo` at `dir`, optionally at `rev`
pub fn checkout_steps(vcs: VcsKind, repo: &str, dir: &Path, rev: &str) -> Vec<VcsStep> {
    let dir_arg = dir.as_os_str().to_os_string();
    match (vcs, rev.is_empty()) {
        (VcsKind::Git, true) => vec![VcsStep::new([
            OsString::from("clone"),
            "--".into(),
            repo.into(),
            dir_arg,
        ])],
        (VcsKind::Git, false) => vec![
            VcsStep::new([OsString::from("clone"), "--".into(), repo.into(), dir_arg]),
            VcsStep::new(["checkout", rev]).in_dir(dir),
        ],
        (VcsKind::Hg, true) => vec![VcsStep::new([
            OsString::from("clone"),
            "--".into(),
            repo.into(),
            dir_arg,
        ])],
        (VcsKind::Hg, false) => vec![
            VcsStep::new([
                OsString::from("clone"),
                "-U".into(),
                "--".into(),
                repo.into(),
                dir_arg,
            ]),
            VcsStep::new(["update", "-r", rev]).in_dir(dir),
        ],
        (VcsKind::Svn, true) => vec![VcsStep::new([
            OsString::from("checkout"),
            "--".into(),
            repo.into(),
            dir_arg,
        ])],
        (VcsKind::Svn, false) => vec![VcsStep::new([
            OsString::from("checkout"),
            "-r".into(),
            rev.into(),
            "--".into(),
            repo.into(),
            dir_arg,
        ])],
        (VcsKind::Bzr, true) => vec![VcsStep::new([
            OsString::from("branch"),
            "--".into(),
            repo.into(),
            dir_arg,
        ])],
        (VcsKind::Bzr, false) => vec![VcsStep::new([
            OsString::from("branch"),
            "-r".into(),
            rev.into(),
            "--".into(),
            repo.into(),
            dir_arg,
        ])],
    }
}

/// Fetcher driving the `git`/`hg`/`svn`/`bzr` command line clients
///
/// # Examples
///
/// ```no_run
/// use toolstrap::config::{BinariesConfig, RetryConfig};
/// use toolstrap::types::DepInfo;
/// use toolstrap::vcs::{CliFetcher, Fetcher, Resolver};
/// use tokio_util::sync::CancellationToken;
/// use std::path::Path;
///
/// # async fn example() -> toolstrap::Result<()> {
/// let fetcher = CliFetcher::new(Resolver::new()?, BinariesConfig::default(), RetryConfig::default());
/// let info = fetcher
///     .fetch(
///         &DepInfo::new("golang.org/x/tools", ""),
///         Path::new("./toolsdir/src"),
///         &CancellationToken::new(),
///     )
///     .await?;
/// println!("checked out {} with {}", info.root.display(), info.vcs);
/// # Ok(())
/// # }
/// ```
pub struct CliFetcher {
    resolver: Resolver,
    binaries: BinariesConfig,
    retry: RetryConfig,
}

impl CliFetcher {
    /// Create a fetcher
    pub fn new(resolver: Resolver, binaries: BinariesConfig, retry: RetryConfig) -> Self {
        Self {
            resolver,
            binaries,
            retry,
        }
    }

    async fn checkout(
        &self,
        root: &RepoRoot,
        dir: &Path,
        rev: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let binary = self.binaries.vcs(root.vcs)?;

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => tracing::debug!(dir = %dir.display(), "Removed existing checkout"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        // Some clients require the parent of the target to exist
        if let Some(parent) = dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        for step in checkout_steps(root.vcs, &root.repo, dir, rev) {
            let mut cmd = Command::new(&binary);
            cmd.args(&step.args)
                .envs(&self.binaries.env)
                .env("GIT_TERMINAL_PROMPT", "0");
            if let Some(cwd) = &step.cwd {
                cmd.current_dir(cwd);
            }

            let output = crate::process::run(cmd, cancel).await?;
            if !output.status.success() {
                let verb = step
                    .args
                    .first()
                    .map(|a| a.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return Err(VcsError::CommandFailed {
                    command: format!("{} {}", root.vcs, verb),
                    dir: step.cwd.clone().unwrap_or_else(|| dir.to_path_buf()),
                    stderr: crate::process::text(&output.stderr),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for CliFetcher {
    async fn fetch(
        &self,
        dep: &DepInfo,
        src_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<RepoInfo> {
        let root = with_retry(&self.retry, cancel, || self.resolver.resolve(&dep.repo, cancel)).await?;
        let dir = src_dir.join(&root.root);

        tracing::info!(repo = %dep.repo, root = %root.root, vcs = %root.vcs, "Downloading");
        with_retry(&self.retry, cancel, || self.checkout(&root, &dir, &dep.rev, cancel)).await?;
        tracing::info!(repo = %dep.repo, dir = %dir.display(), "Done with");

        Ok(RepoInfo {
            root: dir,
            import_path: root.root,
            vcs: root.vcs,
        })
    }

    fn name(&self) -> &'static str {
        "cli-vcs"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn args(step: &VcsStep) -> Vec<String> {
        step.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn git_clone_at_head_is_a_single_step() {
        let dir = Path::new("/ws/src/github.com/a/b");
        let steps = checkout_steps(VcsKind::Git, "https://github.com/a/b", dir, "");

        assert_eq!(steps.len(), 1);
        assert_eq!(
            args(&steps[0]),
            vec!["clone", "--", "https://github.com/a/b", "/ws/src/github.com/a/b"]
        );
        assert!(steps[0].cwd.is_none());
    }

    #[test]
    fn git_clone_at_revision_checks_out_inside_the_repository() {
        let dir = Path::new("/ws/src/github.com/a/b");
        let steps = checkout_steps(VcsKind::Git, "https://github.com/a/b", dir, "v1.2.0");

        assert_eq!(steps.len(), 2);
        assert_eq!(args(&steps[1]), vec!["checkout", "v1.2.0"]);
        assert_eq!(steps[1].cwd.as_deref(), Some(dir));
    }

    #[test]
    fn hg_at_revision_clones_without_working_copy_then_updates() {
        let dir = Path::new("/ws/src/example.org/r.hg");
        let steps = checkout_steps(VcsKind::Hg, "https://example.org/r.hg", dir, "abc");

        assert_eq!(args(&steps[0])[..2], ["clone", "-U"]);
        assert_eq!(args(&steps[1]), vec!["update", "-r", "abc"]);
    }

    #[test]
    fn svn_and_bzr_take_revision_in_one_step() {
        let dir = Path::new("/d");
        for vcs in [VcsKind::Svn, VcsKind::Bzr] {
            let steps = checkout_steps(vcs, "https://r", dir, "42");
            assert_eq!(steps.len(), 1, "{vcs}");
            assert!(args(&steps[0]).contains(&"-r".to_string()));
            assert!(args(&steps[0]).contains(&"42".to_string()));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cli_fetcher_replaces_existing_checkout_and_reports_failures() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let stale = src.join("github.com/a/b/stale.txt");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        // A fake git that fails every clone
        let fake_git = dir.path().join("git");
        std::fs::write(&fake_git, "#!/bin/sh\necho 'fatal: repository not found' >&2\nexit 128\n")
            .unwrap();
        std::fs::set_permissions(&fake_git, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fetcher = CliFetcher::new(
            Resolver::new().unwrap(),
            BinariesConfig {
                git_path: Some(fake_git),
                search_path: false,
                ..Default::default()
            },
            RetryConfig {
                max_attempts: 0,
                ..Default::default()
            },
        );

        let err = fetcher
            .fetch(
                &DepInfo::new("github.com/a/b", ""),
                &src,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(!stale.exists(), "existing checkout is removed first");
        match err {
            Error::Vcs(VcsError::CommandFailed { command, stderr, .. }) => {
                assert_eq!(command, "git clone");
                assert!(stderr.contains("repository not found"));
            }
            other => panic!("expected command failure, got {other:?}"),
        }
    }
}
