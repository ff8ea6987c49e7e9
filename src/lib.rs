//! # toolstrap
//!
//! Bootstraps a set of Go development tools: fetches every repository the tools
//! depend on into a scratch workspace, then builds each tool into a binary directory.
//!
//! ## Design
//!
//! - **Two phases** - all downloads finish before any build starts
//! - **Fixed worker pools** - items are split into contiguous ranges, one worker each
//! - **First error wins** - a failure stops new work in its phase and is reported
//!   with the item that caused it
//! - **Cooperative cancellation** - shutdown signals and the optional deadline kill
//!   running subprocesses and stop workers at the next item
//!
//! ## Quick Start
//!
//! ```no_run
//! use toolstrap::{Bootstrapper, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let tools = config.tools.clone();
//!     let bootstrapper = Bootstrapper::from_config(config)?;
//!
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(toolstrap::shutdown_on_signal(cancel.clone()));
//!
//!     let summary = bootstrapper.run(&tools, &cancel).await?;
//!     println!("built {} tools", summary.built.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Concurrent batch execution
pub mod batch;
/// Download and build orchestration
pub mod bootstrap;
/// Building tool binaries
pub mod build;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Built-in tool table
pub mod manifest;
mod process;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;
/// Import-path resolution and repository checkout
pub mod vcs;

// Re-export commonly used types
pub use batch::{BatchAction, BatchRunner, flatten, partition};
pub use bootstrap::{Bootstrapper, RunSummary, run_builds, run_downloads};
pub use build::{Builder, GoBuilder};
pub use config::Config;
pub use error::{BuildError, Error, Result, ToExitCode, VcsError};
pub use types::{BatchStats, BuildOutput, DepInfo, Phase, RepoInfo, RepoRoot, ToolTable, VcsKind};
pub use vcs::{CliFetcher, Fetcher, Resolver};

/// Cancel `token` when a termination signal arrives.
///
/// Running subprocesses are killed and workers stop at their next item; the
/// interrupted run then returns [`Error::Cancelled`].
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early without cancelling if `token` is cancelled by someone else.
pub async fn shutdown_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::warn!("Shutting down, cancelling running work");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn shutdown_listener_exits_when_token_is_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let listener = tokio::spawn(shutdown_on_signal(token.clone()));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), listener)
            .await
            .expect("listener returns")
            .unwrap();
    }
}
