//! Concurrent batch execution
//!
//! The engine shared by the download and build phases:
//!
//! - [`partition`] splits an item count into balanced contiguous ranges
//! - [`BatchRunner`] runs one worker per range and stops everything on the first failure
//! - [`flatten`] turns the tool table into a duplicate-free dependency list
//!
//! ## Usage
//!
//! ```no_run
//! use toolstrap::batch::{BatchRunner, action_fn};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> toolstrap::Result<()> {
//! let runner = BatchRunner::new(4)?;
//! let targets = vec!["golang.org/x/tools/cmd/guru".to_string()];
//! runner
//!     .run(
//!         targets,
//!         action_fn(|target: String, _cancel| async move {
//!             println!("would build {target}");
//!             Ok(())
//!         }),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod collect;
mod partition;
mod runner;

pub use collect::flatten;
pub use partition::{WorkRange, partition};
pub use runner::{BatchAction, BatchRunner, FnAction, action_fn};
