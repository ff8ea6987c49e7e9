//! Version control: import-path resolution and repository checkout
//!
//! A dependency is named by its Go import path (`golang.org/x/tools`). Before it can
//! be cloned, the path is resolved to a [`RepoRoot`](crate::types::RepoRoot): the
//! repository's root import path, its version control system, and a clone URL.
//! Well-known hosts resolve without network access; everything else goes through
//! `?go-get=1` discovery.

mod fetch;
mod resolve;

pub use fetch::{CliFetcher, Fetcher, VcsStep, checkout_steps};
pub use resolve::{MetaImport, Resolver, match_meta_import, parse_meta_imports, resolve_static};
