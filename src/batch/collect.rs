//! Flattening the tool table into a duplicate-free fetch list.

use std::collections::HashSet;

use crate::types::{DepInfo, ToolTable};

/// Flatten tool → (repository → revision) groups into a list of dependencies.
///
/// Each `(repo, rev)` pair appears once, at the position it was first seen while
/// walking tools in table order and then each tool's repositories in order.
/// Later duplicates are skipped silently. The same repository at two different
/// revisions is kept twice.
pub fn flatten(groups: &ToolTable) -> Vec<DepInfo> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut deps = Vec::new();

    for deps_of_tool in groups.values() {
        for (repo, rev) in deps_of_tool {
            if seen.insert((repo.as_str(), rev.as_str())) {
                deps.push(DepInfo::new(repo.as_str(), rev.as_str()));
            }
        }
    }

    deps
}
