//! Tool tables and configuration for integration tests

use std::collections::BTreeMap;
use std::path::Path;
use toolstrap::{Config, ToolTable};

/// Build a tool table from `(tool, [(repo, rev)])` entries
pub fn tool_table(entries: &[(&str, &[(&str, &str)])]) -> ToolTable {
    entries
        .iter()
        .map(|(tool, deps)| {
            let deps: BTreeMap<String, String> = deps
                .iter()
                .map(|(repo, rev)| (repo.to_string(), rev.to_string()))
                .collect();
            (tool.to_string(), deps)
        })
        .collect()
}

/// Three tools sharing `golang.org/x/tools`
pub fn shared_tools() -> ToolTable {
    tool_table(&[
        (
            "golang.org/x/tools/cmd/guru",
            &[("golang.org/x/tools", "")],
        ),
        (
            "golang.org/x/tools/cmd/gorename",
            &[("golang.org/x/tools", "")],
        ),
        (
            "github.com/golang/lint/golint",
            &[("github.com/golang/lint", ""), ("golang.org/x/tools", "")],
        ),
    ])
}

/// Configuration with every directory under `root`
pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.workspace.workspace_dir = root.join("toolsdir");
    config.workspace.bin_dir = root.join("gotools");
    config.concurrency.download_workers = 4;
    config.concurrency.build_workers = 2;
    config
}
