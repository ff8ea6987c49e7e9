//! Built-in tool table

use crate::types::ToolTable;
use std::collections::BTreeMap;

/// Tools bootstrapped when the config file does not name any
///
/// Each entry maps a buildable import path to the repositories that must be present
/// in the workspace for `go build` to succeed.
const DEFAULT_TOOLS: &[(&str, &[&str])] = &[
    (
        "golang.org/x/lint/golint",
        &["golang.org/x/lint", "golang.org/x/tools"],
    ),
    ("golang.org/x/tools/cmd/gorename", &["golang.org/x/tools"]),
    ("golang.org/x/tools/cmd/guru", &["golang.org/x/tools"]),
    ("golang.org/x/tools/cmd/goimports", &["golang.org/x/tools"]),
    ("golang.org/x/tools/cmd/gotype", &["golang.org/x/tools"]),
    ("golang.org/x/tools/cmd/eg", &["golang.org/x/tools"]),
    (
        "github.com/derekparker/delve/cmd/dlv",
        &["github.com/derekparker/delve"],
    ),
    (
        "honnef.co/go/tools/cmd/megacheck",
        &[
            "honnef.co/go/tools",
            "golang.org/x/tools",
            "github.com/kisielk/gotool",
        ],
    ),
    (
        "github.com/shurcooL/binstale",
        &["github.com/shurcooL/binstale"],
    ),
    (
        "github.com/shurcooL/Go-Package-Store",
        &[
            "github.com/shurcooL/Go-Package-Store",
            "golang.org/x/tools",
            "github.com/shurcooL/vcsstate",
            "github.com/shurcooL/go/trim",
            "github.com/kisielk/gotool",
            "github.com/bradfitz/iter",
        ],
    ),
    (
        "github.com/shurcooL/gostatus",
        &["github.com/shurcooL/gostatus"],
    ),
    (
        "github.com/rjeczalik/bin/cmd/gobin",
        &["github.com/rjeczalik/bin", "github.com/rjeczalik/which"],
    ),
    ("github.com/rogpeppe/govers", &["github.com/rogpeppe/govers"]),
    (
        "github.com/loov/view-annotated-file",
        &["github.com/loov/view-annotated-file"],
    ),
    (
        "github.com/awalterschulze/goderive",
        &["github.com/awalterschulze/goderive"],
    ),
];

/// The built-in tool table, every dependency at its default head
pub fn default_tools() -> ToolTable {
    DEFAULT_TOOLS
        .iter()
        .map(|(tool, deps)| {
            let deps: BTreeMap<String, String> = deps
                .iter()
                .map(|repo| (repo.to_string(), String::new()))
                .collect();
            (tool.to_string(), deps)
        })
        .collect()
}

/// Build targets of a table, in table order
pub fn build_targets(tools: &ToolTable) -> Vec<String> {
    tools.keys().cloned().collect()
}
