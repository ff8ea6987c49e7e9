//! Import path → repository root resolution
//!
//! Well-known hosts are matched by static rules. Paths carrying an explicit VCS
//! suffix (`example.org/repo.git/pkg`) name their repository directly. Anything
//! else is discovered by fetching `https://<import path>?go-get=1` and reading
//! the page's `go-import` meta tags.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result, VcsError};
use crate::types::{RepoRoot, VcsKind};

/// Timeout for a single discovery request
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// A host whose repository layout is known without asking the network
struct StaticRule {
    prefix: &'static str,
    pattern: Regex,
    vcs: VcsKind,
    /// Clone URL; `{root}` and `{name}` capture groups are substituted
    repo: &'static str,
}

#[allow(clippy::expect_used)]
fn static_rules() -> &'static [StaticRule] {
    static RULES: OnceLock<Vec<StaticRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        // Patterns are literals; failing to compile one is a programming error.
        let rule = |prefix, pattern: &str, vcs, repo| StaticRule {
            prefix,
            pattern: Regex::new(pattern).expect("static import path pattern"),
            vcs,
            repo,
        };
        vec![
            rule(
                "github.com/",
                r"^(?P<root>github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[\p{L}0-9_.\-]+)*$",
                VcsKind::Git,
                "https://{root}",
            ),
            rule(
                "bitbucket.org/",
                r"^(?P<root>bitbucket\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                VcsKind::Git,
                "https://{root}",
            ),
            rule(
                "golang.org/x/",
                r"^(?P<root>golang\.org/x/(?P<name>[A-Za-z0-9_.\-]+))(/[A-Za-z0-9_.\-]+)*$",
                VcsKind::Git,
                "https://go.googlesource.com/{name}",
            ),
            rule(
                "hub.jazz.net/git/",
                r"^(?P<root>hub\.jazz\.net/git/[a-z0-9]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                VcsKind::Git,
                "https://{root}",
            ),
            rule(
                "git.apache.org/",
                r"^(?P<root>git\.apache\.org/[a-z0-9_.\-]+\.git)(/[A-Za-z0-9_.\-]+)*$",
                VcsKind::Git,
                "https://{root}",
            ),
            rule(
                "git.openstack.org/",
                r"^(?P<root>git\.openstack\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(\.git)?(/[A-Za-z0-9_.\-]+)*$",
                VcsKind::Git,
                "https://{root}",
            ),
            rule(
                "launchpad.net/",
                r"^(?P<root>launchpad\.net/(([A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)?|~[A-Za-z0-9_.\-]+/(\+junk|[A-Za-z0-9_.\-]+)/[A-Za-z0-9_.\-]+))(/[A-Za-z0-9_.\-]+)*$",
                VcsKind::Bzr,
                "https://{root}",
            ),
        ]
    })
}

#[allow(clippy::expect_used)]
fn vcs_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<root>(?P<repo>([a-z0-9.\-]+\.)+[a-z0-9.\-]+(:[0-9]+)?(/~?[A-Za-z0-9_.\-]+)+?)\.(?P<vcs>bzr|git|hg|svn))(/~?[A-Za-z0-9_.\-]+)*$",
        )
        .expect("static vcs suffix pattern")
    })
}

#[allow(clippy::expect_used)]
fn meta_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("static meta tag pattern"))
}

#[allow(clippy::expect_used)]
fn attr_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)([a-z\-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static attribute pattern")
    })
}

/// Resolve an import path against the static host rules and VCS-suffix form only
///
/// Returns `None` when the path needs network discovery.
pub fn resolve_static(import_path: &str) -> Option<RepoRoot> {
    for rule in static_rules() {
        if !import_path.starts_with(rule.prefix) {
            continue;
        }
        let caps = rule.pattern.captures(import_path)?;
        let root = caps.name("root")?.as_str();
        let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
        return Some(RepoRoot {
            root: root.to_string(),
            vcs: rule.vcs,
            repo: rule.repo.replace("{root}", root).replace("{name}", name),
        });
    }

    let caps = vcs_suffix_pattern().captures(import_path)?;
    let root = caps.name("root")?.as_str();
    let vcs = caps.name("vcs")?.as_str().parse().ok()?;
    Some(RepoRoot {
        root: root.to_string(),
        vcs,
        repo: format!("https://{root}"),
    })
}

/// One `<meta name="go-import" content="prefix vcs repo">` entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaImport {
    /// Import path prefix the entry applies to
    pub prefix: String,
    /// VCS name as written in the tag
    pub vcs: String,
    /// Repository URL
    pub repo: String,
}

/// Extract every go-import entry from an HTML page
pub fn parse_meta_imports(body: &str) -> Vec<MetaImport> {
    let mut imports = Vec::new();
    for tag in meta_tag_pattern().find_iter(body) {
        let mut name = None;
        let mut content = None;
        for attr in attr_pattern().captures_iter(tag.as_str()) {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match attr[1].to_ascii_lowercase().as_str() {
                "name" => name = Some(value),
                "content" => content = Some(value),
                _ => {}
            }
        }
        if name != Some("go-import") {
            continue;
        }
        let Some(content) = content else { continue };
        let fields: Vec<&str> = content.split_whitespace().collect();
        if let [prefix, vcs, repo] = fields.as_slice() {
            imports.push(MetaImport {
                prefix: prefix.to_string(),
                vcs: vcs.to_string(),
                repo: repo.to_string(),
            });
        }
    }
    imports
}

/// Pick the go-import entry whose prefix covers `import_path`
///
/// `mod` entries (module proxies) are ignored. More than one match is an error,
/// as is none.
pub fn match_meta_import(import_path: &str, imports: &[MetaImport]) -> Result<RepoRoot> {
    let mut matched: Option<&MetaImport> = None;
    for meta in imports.iter().filter(|m| m.vcs != "mod") {
        let covers = import_path == meta.prefix
            || import_path
                .strip_prefix(meta.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'));
        if !covers {
            continue;
        }
        if let Some(previous) = matched {
            return Err(VcsError::UnresolvedImportPath {
                import_path: import_path.to_string(),
                reason: format!(
                    "multiple go-import tags match: {} and {}",
                    previous.prefix, meta.prefix
                ),
            }
            .into());
        }
        matched = Some(meta);
    }

    let meta = matched.ok_or_else(|| VcsError::UnresolvedImportPath {
        import_path: import_path.to_string(),
        reason: "no go-import meta tag matches".into(),
    })?;

    Ok(RepoRoot {
        root: meta.prefix.clone(),
        vcs: meta.vcs.parse()?,
        repo: meta.repo.clone(),
    })
}

/// Resolves import paths, going to the network only when static rules do not apply
#[derive(Clone, Debug)]
pub struct Resolver {
    client: reqwest::Client,
    scheme: &'static str,
}

impl Resolver {
    /// Create a resolver that discovers over HTTPS
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .user_agent(concat!("toolstrap/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            scheme: "https",
        })
    }

    /// Discover over plain HTTP (for hosts without TLS, and local test servers)
    pub fn insecure(mut self) -> Self {
        self.scheme = "http";
        self
    }

    /// Resolve `import_path` to its repository root
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires during discovery.
    pub async fn resolve(&self, import_path: &str, cancel: &CancellationToken) -> Result<RepoRoot> {
        if import_path.is_empty() || import_path.contains("..") || import_path.starts_with('/') {
            return Err(Error::InvalidArgument(format!(
                "invalid import path {import_path:?}"
            )));
        }

        if let Some(root) = resolve_static(import_path) {
            tracing::debug!(import_path, root = %root.root, vcs = %root.vcs, "Resolved statically");
            return Ok(root);
        }

        tokio::select! {
            result = self.discover(import_path) => result,
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    async fn discover(&self, import_path: &str) -> Result<RepoRoot> {
        let mut url = Url::parse(&format!("{}://{}", self.scheme, import_path)).map_err(|e| {
            VcsError::UnresolvedImportPath {
                import_path: import_path.to_string(),
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut().append_pair("go-get", "1");

        tracing::debug!(import_path, url = %url, "Discovering repository root");
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(VcsError::UnresolvedImportPath {
                import_path: import_path.to_string(),
                reason: format!("{url} returned {}", response.status()),
            }
            .into());
        }
        let body = response.text().await?;

        let root = match_meta_import(import_path, &parse_meta_imports(&body))?;
        tracing::debug!(import_path, root = %root.root, vcs = %root.vcs, repo = %root.repo, "Discovered repository root");
        Ok(root)
    }
}
