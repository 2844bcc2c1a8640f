// Link rewriting: absolute references to captured resources become relative links

use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, trace, warn};
use url::Url;
use walkdir::WalkDir;

use crate::classify::{UrlClassifier, extension};
use crate::error::MirrorError;

static CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:https?:)?//[a-z0-9](?:[a-z0-9.-]*[a-z0-9])?(?::\d+)?(?:/[^\s"'`<>()\\{}|^]*)?"#)
        .expect("candidate pattern")
});

// root-relative `url()`, `@import` and attribute values; `//host` is a candidate instead
static ROOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:url\(\s*["']?|@import\s+["']|\b(?:href|src|poster|data-src)\s*=\s*["'])(/[^/\s"'()<>\\][^\s"'()<>\\]*)"#,
    )
    .expect("rooted reference pattern")
});

/// Extensions the sweep rewrites in place.
pub const SWEEP_EXTENSIONS: &[&str] = &["html", "htm", "css", "js", "json"];

/// Resource key -> local path of every captured resource.
#[derive(Debug, Clone, Default)]
pub struct LinkMap {
    entries: HashMap<String, String>,
    /// `/cdn/<segment>` -> root URL of the host whose files live there
    hosts: HashMap<String, Url>,
}

impl LinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, local_path: impl Into<String>) {
        self.entries.insert(key.into(), local_path.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Remember which host a `/cdn/` directory belongs to. First one wins.
    pub fn insert_host(&mut self, prefix: impl Into<String>, url: &Url) {
        self.hosts.entry(prefix.into()).or_insert_with(|| {
            let mut base = url.clone();
            base.set_path("/");
            base.set_query(None);
            base.set_fragment(None);
            base
        });
    }

    /// Root URL of the host a mirror file under `/cdn/` was fetched from.
    pub fn host_base(&self, local_path: &str) -> Option<&Url> {
        let segment = local_path.strip_prefix("/cdn/")?.split('/').next()?;
        self.hosts.get(&format!("/cdn/{}", segment))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for LinkMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            hosts: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SweepStats {
    pub files_scanned: usize,
    pub files_rewritten: usize,
    pub files_skipped: usize,
    /// Per-file failures; the sweep carries on past them.
    pub errors: Vec<MirrorError>,
}

/// Rewrites text payloads against a [`LinkMap`].
///
/// A candidate is any `http(s)://host...` or protocol-relative `//host...`
/// span. Captured resources become relative paths. Uncaptured origin URLs
/// lose their scheme and host, except inside `/cdn/` files where the mirror
/// root is not their host. Everything else is left alone.
///
/// Stylesheets and HTML under `/cdn/<segment>/` also get their root-relative
/// references resolved against their own host: captured ones become relative paths,
/// the rest become absolute URLs on that host.
///
/// Output never contains a reference that maps to a captured resource, so
/// rewriting is idempotent. JSON-escaped URLs (`https:\/\/host`) are not
/// recognised.
#[derive(Debug, Clone)]
pub struct Rewriter {
    links: LinkMap,
    classifier: UrlClassifier,
}

impl Rewriter {
    pub fn new(links: LinkMap, classifier: &UrlClassifier) -> Self {
        Self {
            links,
            classifier: classifier.clone(),
        }
    }

    pub fn links(&self) -> &LinkMap {
        &self.links
    }

    /// Rewrite every candidate reference in `content`, which lives at the
    /// `/`-rooted mirror path `from_local`.
    pub fn rewrite(&self, content: &str, from_local: &str) -> String {
        let hosted = from_local.starts_with("/cdn/");
        let base = self
            .links
            .host_base(from_local)
            .filter(|_| resolves_against_file(from_local));
        let content = match base {
            Some(base) => Cow::Owned(self.rewrite_rooted(content, from_local, base)),
            None => Cow::Borrowed(content),
        };

        let mut output = String::with_capacity(content.len());
        let mut last = 0;

        for found in CANDIDATE.find_iter(&content) {
            let span = trim_entity(found.as_str());
            let start = found.start();
            let end = start + span.len();
            if let Some(replacement) = self.replacement(span, from_local, !hosted) {
                output.push_str(&content[last..start]);
                output.push_str(&replacement);
                last = end;
            }
        }

        output.push_str(&content[last..]);
        output
    }

    fn rewrite_rooted(&self, content: &str, from_local: &str, base: &Url) -> String {
        let mut output = String::with_capacity(content.len());
        let mut last = 0;

        for caps in ROOTED.captures_iter(content) {
            let Some(found) = caps.get(1) else {
                continue;
            };
            let Ok(url) = base.join(found.as_str()) else {
                continue;
            };
            let replacement = self
                .link_to(&url, from_local)
                .unwrap_or_else(|| url.to_string());
            trace!("{} -> {}", found.as_str(), replacement);
            output.push_str(&content[last..found.start()]);
            output.push_str(&replacement);
            last = found.end();
        }

        output.push_str(&content[last..]);
        output
    }

    fn replacement(&self, span: &str, from_local: &str, strip_origin: bool) -> Option<String> {
        let absolute = if span.starts_with("//") {
            format!("https:{}", span)
        } else {
            span.to_string()
        };
        let url = Url::parse(&absolute).ok()?;

        if let Some(link) = self.link_to(&url, from_local) {
            trace!("{} -> {}", span, link);
            return Some(link);
        }

        if strip_origin && self.classifier.is_origin(&url) {
            return Some(strip_scheme_and_host(span));
        }

        None
    }

    /// Relative link to the captured copy of `url`, keeping its fragment.
    fn link_to(&self, url: &Url, from_local: &str) -> Option<String> {
        let mut bare = url.clone();
        bare.set_fragment(None);
        let mut link = relative_link(from_local, self.lookup(&bare)?);
        if let Some(fragment) = url.fragment() {
            link.push('#');
            link.push_str(fragment);
        }
        Some(link)
    }

    fn lookup(&self, url: &Url) -> Option<&str> {
        let key = self.classifier.key(url);
        if let Some(local) = self.links.get(&key) {
            return Some(local);
        }
        if key.contains("&amp;") {
            return self.links.get(&key.replace("&amp;", "&"));
        }
        None
    }
}

// script and JSON strings resolve against the including page, not the file
fn resolves_against_file(local_path: &str) -> bool {
    matches!(extension(local_path).as_deref(), Some("css" | "html" | "htm"))
}

/// Cut a candidate at an HTML-escaped quote that closes an attribute.
fn trim_entity(span: &str) -> &str {
    ["&quot;", "&#34;", "&#39;"]
        .iter()
        .filter_map(|entity| span.find(entity))
        .min()
        .map(|index| &span[..index])
        .unwrap_or(span)
}

/// `https://shop.test:8080/a?b#c` -> `/a?b#c`, `//shop.test` -> `/`
fn strip_scheme_and_host(span: &str) -> String {
    let after_slashes = span.find("//").map(|i| i + 2).unwrap_or(0);
    let rest = &span[after_slashes..];
    match rest.find(['/', '?', '#']) {
        Some(index) if rest[index..].starts_with('/') => rest[index..].to_string(),
        Some(index) => format!("/{}", &rest[index..]),
        None => "/".to_string(),
    }
}

/// Relative link from the file at `from_local` to the file at `to_local`,
/// both `/`-rooted mirror paths. Always starts with `./` or `../`.
pub fn relative_link(from_local: &str, to_local: &str) -> String {
    let from = Path::new(from_local.trim_start_matches('/'));
    let from_dir = from.parent().unwrap_or_else(|| Path::new(""));
    let to = Path::new(to_local.trim_start_matches('/'));

    let relative = pathdiff::diff_paths(to, from_dir).unwrap_or_else(|| to.to_path_buf());
    let link = relative.to_string_lossy().replace('\\', "/");
    if link.starts_with("./") || link.starts_with("../") {
        link
    } else {
        format!("./{}", link)
    }
}

/// Rewrite every text file of the mirror tree in place. Files are only
/// written when their content changes.
pub fn sweep_tree(root: &Path, rewriter: &Rewriter) -> SweepStats {
    let mut stats = SweepStats::default();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!("Sweep cannot read {}: {}", path.display(), e);
                stats
                    .errors
                    .push(MirrorError::file_system(path, std::io::Error::other(e.to_string())));
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_sweepable(entry.path()) {
            continue;
        }

        let Some(local_path) = mirror_path(root, entry.path()) else {
            continue;
        };

        stats.files_scanned += 1;
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                debug!("Skipping {} during sweep: {}", entry.path().display(), e);
                stats.files_skipped += 1;
                continue;
            }
        };

        let rewritten = rewriter.rewrite(&content, &local_path);
        if rewritten != content {
            match std::fs::write(entry.path(), rewritten) {
                Ok(()) => stats.files_rewritten += 1,
                Err(e) => {
                    warn!("Sweep cannot write {}: {}", entry.path().display(), e);
                    stats.errors.push(MirrorError::file_system(entry.path(), e));
                }
            }
        }
    }

    stats
}

fn is_sweepable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SWEEP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// On-disk file -> `/`-rooted mirror path, percent-encoded the way URL paths are.
fn mirror_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let mut encoded = Url::parse("http://mirror.invalid/").ok()?;
    encoded.path_segments_mut().ok()?.clear().extend(&parts);
    Some(encoded.path().to_string())
}
