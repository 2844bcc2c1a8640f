// URL classification: mirror membership and the local path layout

use url::Url;

use crate::config::MirrorConfig;

#[derive(Debug, Clone)]
pub struct UrlClassifier {
    origin_host: String,
    /// `www.` spelling of a bare origin host, or the bare spelling of a `www.` one.
    origin_alias: String,
    origin_port: Option<u16>,
    allowed_hosts: Vec<String>,
    content_routes: Vec<String>,
    excluded_segments: Vec<String>,
}

impl UrlClassifier {
    pub fn new(
        origin: &Url,
        mirror_hosts: &[String],
        content_routes: &[String],
        excluded_segments: &[String],
    ) -> Self {
        let origin_host = origin.host_str().unwrap_or_default().to_ascii_lowercase();
        let origin_alias = match origin_host.strip_prefix("www.") {
            Some(bare) => bare.to_string(),
            None => format!("www.{}", origin_host),
        };

        let mut allowed_hosts = vec![origin_host.clone()];
        for host in mirror_hosts {
            let host = host.trim().trim_matches('.').to_ascii_lowercase();
            if !host.is_empty() && !allowed_hosts.contains(&host) {
                allowed_hosts.push(host);
            }
        }

        Self {
            origin_host,
            origin_alias,
            origin_port: origin.port(),
            allowed_hosts,
            content_routes: content_routes
                .iter()
                .map(|r| r.trim_matches('/').to_ascii_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
            excluded_segments: excluded_segments
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::new(
            &config.origin,
            &config.mirror_hosts,
            &config.content_routes,
            &config.excluded_segments,
        )
    }

    pub fn origin_host(&self) -> &str {
        &self.origin_host
    }

    /// Fails closed: anything that does not parse is not mirrorable.
    pub fn is_mirrorable(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| self.is_mirrorable_url(&u))
            .unwrap_or(false)
    }

    pub fn is_mirrorable_url(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.allowed_hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    pub fn is_origin(&self, url: &Url) -> bool {
        url.port() == self.origin_port
            && url
                .host_str()
                .is_some_and(|host| host == self.origin_host || host == self.origin_alias)
    }

    /// The URL with an aliased origin host respelled as the origin host.
    pub fn canonical(&self, url: &Url) -> Url {
        let mut canonical = url.clone();
        if self.is_origin(url)
            && url.host_str() != Some(self.origin_host.as_str())
            && canonical.set_host(Some(&self.origin_host)).is_err()
        {
            return url.clone();
        }
        canonical
    }

    /// Resource key of the canonical spelling of `url`.
    pub fn key(&self, url: &Url) -> String {
        resource_key(&self.canonical(url))
    }

    /// Same-origin navigational link that should become a crawl target.
    pub fn is_page_link(&self, url: &Url) -> bool {
        if !self.is_origin(url) || !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        let path = url.path().to_ascii_lowercase();
        if self.is_excluded(&path) {
            return false;
        }

        if path == "/" || path.is_empty() {
            return true;
        }

        if !self.is_content_route(&path) {
            return false;
        }

        match extension(&path) {
            None => true,
            Some(ext) => ext == "html" || ext == "htm",
        }
    }

    /// Mirrorable link target that is a file rather than a page to crawl:
    /// anything on another host, or an origin path with a non-HTML extension.
    pub fn is_linked_file(&self, url: &Url) -> bool {
        if !self.is_mirrorable_url(url) || self.is_page_link(url) {
            return false;
        }
        if !self.is_origin(url) {
            return true;
        }

        let path = url.path().to_ascii_lowercase();
        if self.is_excluded(&path) {
            return false;
        }
        matches!(extension(&path), Some(ext) if ext != "html" && ext != "htm")
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_segments
            .iter()
            .any(|segment| path.contains(segment.as_str()))
    }

    fn is_content_route(&self, path: &str) -> bool {
        let first = path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        self.content_routes.iter().any(|route| *route == first)
    }

    /// Map a remote URL to its path inside the mirror tree (always `/`-rooted).
    ///
    /// Extensionless paths get an extension from URL shape alone: `.html` for
    /// pages and content routes, `.css`/`.js` when the URL looks like one,
    /// `.html` otherwise. The response content-type is never consulted, so the
    /// mapping is known before the resource is fetched.
    ///
    /// The result keeps the URL's percent-encoding, so it doubles as a link
    /// target. Segments are decoded only when the file is written.
    pub fn local_path(&self, url: &Url, is_asset: bool) -> Option<String> {
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.host_str()?;

        let path = if url.path().is_empty() { "/" } else { url.path() };

        let mut local = match self.host_prefix(url) {
            Some(prefix) => format!("{}{}", prefix, path),
            None => path.to_string(),
        };

        if local.ends_with('/') {
            local.push_str("index.html");
            return Some(local);
        }

        if extension(&local).is_none() {
            let suffix = if !is_asset || (self.is_origin(url) && self.is_content_route(path)) {
                ".html"
            } else if looks_like_stylesheet(url) {
                ".css"
            } else if looks_like_script(url) {
                ".js"
            } else {
                ".html"
            };
            local.push_str(suffix);
        }

        Some(local)
    }

    /// `/cdn/<host_segment>` directory holding files of a non-origin host.
    pub fn host_prefix(&self, url: &Url) -> Option<String> {
        if self.is_origin(url) {
            return None;
        }
        url.host_str()?;
        Some(format!("/cdn/{}", host_segment(url)))
    }
}

/// Scheme-insensitive identity of a remote resource: `host[:port]/path[?query]`.
pub fn resource_key(url: &Url) -> String {
    let mut key = String::from(url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(if url.path().is_empty() { "/" } else { url.path() });
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

/// `cdn.shopify.com` -> `cdn_shopify_com`, `127.0.0.1:8080` -> `127_0_0_1_8080`.
fn host_segment(url: &Url) -> String {
    let mut segment: String = url
        .host_str()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if let Some(port) = url.port() {
        segment.push('_');
        segment.push_str(&port.to_string());
    }
    segment
}

/// Extension of the last path segment, if it has a plausible one.
pub(crate) fn extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next().unwrap_or_default();
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn shape(url: &Url) -> String {
    let mut shape = url.path().to_ascii_lowercase();
    if let Some(query) = url.query() {
        shape.push('?');
        shape.push_str(&query.to_ascii_lowercase());
    }
    shape
}

fn looks_like_stylesheet(url: &Url) -> bool {
    let shape = shape(url);
    // web-font stylesheet endpoints such as /css2?family=...
    let last = url.path().rsplit('/').next().unwrap_or_default();
    shape.contains(".css") || shape.contains("/css/") || last == "css" || last == "css2"
}

fn looks_like_script(url: &Url) -> bool {
    let shape = shape(url);
    shape.contains(".js") || shape.contains("/js/")
}
