use percent_encoding::percent_decode_str;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::classify::extension;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::extract::PayloadKind;

const BINARY_EXTENSIONS: &[&str] = &[
    "woff", "woff2", "ttf", "otf", "eot", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "pdf",
];

/// How a response body is read and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Binary,
}

impl ContentKind {
    /// Decided before the body is read, from the declared type and the local path.
    pub fn detect(content_type: Option<&str>, local_path: &str) -> Self {
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        if content_type.starts_with("image/")
            || content_type.starts_with("font/")
            || content_type.starts_with("application/octet-stream")
        {
            return ContentKind::Binary;
        }

        match extension(local_path) {
            Some(ext) if BINARY_EXTENSIONS.contains(&ext.as_str()) => ContentKind::Binary,
            _ => ContentKind::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    Text(String),
    Binary(Vec<u8>),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Binary(_) => None,
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            Body::Text(_) => ContentKind::Text,
            Body::Binary(_) => ContentKind::Binary,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub url: Url,
    /// Where the request ended up after redirects.
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: Body,
}

impl FetchedResource {
    /// Declared `text/html`, or undeclared and stored under an HTML path.
    pub fn is_html(&self, local_path: &str) -> bool {
        match self.content_type.as_deref() {
            Some(ct) if !ct.trim().is_empty() => ct.to_ascii_lowercase().contains("text/html"),
            _ => PayloadKind::detect(None, local_path) == Some(PayloadKind::Html),
        }
    }
}

/// Spaces request starts across every worker sharing it.
#[derive(Debug)]
struct Pacer {
    delay: Duration,
    next_start: Mutex<Instant>,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_start: Mutex::new(Instant::now()),
        }
    }

    async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        let start = {
            let mut next_start = self.next_start.lock().await;
            let start = (*next_start).max(Instant::now());
            *next_start = start + self.delay;
            start
        };
        tokio::time::sleep_until(start).await;
    }
}

/// HTTP GET with politeness pacing, bounded retries and binary-safe bodies.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    retries: u32,
    pacer: Arc<Pacer>,
}

impl Fetcher {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .connect_timeout(config.timeout / 2)
            .pool_max_idle_per_host(config.workers.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            retries: config.retries,
            pacer: Arc::new(Pacer::new(config.request_delay)),
        })
    }

    /// Fetch `url`, reading the body as bytes or decoded text depending on
    /// what `local_path` and the response declare.
    pub async fn fetch(&self, url: &Url, local_path: &str) -> Result<FetchedResource> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, local_path).await {
                Ok(resource) => return Ok(resource),
                Err(e) if attempt < self.retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!("Retrying {} ({}/{}): {}", url, attempt, self.retries, e);
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url, local_path: &str) -> Result<FetchedResource> {
        self.pacer.wait().await;
        debug!("Fetching {}", url);

        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::StatusError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = match ContentKind::detect(content_type.as_deref(), local_path) {
            ContentKind::Binary => Body::Binary(response.bytes().await?.to_vec()),
            ContentKind::Text => Body::Text(response.text().await?),
        };

        Ok(FetchedResource {
            url: url.clone(),
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
        })
    }
}

fn is_retryable(error: &MirrorError) -> bool {
    match error {
        MirrorError::HttpError(_) => true,
        MirrorError::StatusError { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Absolute filesystem location of a `/`-rooted mirror path. Segments are
/// percent-decoded, so `/a%20b.png` is stored as `a b.png`.
pub fn local_file(root: &Path, local_path: &str) -> PathBuf {
    let mut file = root.to_path_buf();
    for segment in local_path.split('/').filter(|s| !s.is_empty()) {
        file.push(decode_segment(segment).as_ref());
    }
    file
}

// a segment that decodes to a separator or a dot segment stays encoded
fn decode_segment(segment: &str) -> Cow<'_, str> {
    match percent_decode_str(segment).decode_utf8() {
        Ok(decoded)
            if !decoded.contains(['/', '\\', '\0']) && decoded != "." && decoded != ".." =>
        {
            decoded
        }
        _ => Cow::Borrowed(segment),
    }
}

/// Write a body into the mirror tree, creating parent directories.
pub async fn persist(root: &Path, local_path: &str, bytes: &[u8]) -> Result<PathBuf> {
    let target = local_file(root, local_path);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MirrorError::file_system(parent, e))?;
    }
    tokio::fs::write(&target, bytes)
        .await
        .map_err(|e| MirrorError::file_system(&target, e))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn fetcher(server: &MockServer, retries: u32) -> Fetcher {
        let config = MirrorConfig::new(Url::parse(&server.uri()).unwrap(), "/tmp/unused")
            .with_request_delay(Duration::ZERO)
            .with_retries(retries);
        Fetcher::new(&config).unwrap()
    }

    #[test]
    fn test_content_kind_detection() {
        assert_eq!(ContentKind::detect(Some("image/png"), "/x"), ContentKind::Binary);
        assert_eq!(ContentKind::detect(Some("font/woff2"), "/x"), ContentKind::Binary);
        assert_eq!(
            ContentKind::detect(Some("text/plain"), "/cdn/h/f.woff2"),
            ContentKind::Binary
        );
        assert_eq!(ContentKind::detect(None, "/logo.SVG"), ContentKind::Binary);
        assert_eq!(
            ContentKind::detect(Some("text/css; charset=utf-8"), "/a.css"),
            ContentKind::Text
        );
        assert_eq!(ContentKind::detect(None, "/index.html"), ContentKind::Text);
    }

    #[tokio::test]
    async fn test_binary_body_is_byte_exact() {
        let server = MockServer::start().await;
        let bytes: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x00, 0xff, 0xfe, 0x80, 0x0d, 0x0a];

        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(bytes.clone()),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/logo.png", server.uri())).unwrap();
        let fetched = fetcher(&server, 0).fetch(&url, "/logo.png").await.unwrap();

        assert_eq!(fetched.body.kind(), ContentKind::Binary);
        assert_eq!(fetched.body.as_bytes(), bytes.as_slice());
    }

    #[tokio::test]
    async fn test_text_body_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/about"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_bytes("<p>caf\u{e9}</p>".as_bytes()),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/pages/about", server.uri())).unwrap();
        let fetched = fetcher(&server, 0)
            .fetch(&url, "/pages/about.html")
            .await
            .unwrap();

        assert!(fetched.is_html("/pages/about.html"));
        assert_eq!(fetched.body.as_text(), Some("<p>caf\u{e9}</p>"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.css"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing.css", server.uri())).unwrap();
        let err = fetcher(&server, 2)
            .fetch(&url, "/missing.css")
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::StatusError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.js"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/javascript")
                    .set_body_bytes("console.log(1)"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/flaky.js", server.uri())).unwrap();
        let fetched = fetcher(&server, 1).fetch(&url, "/flaky.js").await.unwrap();
        assert_eq!(fetched.body.as_text(), Some("console.log(1)"));
    }

    #[tokio::test]
    async fn test_persist_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let written = persist(dir.path(), "/cdn/cdn_shopify_com/s/a.css", b"body{}")
            .await
            .unwrap();

        assert_eq!(written, dir.path().join("cdn/cdn_shopify_com/s/a.css"));
        assert_eq!(std::fs::read(&written).unwrap(), b"body{}");
    }

    #[tokio::test]
    async fn test_undeclared_type_falls_back_to_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes("<p>hi</p>".as_bytes()))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/pages/plain", server.uri())).unwrap();
        let fetched = fetcher(&server, 0)
            .fetch(&url, "/pages/plain.html")
            .await
            .unwrap();

        assert!(fetched.content_type.is_none());
        assert!(fetched.is_html("/pages/plain.html"));
        assert!(!fetched.is_html("/pages/plain.json"));
    }

    #[test]
    fn test_local_file_decodes_segments() {
        let root = Path::new("/tmp/mirror");
        assert_eq!(
            local_file(root, "/files/size%20chart.png"),
            root.join("files").join("size chart.png")
        );
        assert_eq!(local_file(root, "/index.html"), root.join("index.html"));
        // encoded separators and dot segments are not decoded
        assert_eq!(local_file(root, "/a%2Fb.png"), root.join("a%2Fb.png"));
        assert_eq!(local_file(root, "/%2E%2E/x.css"), root.join("%2E%2E").join("x.css"));
    }
}
