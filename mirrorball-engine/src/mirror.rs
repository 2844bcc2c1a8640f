use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::classify::UrlClassifier;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::extract::{MarkupExtractor, PayloadKind, ReferenceExtractor};
use crate::fetcher::{FetchedResource, Fetcher, local_file, persist};
use crate::frontier::{CrawlTarget, Frontier};
use crate::result::{FailureRecord, MirrorSummary, ResourceRole, SavedResource};
use crate::rewrite::{Rewriter, sweep_tree};

/// Run phase reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Assets,
    Pages,
    Sweep,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discovery => "discovery",
            Phase::Assets => "assets",
            Phase::Pages => "pages",
            Phase::Sweep => "sweep",
        };
        f.write_str(name)
    }
}

pub type ProgressCallback = Arc<dyn Fn(Phase, String) + Send + Sync>;

type Fetched = (CrawlTarget, Result<FetchedResource>);

/// One mirror run: owns the configuration and the collaborators, drives the
/// discovery, asset, page and sweep phases in order.
pub struct Mirror {
    config: MirrorConfig,
    classifier: UrlClassifier,
    fetcher: Fetcher,
    extractor: Arc<dyn ReferenceExtractor>,
    progress_callback: Option<ProgressCallback>,
    cancel: Arc<AtomicBool>,
}

impl Mirror {
    pub fn new(config: MirrorConfig) -> Result<Self> {
        config.validate()?;
        let classifier = UrlClassifier::from_config(&config);
        let fetcher = Fetcher::new(&config)?;
        let extractor: Arc<dyn ReferenceExtractor> =
            Arc::new(MarkupExtractor::new(classifier.clone()));

        Ok(Self {
            config,
            classifier,
            fetcher,
            extractor,
            progress_callback: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ReferenceExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Share an externally owned cancellation flag (set it to stop the run).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn report(&self, phase: Phase, message: String) {
        if let Some(ref callback) = self.progress_callback {
            callback(phase, message);
        }
    }

    pub async fn run(&self) -> Result<MirrorSummary> {
        let started = Instant::now();
        let root = self.config.output_dir.clone();
        let mut summary = MirrorSummary::new(self.config.origin.to_string(), root.clone());

        prepare_output_root(&root).await?;
        info!(
            "Mirroring {} into {} with {} workers",
            self.config.origin,
            root.display(),
            self.config.workers
        );

        let frontier = Frontier::new(
            self.classifier.clone(),
            self.config.max_pages,
            self.config.max_queue,
            self.config.max_depth,
        );
        for seed in &self.config.seeds {
            frontier.seed(seed);
        }

        let pages = self.discover(&frontier, &mut summary).await;

        if !self.is_cancelled() {
            self.resolve_assets(&frontier, &mut summary).await;
        }

        if !self.is_cancelled() {
            self.save_pages(&frontier, &pages, &mut summary).await;
        }

        if !self.is_cancelled() {
            self.sweep(&frontier, &mut summary).await?;
        }

        summary.assets_pending = frontier.counts().unfetched_assets;
        summary.truncated = frontier.truncated();
        summary.collisions_resolved = frontier.collisions();
        summary.cancelled = self.is_cancelled();
        summary.elapsed = started.elapsed();

        info!(
            "Mirror complete: {} pages, {} assets, {} failures in {:.2}s",
            summary.pages_saved,
            summary.assets_saved,
            summary.failures.len(),
            summary.elapsed.as_secs_f64()
        );
        if summary.cancelled {
            warn!("Mirror run was cancelled, output is partial");
        }

        Ok(summary)
    }

    async fn fetch_all(&self, phase: Phase, targets: Vec<CrawlTarget>) -> Vec<Fetched> {
        let fetcher = &self.fetcher;
        stream::iter(targets)
            .map(|target| {
                self.report(phase, target.url.to_string());
                async move {
                    let result = fetcher.fetch(&target.url, &target.local_path).await;
                    (target, result)
                }
            })
            .buffered(self.config.workers)
            .collect()
            .await
    }

    /// Breadth-first page discovery. Returns the HTML pages that were
    /// persisted raw, in dispatch order.
    async fn discover(&self, frontier: &Frontier, summary: &mut MirrorSummary) -> Vec<CrawlTarget> {
        info!("Starting page discovery");
        let mut pages = Vec::new();

        while frontier.has_queued_pages() {
            if self.is_cancelled() {
                break;
            }
            let batch = frontier.next_batch(self.config.workers);
            debug!("Dispatching {} pages", batch.len());

            for (target, result) in self.fetch_all(Phase::Discovery, batch).await {
                match result {
                    Ok(resource) if resource.is_html(&target.local_path) => {
                        if self.absorb_page(frontier, &target, &resource, summary).await {
                            pages.push(target);
                        }
                    }
                    Ok(resource) => {
                        debug!("{} is not HTML, keeping it as an asset", target.url);
                        frontier.reclassify_as_asset(&target.key);
                        let target = CrawlTarget {
                            role: ResourceRole::Asset,
                            ..target
                        };
                        self.absorb_asset(frontier, &target, &resource, summary).await;
                    }
                    Err(e) => record_failure(frontier, summary, &target, &e),
                }
            }
        }

        info!(
            "Discovery finished: {} pages, {} assets known",
            pages.len(),
            frontier.counts().assets
        );
        pages
    }

    async fn absorb_page(
        &self,
        frontier: &Frontier,
        target: &CrawlTarget,
        resource: &FetchedResource,
        summary: &mut MirrorSummary,
    ) -> bool {
        let html = resource.body.as_text().unwrap_or_default();
        let extraction = self
            .extractor
            .extract(html, &resource.final_url, PayloadKind::Html);
        summary.parse_skips += extraction.skipped;

        for reference in &extraction.references {
            // links to files (PDFs, images, anything on a CDN host) are captured, not crawled
            if reference.context.is_navigational()
                && !self.classifier.is_linked_file(&reference.url)
            {
                frontier.enqueue_page(&reference.url, target.depth + 1);
            } else {
                frontier.record_asset(&reference.url, target.depth + 1);
            }
        }

        match persist(&self.config.output_dir, &target.local_path, resource.body.as_bytes()).await {
            Ok(_) => {
                debug!("Captured page {} -> {}", target.url, target.local_path);
                frontier.mark_saved(&target.key);
                summary.pages_saved += 1;
                summary.saved.push(saved_record(target, resource));
                true
            }
            Err(e) => {
                record_failure(frontier, summary, target, &e);
                false
            }
        }
    }

    async fn absorb_asset(
        &self,
        frontier: &Frontier,
        target: &CrawlTarget,
        resource: &FetchedResource,
        summary: &mut MirrorSummary,
    ) {
        if let Some(text) = resource.body.as_text()
            && let Some(kind @ (PayloadKind::Css | PayloadKind::Js)) =
                PayloadKind::detect(resource.content_type.as_deref(), &target.local_path)
        {
            let extraction = self.extractor.extract(text, &resource.final_url, kind);
            summary.parse_skips += extraction.skipped;
            for reference in &extraction.references {
                if frontier.record_asset(&reference.url, target.depth + 1).is_some() {
                    debug!("{} references new asset {}", target.url, reference.url);
                }
            }
        }

        match persist(&self.config.output_dir, &target.local_path, resource.body.as_bytes()).await {
            Ok(_) => {
                debug!("Captured asset {} -> {}", target.url, target.local_path);
                frontier.mark_saved(&target.key);
                summary.assets_saved += 1;
                summary.saved.push(saved_record(target, resource));
            }
            Err(e) => record_failure(frontier, summary, target, &e),
        }
    }

    /// Download every known asset, scanning stylesheets and scripts for more,
    /// until a pass finds nothing new or the pass limit is hit.
    async fn resolve_assets(&self, frontier: &Frontier, summary: &mut MirrorSummary) {
        let batch_size = self.config.workers * 4;

        for pass in 1..=self.config.max_asset_passes {
            let pending = frontier.pending_assets();
            if pending.is_empty() {
                break;
            }
            summary.asset_passes = pass;
            info!("Asset pass {}: {} assets", pass, pending.len());

            for chunk in pending.chunks(batch_size) {
                if self.is_cancelled() {
                    return;
                }
                for (target, result) in self.fetch_all(Phase::Assets, chunk.to_vec()).await {
                    match result {
                        Ok(resource) => self.absorb_asset(frontier, &target, &resource, summary).await,
                        Err(e) => record_failure(frontier, summary, &target, &e),
                    }
                }
            }
        }

        let remaining = frontier.counts().unfetched_assets;
        if remaining > 0 {
            warn!(
                "Asset pass limit ({}) reached with {} assets still unfetched",
                self.config.max_asset_passes, remaining
            );
        }
    }

    /// Inline-rewrite every captured page against the asset map as it stands
    /// now.
    async fn save_pages(&self, frontier: &Frontier, pages: &[CrawlTarget], summary: &mut MirrorSummary) {
        let rewriter = Rewriter::new(frontier.link_map(), &self.classifier);
        info!("Saving {} pages with {} known links", pages.len(), rewriter.links().len());

        for target in pages {
            if self.is_cancelled() {
                return;
            }
            self.report(Phase::Pages, target.local_path.clone());

            let path = local_file(&self.config.output_dir, &target.local_path);
            let outcome = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => {
                    let rewritten = rewriter.rewrite(&raw, &target.local_path);
                    if rewritten == raw {
                        Ok(false)
                    } else {
                        tokio::fs::write(&path, rewritten).await.map(|_| true)
                    }
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(true) => summary.files_rewritten += 1,
                Ok(false) => {}
                Err(e) => {
                    let error = MirrorError::file_system(path, e);
                    record_failure(frontier, summary, target, &error);
                    summary.pages_saved = summary.pages_saved.saturating_sub(1);
                    let url = target.url.to_string();
                    summary.saved.retain(|saved| saved.url != url);
                }
            }
        }
    }

    async fn sweep(&self, frontier: &Frontier, summary: &mut MirrorSummary) -> Result<()> {
        let rewriter = Rewriter::new(frontier.link_map(), &self.classifier);
        let root = self.config.output_dir.clone();
        self.report(Phase::Sweep, root.display().to_string());
        info!("Sweeping {}", root.display());

        let stats = tokio::task::spawn_blocking(move || sweep_tree(&root, &rewriter)).await?;

        info!(
            "Sweep rewrote {} of {} files",
            stats.files_rewritten, stats.files_scanned
        );
        summary.files_rewritten += stats.files_rewritten;
        for error in stats.errors {
            let path = match &error {
                MirrorError::FileSystemError { path, .. } => path.display().to_string(),
                _ => String::new(),
            };
            summary.failures.push(FailureRecord {
                url: path,
                role: ResourceRole::Asset,
                kind: error.kind(),
                message: error.to_string(),
            });
        }
        Ok(())
    }
}

async fn prepare_output_root(root: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(root).await {
        Ok(()) => debug!("Cleared {}", root.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(MirrorError::OutputRootError {
                path: root.to_path_buf(),
                source,
            });
        }
    }
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|source| MirrorError::OutputRootError {
            path: root.to_path_buf(),
            source,
        })
}

fn record_failure(
    frontier: &Frontier,
    summary: &mut MirrorSummary,
    target: &CrawlTarget,
    error: &MirrorError,
) {
    warn!("Failed to capture {}: {}", target.url, error);
    frontier.mark_failed(&target.key);
    summary.failures.push(FailureRecord {
        url: target.url.to_string(),
        role: target.role,
        kind: error.kind(),
        message: error.to_string(),
    });
}

fn saved_record(target: &CrawlTarget, resource: &FetchedResource) -> SavedResource {
    SavedResource {
        url: target.url.to_string(),
        local_path: target.local_path.clone(),
        role: target.role,
        status_code: resource.status_code,
        content_type: resource.content_type.clone(),
        content_kind: resource.body.kind(),
        bytes: resource.body.len() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::resource_key;
    use crate::result::FailureKind;
    use crate::rewrite::LinkMap;
    use std::time::Duration;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    async fn mount_html(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_bytes(body),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_asset(server: &MockServer, route: &str, content_type: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", content_type)
                    .set_body_bytes(body),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    fn config(server: &MockServer, out: &Path) -> MirrorConfig {
        MirrorConfig::new(Url::parse(&server.uri()).unwrap(), out)
            .with_request_delay(Duration::ZERO)
            .with_workers(2)
    }

    fn read(out: &Path, local: &str) -> String {
        std::fs::read_to_string(out.join(local)).unwrap()
    }

    #[tokio::test]
    async fn test_link_cycle_terminates() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        let origin = server.uri();

        mount_html(&server, "/", r#"<a href="/pages/a">a</a>"#.to_string()).await;
        mount_html(&server, "/pages/a", r#"<a href="/pages/b">b</a>"#.to_string()).await;
        mount_html(
            &server,
            "/pages/b",
            format!(r#"<a href="{}/pages/a">a</a><a href="{}/">home</a>"#, origin, origin),
        )
        .await;

        let summary = Mirror::new(config(&server, &out).with_max_pages(10))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(summary.pages_saved, 3);
        assert!(!summary.truncated);
        assert!(summary.failures.is_empty());
        // root-relative links are left for the serving layer
        assert_eq!(read(&out, "pages/a.html"), r#"<a href="/pages/b">b</a>"#);
        assert_eq!(
            read(&out, "pages/b.html"),
            r#"<a href="./a.html">a</a><a href="../index.html">home</a>"#
        );
    }

    #[tokio::test]
    async fn test_page_cap_truncates_gracefully() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        let links: String = (1..=5)
            .map(|i| format!(r#"<a href="/pages/p{}">p</a>"#, i))
            .collect();
        mount_html(&server, "/", links).await;
        for i in 1..=2 {
            mount_html(&server, &format!("/pages/p{}", i), "<p>leaf</p>".to_string()).await;
        }

        let summary = Mirror::new(config(&server, &out).with_max_pages(3))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(summary.pages_saved, 3);
        assert!(summary.truncated);
        assert!(!out.join("pages/p3.html").exists());
    }

    #[tokio::test]
    async fn test_asset_found_only_through_second_page_import_chain() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");
        let origin = server.uri();

        // the root page mentions deep.css only inside embedded JSON
        mount_html(
            &server,
            "/",
            format!(
                r#"<script type="application/json">{{"font":"{}/assets/deep.css"}}</script><a href="/pages/second">next</a>"#,
                origin
            ),
        )
        .await;
        mount_html(
            &server,
            "/pages/second",
            r#"<link rel="stylesheet" href="/assets/second.css">"#.to_string(),
        )
        .await;
        mount_asset(&server, "/assets/second.css", "text/css", b"@import \"deep.css\";".to_vec()).await;
        mount_asset(
            &server,
            "/assets/deep.css",
            "text/css",
            format!("body {{ background: url({}/assets/deep.png) }}", origin).into_bytes(),
        )
        .await;
        mount_asset(&server, "/assets/deep.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]).await;

        let summary = Mirror::new(config(&server, &out)).unwrap().run().await.unwrap();

        assert_eq!(summary.assets_saved, 3);
        assert_eq!(summary.asset_passes, 3);
        assert_eq!(summary.assets_pending, 0);
        assert!(out.join("assets/deep.png").exists());
        assert_eq!(
            read(&out, "index.html"),
            r#"<script type="application/json">{"font":"./assets/deep.css"}</script><a href="/pages/second">next</a>"#
        );
        assert_eq!(read(&out, "assets/deep.css"), "body { background: url(./deep.png) }");
    }

    #[tokio::test]
    async fn test_asset_pass_limit_leaves_pending_assets() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        mount_html(&server, "/", r#"<link rel="stylesheet" href="/a.css">"#.to_string()).await;
        mount_asset(&server, "/a.css", "text/css", b"@import 'b.css';".to_vec()).await;

        let summary = Mirror::new(config(&server, &out).with_max_asset_passes(1))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(summary.asset_passes, 1);
        assert_eq!(summary.assets_saved, 1);
        assert_eq!(summary.assets_pending, 1);
    }

    #[tokio::test]
    async fn test_binary_asset_is_byte_exact() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");
        let png: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff, 0xc3, 0x28];

        mount_html(&server, "/", r#"<img src="/files/logo.png">"#.to_string()).await;
        mount_asset(&server, "/files/logo.png", "image/png", png.clone()).await;

        let summary = Mirror::new(config(&server, &out)).unwrap().run().await.unwrap();

        assert_eq!(std::fs::read(out.join("files/logo.png")).unwrap(), png);
        let saved = summary
            .saved
            .iter()
            .find(|s| s.local_path == "/files/logo.png")
            .unwrap();
        assert_eq!(saved.content_kind, crate::fetcher::ContentKind::Binary);
        assert_eq!(saved.bytes, png.len() as u64);
    }

    #[tokio::test]
    async fn test_root_is_index_and_references_to_it_are_relative() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");
        let origin = server.uri();

        mount_html(&server, "/", r#"<a href="/pages/about">About</a>"#.to_string()).await;
        mount_html(
            &server,
            "/pages/about",
            format!(r#"<a href="{}/">Home</a><a href="{}/pages/about#team">Team</a>"#, origin, origin),
        )
        .await;

        Mirror::new(config(&server, &out)).unwrap().run().await.unwrap();

        assert!(out.join("index.html").exists());
        assert_eq!(
            read(&out, "pages/about.html"),
            r#"<a href="../index.html">Home</a><a href="./about.html#team">Team</a>"#
        );
    }

    #[tokio::test]
    async fn test_same_named_assets_on_two_hosts_do_not_collide() {
        let origin_server = MockServer::start().await;
        let cdn_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        mount_html(
            &origin_server,
            "/",
            format!(
                r#"<link rel="stylesheet" href="/theme.css"><link rel="stylesheet" href="{}/theme.css">"#,
                cdn_server.uri()
            ),
        )
        .await;
        mount_asset(&origin_server, "/theme.css", "text/css", b"/* origin */".to_vec()).await;
        mount_asset(&cdn_server, "/theme.css", "text/css", b"/* cdn */".to_vec()).await;

        let summary = Mirror::new(config(&origin_server, &out)).unwrap().run().await.unwrap();

        let cdn_port = Url::parse(&cdn_server.uri()).unwrap().port().unwrap();
        let cdn_local = format!("cdn/127_0_0_1_{}/theme.css", cdn_port);

        assert_eq!(summary.assets_saved, 2);
        assert_eq!(read(&out, "theme.css"), "/* origin */");
        assert_eq!(read(&out, &cdn_local), "/* cdn */");
        assert_eq!(
            read(&out, "index.html"),
            format!(
                r#"<link rel="stylesheet" href="/theme.css"><link rel="stylesheet" href="./{}">"#,
                cdn_local
            )
        );
    }

    #[tokio::test]
    async fn test_linked_files_are_captured_as_assets() {
        let origin_server = MockServer::start().await;
        let cdn_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        mount_html(
            &origin_server,
            "/",
            format!(
                r#"<a href="/files/guide.pdf">Guide</a><a href="{}/files/manual.pdf">Manual</a>"#,
                cdn_server.uri()
            ),
        )
        .await;
        mount_asset(&origin_server, "/files/guide.pdf", "application/pdf", b"%PDF-1.4 guide".to_vec())
            .await;
        mount_asset(&cdn_server, "/files/manual.pdf", "application/pdf", b"%PDF-1.4 manual".to_vec())
            .await;

        let summary = Mirror::new(config(&origin_server, &out)).unwrap().run().await.unwrap();

        let cdn_port = Url::parse(&cdn_server.uri()).unwrap().port().unwrap();
        let cdn_local = format!("cdn/127_0_0_1_{}/files/manual.pdf", cdn_port);

        assert_eq!(summary.pages_saved, 1);
        assert_eq!(summary.assets_saved, 2);
        assert_eq!(std::fs::read(out.join("files/guide.pdf")).unwrap(), b"%PDF-1.4 guide");
        assert_eq!(std::fs::read(out.join(&cdn_local)).unwrap(), b"%PDF-1.4 manual");
        let index = read(&out, "index.html");
        assert!(!index.contains(&cdn_server.uri()));
        assert!(index.contains(&format!(r#"href="./{}""#, cdn_local)));
    }

    #[tokio::test]
    async fn test_cdn_stylesheet_root_relative_urls_point_into_its_host_directory() {
        let origin_server = MockServer::start().await;
        let cdn_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        mount_html(
            &origin_server,
            "/",
            format!(r#"<link rel="stylesheet" href="{}/s/theme.css">"#, cdn_server.uri()),
        )
        .await;
        mount_asset(
            &cdn_server,
            "/s/theme.css",
            "text/css",
            b"body{background:url(/s/files/bg.png)}".to_vec(),
        )
        .await;
        mount_asset(&cdn_server, "/s/files/bg.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]).await;

        let summary = Mirror::new(config(&origin_server, &out)).unwrap().run().await.unwrap();

        let cdn_dir = format!(
            "cdn/127_0_0_1_{}",
            Url::parse(&cdn_server.uri()).unwrap().port().unwrap()
        );
        assert_eq!(summary.assets_saved, 2);
        assert!(out.join(format!("{}/s/files/bg.png", cdn_dir)).exists());
        assert_eq!(
            read(&out, &format!("{}/s/theme.css", cdn_dir)),
            "body{background:url(./files/bg.png)}"
        );
    }

    #[tokio::test]
    async fn test_page_without_content_type_is_still_crawled() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        mount_html(&server, "/", r#"<a href="/pages/plain">plain</a>"#.to_string()).await;
        Mock::given(method("GET"))
            .and(path("/pages/plain"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(r#"<a href="/pages/deeper">deeper</a>"#.as_bytes()),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_html(&server, "/pages/deeper", "<p>end</p>".to_string()).await;

        let summary = Mirror::new(config(&server, &out)).unwrap().run().await.unwrap();

        assert_eq!(summary.pages_saved, 3);
        let plain = summary.saved.iter().find(|s| s.local_path == "/pages/plain.html").unwrap();
        assert_eq!(plain.role, ResourceRole::Page);
        assert!(out.join("pages/deeper.html").exists());
    }

    #[tokio::test]
    async fn test_encoded_file_names_are_decoded_on_disk() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        mount_html(
            &server,
            "/",
            format!(r#"<img src="{}/files/size%20chart.png">"#, server.uri()),
        )
        .await;
        mount_asset(&server, "/files/size%20chart.png", "image/png", vec![1, 2, 3]).await;

        let summary = Mirror::new(config(&server, &out)).unwrap().run().await.unwrap();

        assert_eq!(summary.assets_saved, 1);
        assert_eq!(std::fs::read(out.join("files").join("size chart.png")).unwrap(), vec![1, 2, 3]);
        assert!(!out.join("files").join("size%20chart.png").exists());
        assert_eq!(read(&out, "index.html"), r#"<img src="./files/size%20chart.png">"#);
    }

    #[tokio::test]
    async fn test_failed_asset_is_counted_and_left_absolute() {
        let origin_server = MockServer::start().await;
        let cdn_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");
        let missing = format!("{}/gone.js", cdn_server.uri());

        mount_html(&origin_server, "/", format!(r#"<script src="{}"></script>"#, missing)).await;
        Mock::given(method("GET"))
            .and(path("/gone.js"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&cdn_server)
            .await;

        let summary = Mirror::new(config(&origin_server, &out)).unwrap().run().await.unwrap();

        assert_eq!(summary.failure_count(FailureKind::Network), 1);
        assert_eq!(summary.failures[0].url, missing);
        assert_eq!(summary.failures[0].role, ResourceRole::Asset);
        assert!(read(&out, "index.html").contains(&missing));
    }

    #[tokio::test]
    async fn test_non_html_page_is_kept_as_asset() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        mount_html(&server, "/", r#"<a href="/pages/feed">feed</a>"#.to_string()).await;
        mount_asset(&server, "/pages/feed", "application/json", b"{\"items\":[]}".to_vec()).await;

        let summary = Mirror::new(config(&server, &out)).unwrap().run().await.unwrap();

        assert_eq!(summary.pages_saved, 1);
        assert_eq!(summary.assets_saved, 1);
        let feed = summary.saved.iter().find(|s| s.local_path == "/pages/feed.html").unwrap();
        assert_eq!(feed.role, ResourceRole::Asset);
    }

    #[tokio::test]
    async fn test_sweep_reaches_fixed_point() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");
        let origin = server.uri();

        mount_html(
            &server,
            "/",
            format!(r#"<link rel="stylesheet" href="{}/s/app.css"><a href="/collections/all">all</a>"#, origin),
        )
        .await;
        mount_html(&server, "/collections/all", format!(r#"<a href="{}/">home</a>"#, origin)).await;
        mount_asset(
            &server,
            "/s/app.css",
            "text/css",
            format!(".x {{ background: url({}/s/x.svg) }}", origin).into_bytes(),
        )
        .await;
        mount_asset(&server, "/s/x.svg", "image/svg+xml", b"<svg/>".to_vec()).await;

        let summary = Mirror::new(config(&server, &out)).unwrap().run().await.unwrap();

        let links: LinkMap = summary
            .saved
            .iter()
            .map(|s| (resource_key(&Url::parse(&s.url).unwrap()), s.local_path.clone()))
            .collect();
        let origin_url = Url::parse(&origin).unwrap();
        let classifier = UrlClassifier::new(&origin_url, &[], &[], &[]);
        let rewriter = Rewriter::new(links, &classifier);

        let before = read(&out, "index.html");
        let stats = sweep_tree(&out, &rewriter);
        assert_eq!(stats.files_rewritten, 0);
        assert_eq!(read(&out, "index.html"), before);
        assert!(!before.contains(&origin));
    }

    #[tokio::test]
    async fn test_output_root_is_cleared() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("stale.html"), "old").unwrap();

        mount_html(&server, "/", "<p>fresh</p>".to_string()).await;

        Mirror::new(config(&server, &out)).unwrap().run().await.unwrap();

        assert!(!out.join("stale.html").exists());
        assert_eq!(read(&out, "index.html"), "<p>fresh</p>");
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_fetching() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        let mirror = Mirror::new(config(&server, &out)).unwrap();
        mirror.cancel_handle().store(true, Ordering::SeqCst);
        let summary = mirror.run().await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.total_files(), 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_callback_sees_phases() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mirror");

        mount_html(&server, "/", r#"<img src="/a.png">"#.to_string()).await;
        mount_asset(&server, "/a.png", "image/png", vec![1, 2, 3]).await;

        let phases = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = phases.clone();
        Mirror::new(config(&server, &out))
            .unwrap()
            .with_progress_callback(Arc::new(move |phase, _message| {
                seen.lock().unwrap().push(phase);
            }))
            .run()
            .await
            .unwrap();

        let phases = phases.lock().unwrap();
        assert_eq!(phases.first(), Some(&Phase::Discovery));
        assert!(phases.contains(&Phase::Assets));
        assert!(phases.contains(&Phase::Pages));
        assert_eq!(phases.last(), Some(&Phase::Sweep));
    }
}
