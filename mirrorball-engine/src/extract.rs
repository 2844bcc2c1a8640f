// Reference extraction: HTML5 parsing for markup, regex scans for CSS and JS literals

use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::trace;
use url::Url;

use crate::classify::UrlClassifier;

static CSS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)@import\s+(?:url\(\s*)?(?:"([^"]*)"|'([^']*)'|([^'"()\s;]+))"#)
        .expect("css import pattern")
});

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^'")\s]*))\s*\)"#).expect("css url pattern")
});

static JS_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:fetch|import)\s*\(\s*["'`]([^"'`\s]+)["'`]"#).expect("js call pattern")
});

static JS_IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s+(?:[\w*{}\s,$]+?\s+from\s+)?["']([^"'\s]+)["']"#)
        .expect("js import pattern")
});

static JS_XHR_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.open\(\s*["'][A-Za-z]+["']\s*,\s*["'`]([^"'`\s]+)["'`]"#)
        .expect("js xhr pattern")
});

static JS_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.(?:src|href)\s*=\s*["'`]([^"'`\s]+)["'`]"#).expect("js assignment pattern")
});

static JS_ABSOLUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'`]((?:https?:)?//[^"'`\s<>\\]+)["'`]"#).expect("js literal pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Html,
    Css,
    Js,
}

impl PayloadKind {
    /// Decide how a text payload should be scanned, if at all.
    pub fn detect(content_type: Option<&str>, local_path: &str) -> Option<Self> {
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        let path = local_path.to_ascii_lowercase();

        if content_type.contains("text/html") || path.ends_with(".html") || path.ends_with(".htm")
        {
            Some(PayloadKind::Html)
        } else if content_type.contains("text/css") || path.ends_with(".css") {
            Some(PayloadKind::Css)
        } else if content_type.contains("javascript")
            || path.ends_with(".js")
            || path.ends_with(".mjs")
        {
            Some(PayloadKind::Js)
        } else {
            None
        }
    }
}

/// Where in the payload a reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceContext {
    /// `<a href>`, `<area href>`, `data-href`, non-resource `<link href>`
    Link,
    /// `<link rel="stylesheet" href>`
    Stylesheet,
    /// `src`, `data-src`, `poster`, resource `<link href>`
    Source,
    SrcSet,
    InlineStyle,
    StyleBlock,
    CssUrl,
    CssImport,
    ScriptLiteral,
}

impl ReferenceContext {
    pub fn is_navigational(&self) -> bool {
        matches!(self, ReferenceContext::Link)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Absolute, fragment-free URL.
    pub url: Url,
    pub context: ReferenceContext,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub references: Vec<Reference>,
    /// Fragments that looked like references but could not be resolved.
    pub skipped: usize,
}

impl Extraction {
    pub fn urls(&self) -> Vec<String> {
        self.references.iter().map(|r| r.url.to_string()).collect()
    }
}

/// Finds mirrorable references in a text payload.
pub trait ReferenceExtractor: Send + Sync {
    fn extract(&self, content: &str, base: &Url, kind: PayloadKind) -> Extraction;
}

/// Default extractor: HTML5 parsing for markup, regex scanning for CSS and JS.
#[derive(Debug, Clone)]
pub struct MarkupExtractor {
    classifier: UrlClassifier,
}

impl MarkupExtractor {
    pub fn new(classifier: UrlClassifier) -> Self {
        Self { classifier }
    }
}

impl ReferenceExtractor for MarkupExtractor {
    fn extract(&self, content: &str, base: &Url, kind: PayloadKind) -> Extraction {
        let mut collector = Collector::new(&self.classifier);
        match kind {
            PayloadKind::Html => scan_html(content, base, &mut collector),
            PayloadKind::Css => scan_css(content, base, ReferenceContext::CssUrl, &mut collector),
            PayloadKind::Js => scan_js(content, base, &mut collector),
        }
        collector.finish()
    }
}

struct Collector<'a> {
    classifier: &'a UrlClassifier,
    seen: HashSet<String>,
    extraction: Extraction,
}

impl<'a> Collector<'a> {
    fn new(classifier: &'a UrlClassifier) -> Self {
        Self {
            classifier,
            seen: HashSet::new(),
            extraction: Extraction::default(),
        }
    }

    fn push(&mut self, raw: &str, base: &Url, context: ReferenceContext) {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') || has_ignored_scheme(raw) {
            return;
        }

        let mut url = match base.join(raw) {
            Ok(url) => url,
            Err(e) => {
                trace!("Skipping unresolvable reference '{}': {}", raw, e);
                self.extraction.skipped += 1;
                return;
            }
        };
        url.set_fragment(None);

        if !self.classifier.is_mirrorable_url(&url) {
            return;
        }
        if self.seen.insert(url.to_string()) {
            self.extraction.references.push(Reference { url, context });
        }
    }

    fn finish(self) -> Extraction {
        self.extraction
    }
}

fn has_ignored_scheme(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    ["data:", "blob:", "javascript:", "mailto:", "tel:", "about:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

fn scan_html(content: &str, page_url: &Url, collector: &mut Collector<'_>) {
    let document = Html::parse_document(content);

    let base = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "base")
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone());

    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        let el = element.value();
        let name = el.name();

        if name == "style" {
            let css: String = element.text().collect();
            scan_css(&css, &base, ReferenceContext::StyleBlock, collector);
            continue;
        }

        if let Some(href) = el.attr("href")
            && let Some(context) = href_context(name, el.attr("rel"))
        {
            collector.push(href, &base, context);
        }

        if let Some(href) = el.attr("data-href") {
            collector.push(href, &base, ReferenceContext::Link);
        }

        for attr in ["src", "data-src", "poster"] {
            if let Some(src) = el.attr(attr) {
                collector.push(src, &base, ReferenceContext::Source);
            }
        }

        for attr in ["srcset", "data-srcset"] {
            if let Some(srcset) = el.attr(attr) {
                for candidate in srcset_candidates(srcset) {
                    collector.push(candidate, &base, ReferenceContext::SrcSet);
                }
            }
        }

        if let Some(style) = el.attr("style") {
            scan_css(style, &base, ReferenceContext::InlineStyle, collector);
        }
    }
}

fn href_context(element: &str, rel: Option<&str>) -> Option<ReferenceContext> {
    match element {
        "a" | "area" => Some(ReferenceContext::Link),
        // resolution base, not a resource
        "base" => None,
        "link" => {
            let rel = rel.unwrap_or_default().to_ascii_lowercase();
            let rels: Vec<&str> = rel.split_whitespace().collect();
            if rels.iter().any(|r| matches!(*r, "preconnect" | "dns-prefetch")) {
                None
            } else if rels.contains(&"stylesheet") {
                Some(ReferenceContext::Stylesheet)
            } else if rels.iter().any(|r| {
                matches!(
                    *r,
                    "icon" | "apple-touch-icon" | "preload" | "modulepreload" | "prefetch" | "manifest"
                )
            }) {
                Some(ReferenceContext::Source)
            } else {
                Some(ReferenceContext::Link)
            }
        }
        _ => Some(ReferenceContext::Source),
    }
}

/// `a.jpg 1x, b.jpg 2x` -> `["a.jpg", "b.jpg"]`
fn srcset_candidates(srcset: &str) -> impl Iterator<Item = &str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
}

fn first_group<'t>(caps: &regex::Captures<'t>) -> Option<&'t str> {
    (1..caps.len()).find_map(|i| caps.get(i)).map(|m| m.as_str())
}

fn scan_css(css: &str, base: &Url, url_context: ReferenceContext, collector: &mut Collector<'_>) {
    let import_context = match url_context {
        ReferenceContext::CssUrl => ReferenceContext::CssImport,
        other => other,
    };

    for caps in CSS_IMPORT.captures_iter(css) {
        if let Some(raw) = first_group(&caps) {
            collector.push(raw, base, import_context);
        }
    }

    for caps in CSS_URL.captures_iter(css) {
        if let Some(raw) = first_group(&caps) {
            collector.push(raw, base, url_context);
        }
    }
}

fn scan_js(js: &str, base: &Url, collector: &mut Collector<'_>) {
    for pattern in [
        &*JS_CALL,
        &*JS_IMPORT_FROM,
        &*JS_XHR_OPEN,
        &*JS_ASSIGN,
        &*JS_ABSOLUTE,
    ] {
        for caps in pattern.captures_iter(js) {
            let Some(raw) = first_group(&caps) else {
                continue;
            };
            // concatenation bases and template literals are not fetchable as written
            if raw.ends_with('/') || raw.contains("${") {
                continue;
            }
            collector.push(raw, base, ReferenceContext::ScriptLiteral);
        }
    }
}
