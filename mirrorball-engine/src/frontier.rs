// Crawl frontier: registered URLs, their local paths and what is left to fetch

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use url::Url;

use crate::classify::UrlClassifier;
use crate::result::ResourceRole;
use crate::rewrite::LinkMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: Url,
    pub key: String,
    pub local_path: String,
    pub role: ResourceRole,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Queued,
    Dispatched,
    Saved,
    Failed,
}

#[derive(Debug)]
struct Entry {
    target: CrawlTarget,
    state: TargetState,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<Entry>,
    by_key: HashMap<String, usize>,
    /// local path -> key that owns it
    paths: HashMap<String, String>,
    page_queue: VecDeque<usize>,
    pages_registered: usize,
    truncated: bool,
    collisions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrontierCounts {
    pub pages: usize,
    pub assets: usize,
    pub queued_pages: usize,
    /// Assets neither saved nor failed.
    pub unfetched_assets: usize,
    pub saved: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct Frontier {
    classifier: UrlClassifier,
    max_pages: usize,
    max_queue: usize,
    max_depth: Option<usize>,
    inner: Mutex<Inner>,
}

impl Frontier {
    pub fn new(
        classifier: UrlClassifier,
        max_pages: usize,
        max_queue: usize,
        max_depth: Option<usize>,
    ) -> Self {
        Self {
            classifier,
            max_pages,
            max_queue,
            max_depth,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a seed page. Seeds skip the page-link filter but not the caps.
    pub fn seed(&self, url: &Url) -> Option<CrawlTarget> {
        if !self.classifier.is_mirrorable_url(url) {
            debug!("Seed {} is outside the mirror, ignoring", url);
            return None;
        }
        self.register_page(url, 0)
    }

    /// Queue a discovered page link. Returns the target when it is new.
    pub fn enqueue_page(&self, url: &Url, depth: usize) -> Option<CrawlTarget> {
        if !self.classifier.is_page_link(url) {
            return None;
        }
        if let Some(max_depth) = self.max_depth
            && depth > max_depth
        {
            return None;
        }
        self.register_page(url, depth)
    }

    fn register_page(&self, url: &Url, depth: usize) -> Option<CrawlTarget> {
        let key = self.classifier.key(url);
        let mut inner = self.lock();
        if inner.by_key.contains_key(&key) {
            return None;
        }
        if inner.pages_registered >= self.max_pages || inner.page_queue.len() >= self.max_queue {
            if !inner.truncated {
                debug!("Page limit reached at {}, truncating crawl", url);
            }
            inner.truncated = true;
            return None;
        }

        let local_path = self.classifier.local_path(url, false)?;
        let index = self.insert(&mut inner, url, key, local_path, ResourceRole::Page, depth);
        inner.pages_registered += 1;
        inner.page_queue.push_back(index);
        Some(inner.entries[index].target.clone())
    }

    /// Register an asset reference. Returns the target when it is new.
    pub fn record_asset(&self, url: &Url, depth: usize) -> Option<CrawlTarget> {
        if !self.classifier.is_mirrorable_url(url) {
            return None;
        }
        let key = self.classifier.key(url);
        let mut inner = self.lock();
        if inner.by_key.contains_key(&key) {
            return None;
        }
        let local_path = self.classifier.local_path(url, true)?;
        let index = self.insert(&mut inner, url, key, local_path, ResourceRole::Asset, depth);
        Some(inner.entries[index].target.clone())
    }

    fn insert(
        &self,
        inner: &mut Inner,
        url: &Url,
        key: String,
        local_path: String,
        role: ResourceRole,
        depth: usize,
    ) -> usize {
        let local_path = match inner.paths.get(&local_path) {
            Some(owner) if *owner != key => {
                let mut candidate = disambiguate(&local_path, &key);
                let mut attempt = 1;
                while inner.paths.contains_key(&candidate) {
                    candidate = disambiguate(&local_path, &format!("{}#{}", key, attempt));
                    attempt += 1;
                }
                debug!("Path {} already taken, {} stored as {}", local_path, url, candidate);
                inner.collisions += 1;
                candidate
            }
            _ => local_path,
        };

        inner.paths.insert(local_path.clone(), key.clone());
        let index = inner.entries.len();
        inner.by_key.insert(key.clone(), index);
        inner.entries.push(Entry {
            target: CrawlTarget {
                url: url.clone(),
                key,
                local_path,
                role,
                depth,
            },
            state: TargetState::Queued,
        });
        index
    }

    /// Take up to `max` queued pages, marking them dispatched in one step.
    pub fn next_batch(&self, max: usize) -> Vec<CrawlTarget> {
        let mut inner = self.lock();
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(index) = inner.page_queue.pop_front() else {
                break;
            };
            let entry = &mut inner.entries[index];
            entry.state = TargetState::Dispatched;
            batch.push(entry.target.clone());
        }
        batch
    }

    /// Take every queued asset in registration order, marking them dispatched.
    pub fn pending_assets(&self) -> Vec<CrawlTarget> {
        let mut inner = self.lock();
        inner
            .entries
            .iter_mut()
            .filter(|e| e.target.role == ResourceRole::Asset && e.state == TargetState::Queued)
            .map(|e| {
                e.state = TargetState::Dispatched;
                e.target.clone()
            })
            .collect()
    }

    /// A page target that did not turn out to be HTML keeps its path but is
    /// reported and rewritten as an asset.
    pub fn reclassify_as_asset(&self, key: &str) {
        let mut inner = self.lock();
        if let Some(&index) = inner.by_key.get(key) {
            inner.entries[index].target.role = ResourceRole::Asset;
        }
    }

    pub fn mark_saved(&self, key: &str) {
        self.set_state(key, TargetState::Saved);
    }

    pub fn mark_failed(&self, key: &str) {
        self.set_state(key, TargetState::Failed);
    }

    fn set_state(&self, key: &str, state: TargetState) {
        let mut inner = self.lock();
        if let Some(&index) = inner.by_key.get(key) {
            inner.entries[index].state = state;
        }
    }

    pub fn state(&self, key: &str) -> Option<TargetState> {
        let inner = self.lock();
        inner.by_key.get(key).map(|&index| inner.entries[index].state)
    }

    pub fn target(&self, key: &str) -> Option<CrawlTarget> {
        let inner = self.lock();
        inner
            .by_key
            .get(key)
            .map(|&index| inner.entries[index].target.clone())
    }

    /// Resource key -> local path for every saved resource, plus the host
    /// behind each `/cdn/` directory.
    pub fn link_map(&self) -> LinkMap {
        let inner = self.lock();
        let mut links: LinkMap = inner
            .entries
            .iter()
            .filter(|e| e.state == TargetState::Saved)
            .map(|e| (e.target.key.clone(), e.target.local_path.clone()))
            .collect();
        for entry in &inner.entries {
            if let Some(prefix) = self.classifier.host_prefix(&entry.target.url) {
                links.insert_host(prefix, &entry.target.url);
            }
        }
        links
    }

    pub fn has_queued_pages(&self) -> bool {
        !self.lock().page_queue.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.lock().truncated
    }

    pub fn collisions(&self) -> usize {
        self.lock().collisions
    }

    pub fn counts(&self) -> FrontierCounts {
        let inner = self.lock();
        let mut counts = FrontierCounts {
            queued_pages: inner.page_queue.len(),
            ..FrontierCounts::default()
        };
        for entry in &inner.entries {
            match entry.target.role {
                ResourceRole::Page => counts.pages += 1,
                ResourceRole::Asset => {
                    counts.assets += 1;
                    if matches!(entry.state, TargetState::Queued | TargetState::Dispatched) {
                        counts.unfetched_assets += 1;
                    }
                }
            }
            match entry.state {
                TargetState::Saved => counts.saved += 1,
                TargetState::Failed => counts.failed += 1,
                _ => {}
            }
        }
        counts
    }
}

/// `/cdn/h/theme.css` + key -> `/cdn/h/theme~1a2b3c4d.css`
fn disambiguate(local_path: &str, key: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let tag = &digest[..8];
    let (dir, file) = local_path.rsplit_once('/').unwrap_or(("", local_path));
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}/{}~{}.{}", dir, stem, tag, ext),
        _ => format!("{}/{}~{}", dir, file, tag),
    }
}
