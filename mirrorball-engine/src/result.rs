use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::ContentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    FileSystem,
    InvalidUrl,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRole {
    Page,
    Asset,
}

/// A single URL that could not be captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub role: ResourceRole,
    pub kind: FailureKind,
    pub message: String,
}

/// A single file written into the mirror tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedResource {
    pub url: String,
    pub local_path: String,
    pub role: ResourceRole,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub content_kind: ContentKind,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSummary {
    pub origin: String,
    pub output_dir: PathBuf,
    pub pages_saved: usize,
    pub assets_saved: usize,
    pub assets_pending: usize,
    pub asset_passes: usize,
    pub files_rewritten: usize,
    pub parse_skips: usize,
    pub collisions_resolved: usize,
    pub truncated: bool,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub saved: Vec<SavedResource>,
    pub failures: Vec<FailureRecord>,
}

impl MirrorSummary {
    pub fn new(origin: String, output_dir: PathBuf) -> Self {
        Self {
            origin,
            output_dir,
            pages_saved: 0,
            assets_saved: 0,
            assets_pending: 0,
            asset_passes: 0,
            files_rewritten: 0,
            parse_skips: 0,
            collisions_resolved: 0,
            truncated: false,
            cancelled: false,
            elapsed: Duration::from_secs(0),
            saved: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn failure_count(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn total_files(&self) -> usize {
        self.pages_saved + self.assets_saved
    }
}
