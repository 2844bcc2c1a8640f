pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod frontier;
pub mod mirror;
pub mod result;
pub mod rewrite;

pub use classify::{UrlClassifier, resource_key};
pub use config::MirrorConfig;
pub use error::MirrorError;
pub use extract::{MarkupExtractor, PayloadKind, Reference, ReferenceContext, ReferenceExtractor};
pub use fetcher::{ContentKind, Fetcher};
pub use frontier::Frontier;
pub use mirror::{Mirror, Phase, ProgressCallback};
pub use result::{FailureKind, FailureRecord, MirrorSummary, ResourceRole, SavedResource};
pub use rewrite::{LinkMap, Rewriter, sweep_tree};
