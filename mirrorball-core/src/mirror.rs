use indicatif::{ProgressBar, ProgressStyle};
use mirrorball_engine::mirror::Phase;
use mirrorball_engine::{Mirror, MirrorConfig, MirrorSummary, ProgressCallback};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Options for configuring a mirror run
pub struct MirrorOptions {
    pub config: MirrorConfig,
    pub show_progress_bars: bool,
    /// Set to stop the run between batches
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Callback for reporting mirror progress
pub type MirrorProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Execute a mirror run with the given options
/// Returns the run summary
pub async fn execute_mirror(
    options: MirrorOptions,
    progress_callback: Option<MirrorProgressCallback>,
) -> Result<MirrorSummary, String> {
    let MirrorOptions {
        config,
        show_progress_bars,
        cancel,
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .map_err(|e| format!("Invalid progress template: {}", e))?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting mirror...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let processed_count = Arc::new(AtomicUsize::new(0));

    let pb_clone = progress_bar.clone();
    let count_clone = processed_count.clone();
    let external = progress_callback.clone();
    let engine_progress: ProgressCallback = Arc::new(move |phase: Phase, item: String| {
        let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
        let shown = if item.starts_with("http") {
            extract_url_path(&item)
        } else {
            item
        };
        if let Some(ref pb) = pb_clone {
            pb.set_message(format!("[{}] {} processed: {}", phase, count, shown));
        }
        if let Some(ref callback) = external {
            callback(format!("{}: {}", phase, shown));
        }
    });

    let mut mirror = Mirror::new(config)
        .map_err(|e| format!("Invalid mirror configuration: {}", e))?
        .with_progress_callback(engine_progress);
    if let Some(flag) = cancel {
        mirror = mirror.with_cancel_flag(flag);
    }

    debug!("Mirror configured for {}", mirror.config().origin);
    let outcome = mirror.run().await;

    if let Some(ref pb) = progress_bar {
        match &outcome {
            Ok(summary) if summary.cancelled => {
                pb.finish_with_message(format!("Mirror cancelled, {} files saved", summary.total_files()))
            }
            Ok(summary) => pb.finish_with_message(format!(
                "Mirror complete! {} pages, {} assets",
                summary.pages_saved, summary.assets_saved
            )),
            Err(_) => pb.finish_and_clear(),
        }
    }

    outcome.map_err(|e| format!("Mirror failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_url_path_unparseable_is_returned_verbatim() {
        assert_eq!(extract_url_path("not a url"), "not a url");
    }
}
