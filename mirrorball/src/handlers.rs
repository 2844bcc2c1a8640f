use anyhow::{Context, anyhow};
use chrono::Utc;
use clap::ArgMatches;
use colored::Colorize;
use mirrorball_core::mirror::{MirrorOptions, execute_mirror};
use mirrorball_core::profile::SiteProfile;
use mirrorball_core::report::{ReportData, ReportFormat, generate_report, save_report};
use mirrorball_engine::{FailureKind, MirrorConfig, MirrorSummary};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

pub use mirrorball_core::mirror::extract_url_path;

pub const EXIT_FAILURES: u8 = 2;
pub const EXIT_CANCELLED: u8 = 130;

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

/// Load seed routes from a file, one per line. Blank lines and `#` comments are skipped.
pub fn load_seeds_from_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read seeds file {}: {}", path.display(), e))?;

    let seeds: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_seed_line)
        .collect();

    if seeds.is_empty() {
        return Err(format!("No seeds found in {}", path.display()));
    }

    Ok(seeds)
}

/// Accept origin-relative routes as-is and absolute URLs when they parse.
/// Bare hostnames get `http://` prepended.
pub fn parse_seed_line(line: &str) -> Option<String> {
    if line.starts_with('/') {
        return Some(line.to_string());
    }
    parse_url_line(line)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if Url::parse(line).is_ok() {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() && !line.contains(char::is_whitespace) {
        return Some(with_scheme);
    }

    warn!("Skipping invalid seed '{}'", line);
    None
}

/// Build the site profile from `--profile` (or the storefront defaults) plus
/// any hosts and seeds given on the command line.
pub fn build_profile(args: &ArgMatches) -> anyhow::Result<SiteProfile> {
    let origin = args
        .get_one::<Url>("url")
        .ok_or_else(|| anyhow!("--url is required"))?;

    let mut profile = match args.get_one::<PathBuf>("profile") {
        Some(path) => SiteProfile::load(&expand_path(path)).map_err(|e| anyhow!(e))?,
        None => SiteProfile::for_origin(origin),
    };
    profile.origin = origin.as_str().to_string();

    if let Some(hosts) = args.get_many::<String>("host") {
        profile.add_hosts(hosts.cloned());
    }
    if let Some(seeds) = args.get_many::<String>("seed") {
        profile.add_seeds(seeds.cloned());
    }
    if let Some(path) = args.get_one::<PathBuf>("seeds-file") {
        let seeds = load_seeds_from_file(&expand_path(path)).map_err(|e| anyhow!(e))?;
        profile.add_seeds(seeds);
    }

    Ok(profile)
}

/// Build the engine configuration for the `mirror` subcommand.
pub fn build_config(args: &ArgMatches) -> anyhow::Result<MirrorConfig> {
    let output = args
        .get_one::<PathBuf>("output")
        .map(|p| expand_path(p))
        .unwrap_or_else(|| PathBuf::from("./mirror"));

    let mut config = build_profile(args)?
        .into_config(output)
        .map_err(|e| anyhow!(e))?;

    if let Some(&n) = args.get_one::<usize>("max-pages") {
        config = config.with_max_pages(n);
    }
    if let Some(&n) = args.get_one::<usize>("max-queue") {
        config = config.with_max_queue(n);
    }
    if let Some(&n) = args.get_one::<usize>("max-depth") {
        config = config.with_max_depth(Some(n));
    }
    if let Some(&n) = args.get_one::<usize>("max-passes") {
        config = config.with_max_asset_passes(n);
    }
    if let Some(&n) = args.get_one::<usize>("threads") {
        config = config.with_workers(n);
    }
    if let Some(&ms) = args.get_one::<u64>("delay-ms") {
        config = config.with_request_delay(Duration::from_millis(ms));
    }
    if let Some(&secs) = args.get_one::<u64>("timeout") {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if let Some(&n) = args.get_one::<u32>("retries") {
        config = config.with_retries(n);
    }

    config
        .validate()
        .context("Invalid mirror configuration")?;
    Ok(config)
}

/// Map a finished run to the process exit status.
pub fn exit_status(summary: &MirrorSummary, strict: bool) -> u8 {
    if summary.cancelled {
        EXIT_CANCELLED
    } else if strict && summary.has_failures() {
        EXIT_FAILURES
    } else {
        0
    }
}

fn print_summary(summary: &MirrorSummary) {
    println!();
    println!("{}", "═".repeat(60).bright_blue().bold());
    if summary.cancelled {
        println!("{} Mirror cancelled", "⚠".yellow().bold());
    } else {
        println!("{} Mirror complete!", "✓".green().bold());
    }
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!(
        "  {} {}",
        "Output:".bright_white(),
        summary.output_dir.display().to_string().cyan()
    );
    println!("  Pages saved:      {}", summary.pages_saved.to_string().green());
    println!("  Assets saved:     {}", summary.assets_saved.to_string().green());
    if summary.assets_pending > 0 {
        println!(
            "  Assets pending:   {}",
            summary.assets_pending.to_string().yellow()
        );
    }
    println!("  Asset passes:     {}", summary.asset_passes);
    println!("  Files rewritten:  {}", summary.files_rewritten);
    if summary.truncated {
        println!("  {} Page cap reached", "⚠".yellow());
    }
    if summary.has_failures() {
        println!(
            "  Failures:         {} ({} network, {} filesystem, {} invalid url)",
            summary.failures.len().to_string().red(),
            summary.failure_count(FailureKind::Network),
            summary.failure_count(FailureKind::FileSystem),
            summary.failure_count(FailureKind::InvalidUrl),
        );
        for failure in summary.failures.iter().take(10) {
            println!("    {} {} {}", "✗".red(), failure.url, failure.message.dimmed());
        }
        if summary.failures.len() > 10 {
            println!("    ... and {} more", summary.failures.len() - 10);
        }
    }
    println!();
}

pub async fn handle_mirror(args: &ArgMatches, quiet: bool) -> anyhow::Result<ExitCode> {
    let config = build_config(args)?;
    let strict = args.get_flag("strict");
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let report_path = args.get_one::<PathBuf>("report").map(|p| expand_path(p));

    if !quiet {
        println!(
            "\n{} Mirroring {}",
            "→".blue().bold(),
            config.origin.as_str().bright_white()
        );
        println!("Workers: {}", config.workers);
        println!("Seeds: {}", config.seeds.len());
        println!("Mirror hosts: {}\n", config.mirror_hosts.join(", "));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let started_at = Utc::now();
    let options = MirrorOptions {
        config,
        show_progress_bars: !quiet,
        cancel: Some(cancel),
    };
    let summary = execute_mirror(options, None)
        .await
        .map_err(|e| anyhow!(e))?;

    if !quiet {
        print_summary(&summary);
    }

    if let Some(path) = report_path {
        let data = ReportData::new(summary.clone(), started_at);
        let content = generate_report(&data, format).map_err(|e| anyhow!(e))?;
        save_report(&content, &path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
        if !quiet {
            println!("{} Report saved to {}", "✓".green().bold(), path.display());
        }
    }

    Ok(ExitCode::from(exit_status(&summary, strict)))
}
