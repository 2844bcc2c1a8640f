// Run reports generated from a mirror summary

use chrono::{DateTime, Utc};
use mirrorball_engine::{FailureKind, FailureRecord, MirrorSummary, ResourceRole};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const DIVIDER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

const FAILURE_KINDS: [FailureKind; 4] = [
    FailureKind::Network,
    FailureKind::FileSystem,
    FailureKind::InvalidUrl,
    FailureKind::Internal,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub summary: MirrorSummary,
    pub started_at: DateTime<Utc>,
}

impl ReportData {
    pub fn new(summary: MirrorSummary, started_at: DateTime<Utc>) -> Self {
        Self { summary, started_at }
    }

    fn status(&self) -> &'static str {
        if self.summary.cancelled {
            "Cancelled"
        } else if self.summary.truncated {
            "Completed (page cap reached)"
        } else if self.summary.has_failures() {
            "Completed with failures"
        } else {
            "Completed"
        }
    }

    fn duration_secs(&self) -> f64 {
        self.summary.elapsed.as_secs_f64()
    }
}

fn kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Network => "network",
        FailureKind::FileSystem => "filesystem",
        FailureKind::InvalidUrl => "invalid url",
        FailureKind::Internal => "internal",
    }
}

fn role_label(role: ResourceRole) -> &'static str {
    match role {
        ResourceRole::Page => "page",
        ResourceRole::Asset => "asset",
    }
}

fn section(report: &mut String, title: &str) {
    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str(title);
    report.push('\n');
    report.push_str(DIVIDER);
    report.push_str("\n\n");
}

pub fn generate_text_report(data: &ReportData) -> String {
    let summary = &data.summary;
    let mut report = String::new();

    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str("                          MIRRORBALL MIRROR REPORT\n");
    report.push_str(DIVIDER);
    report.push_str("\n\n");

    report.push_str(&format!("Origin:       {}\n", summary.origin));
    report.push_str(&format!("Output:       {}\n", summary.output_dir.display()));
    report.push_str(&format!("Status:       {}\n", data.status()));
    report.push_str(&format!(
        "Started:      {}\n",
        data.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("Duration:     {:.1} seconds\n\n", data.duration_secs()));

    section(&mut report, "SUMMARY");
    report.push_str(&format!("  Pages saved:          {}\n", summary.pages_saved));
    report.push_str(&format!("  Assets saved:         {}\n", summary.assets_saved));
    report.push_str(&format!("  Assets pending:       {}\n", summary.assets_pending));
    report.push_str(&format!("  Asset passes:         {}\n", summary.asset_passes));
    report.push_str(&format!("  Files rewritten:      {}\n", summary.files_rewritten));
    report.push_str(&format!("  References skipped:   {}\n", summary.parse_skips));
    report.push_str(&format!("  Path collisions:      {}\n", summary.collisions_resolved));
    if summary.truncated {
        report.push_str("\n  Page cap reached; some discovered pages were not captured.\n");
    }
    if summary.cancelled {
        report.push_str("\n  Run cancelled before all phases finished.\n");
    }
    report.push('\n');

    if summary.has_failures() {
        section(&mut report, "FAILURES");
        report.push_str(&format!("Total: {}\n\n", summary.failures.len()));
        for kind in FAILURE_KINDS {
            let count = summary.failure_count(kind);
            if count > 0 {
                report.push_str(&format!("  [{}] {}\n", kind_label(kind).to_uppercase(), count));
            }
        }
        report.push('\n');

        for (idx, failure) in summary.failures.iter().enumerate() {
            report.push_str(&format!("[{}] {}\n", idx + 1, failure.url));
            report.push_str(&format!(
                "Kind:         {} ({})\n",
                kind_label(failure.kind),
                role_label(failure.role)
            ));
            report.push_str(&wrap_text(&failure.message, 80, "  "));
            report.push('\n');
        }
    }

    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str("                              End of Report\n");
    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str("\nGenerated by Mirrorball\n\n");

    report
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let summary = &data.summary;
    let mut report = String::new();

    report.push_str("# Mirrorball Mirror Report\n\n");
    report.push_str(&format!("- **Origin:** {}\n", summary.origin));
    report.push_str(&format!("- **Output:** `{}`\n", summary.output_dir.display()));
    report.push_str(&format!("- **Status:** {}\n", data.status()));
    report.push_str(&format!("- **Started:** {}\n", data.started_at.to_rfc3339()));
    report.push_str(&format!("- **Duration:** {:.1}s\n\n", data.duration_secs()));

    report.push_str("## Summary\n\n");
    report.push_str("| Metric | Count |\n|---|---|\n");
    report.push_str(&format!("| Pages saved | {} |\n", summary.pages_saved));
    report.push_str(&format!("| Assets saved | {} |\n", summary.assets_saved));
    report.push_str(&format!("| Assets pending | {} |\n", summary.assets_pending));
    report.push_str(&format!("| Asset passes | {} |\n", summary.asset_passes));
    report.push_str(&format!("| Files rewritten | {} |\n", summary.files_rewritten));
    report.push_str(&format!("| References skipped | {} |\n", summary.parse_skips));
    report.push_str(&format!("| Path collisions | {} |\n", summary.collisions_resolved));
    report.push_str(&format!("| Truncated | {} |\n", summary.truncated));
    report.push_str(&format!("| Cancelled | {} |\n\n", summary.cancelled));

    if summary.has_failures() {
        report.push_str(&format!("## Failures ({})\n\n", summary.failures.len()));
        report.push_str("| URL | Role | Kind | Message |\n|---|---|---|---|\n");
        for failure in &summary.failures {
            report.push_str(&markdown_failure_row(failure));
        }
        report.push('\n');
    }

    report
}

fn markdown_failure_row(failure: &FailureRecord) -> String {
    format!(
        "| {} | {} | {} | {} |\n",
        failure.url,
        role_label(failure.role),
        kind_label(failure.kind),
        failure.message.replace('|', "\\|").replace('\n', " ")
    )
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let summary = &data.summary;
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Mirrorball",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": {
                "origin": summary.origin,
                "output_dir": summary.output_dir,
                "status": data.status(),
                "started_at": data.started_at.to_rfc3339(),
                "duration_seconds": data.duration_secs(),
                "truncated": summary.truncated,
                "cancelled": summary.cancelled
            },
            "summary": {
                "pages_saved": summary.pages_saved,
                "assets_saved": summary.assets_saved,
                "assets_pending": summary.assets_pending,
                "asset_passes": summary.asset_passes,
                "files_rewritten": summary.files_rewritten,
                "parse_skips": summary.parse_skips,
                "collisions_resolved": summary.collisions_resolved,
                "failure_breakdown": {
                    "network": summary.failure_count(FailureKind::Network),
                    "file_system": summary.failure_count(FailureKind::FileSystem),
                    "invalid_url": summary.failure_count(FailureKind::InvalidUrl),
                    "internal": summary.failure_count(FailureKind::Internal)
                }
            },
            "failures": summary.failures,
            "saved": summary.saved
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_report(data: &ReportData, format: ReportFormat) -> Result<String, String> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Markdown => Ok(generate_markdown_report(data)),
        ReportFormat::Json => {
            generate_json_report(data).map_err(|e| format!("Failed to build JSON report: {}", e))
        }
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.len() + word.len() + 1 > width - indent.len() && !current_line.is_empty() {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}
