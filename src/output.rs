//! CLI output formatting for `check` and `upgrade`.
//!
//! # Information-First Display
//!
//! Each post is shown by its title first, with the file path as indented
//! `Source:` context. Posts that failed to load are shown by filename, since
//! there is no title to show.
//!
//! ```text
//! 001 Sunset over the estuary (2 pictures)
//!     Source: _artwork/2019-03-02-sunset.md
//!     Schema: v1 (flow-collection), migrated to v3
//!     Backup: _artwork/2019-03-02-sunset.md.bak (created)
//!     Tags: featured, sea
//!     001 Web size
//!     002 (sunset-2.jpg)
//! 002 (2020-02-02-broken.md)
//!     Source: _artwork/2020-02-02-broken.md
//!     Error: cannot migrate front matter from v2: missing key: variants
//!
//! Checked 2 posts: 0 current, 1 migrated, 1 failed
//! ```
//!
//! # Architecture
//!
//! `format_*` functions return `Vec<String>` and do no I/O; `print_*`
//! wrappers write them to stdout. [`format_json`] serves `check --json`.

use crate::detect::SchemaVersion;
use crate::store::{Backup, LoadReport, StoreError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Result of processing one file, keyed by the path as given.
pub type FileOutcome = (PathBuf, Result<LoadReport, StoreError>);

/// Which command produced the outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Loaded only; stale posts were migrated in memory.
    Check,
    /// Stale posts were rewritten on disk.
    Upgrade,
}

impl Action {
    fn stale_verb(self) -> &'static str {
        match self {
            Action::Check => "migrated",
            Action::Upgrade => "upgraded",
        }
    }
}

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Post header: index and title, with a picture count for picture posts.
fn post_header(index: usize, title: &str, pictures: Option<usize>) -> String {
    match pictures {
        Some(1) => format!("{} {} (1 picture)", format_index(index), title),
        Some(n) => format!("{} {} ({} pictures)", format_index(index), title, n),
        None => format!("{} {}", format_index(index), title),
    }
}

/// Labeled pictures show the label, unlabeled ones their filename in parens.
fn picture_line(index: usize, label: Option<&str>, filename: &str) -> String {
    match label {
        Some(l) if !l.is_empty() => format!("{} {}", format_index(index), l),
        _ => format!("{} ({})", format_index(index), filename),
    }
}

fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Check / upgrade
// ============================================================================

/// Format the report for one successfully loaded post.
pub fn format_report(
    index: usize,
    report: &LoadReport,
    root: &Path,
    action: Action,
) -> Vec<String> {
    let post = &report.post;
    let mut lines = Vec::new();

    let count = post.is_picture_post().then(|| post.pictures().len());
    lines.push(post_header(index, &post.title, count));
    lines.push(format!(
        "{}Source: {}",
        indent(1),
        display_path(&report.path, root)
    ));

    let detection = &report.detection;
    let rule = detection.rule.map(|r| format!(" ({r})")).unwrap_or_default();
    if report.is_stale() {
        lines.push(format!(
            "{}Schema: {}{}, {} to {}",
            indent(1),
            detection.version,
            rule,
            action.stale_verb(),
            SchemaVersion::CURRENT
        ));
    } else {
        lines.push(format!("{}Schema: {}{}", indent(1), detection.version, rule));
    }

    if let Some(backup) = &report.backup {
        let state = match backup {
            Backup::Created(_) => "created",
            Backup::Kept(_) => "kept existing",
        };
        lines.push(format!(
            "{}Backup: {} ({})",
            indent(1),
            display_path(backup.path(), root),
            state
        ));
    }

    if !post.tags.is_empty() {
        lines.push(format!("{}Tags: {}", indent(1), post.tags.join(", ")));
    }

    for (i, picture) in post.pictures().iter().enumerate() {
        lines.push(format!(
            "{}{}",
            indent(1),
            picture_line(i + 1, picture.label.as_deref(), &picture.original_filename)
        ));
    }

    lines
}

/// Format a failed file: filename header, source, and the error.
pub fn format_failure(index: usize, path: &Path, error: &StoreError, root: &Path) -> Vec<String> {
    vec![
        format!("{} ({})", format_index(index), file_label(path)),
        format!("{}Source: {}", indent(1), display_path(path, root)),
        format!("{}Error: {}", indent(1), error),
    ]
}

/// Format every outcome followed by a one-line summary.
pub fn format_outcomes(outcomes: &[FileOutcome], root: &Path, action: Action) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = 0;
    let mut stale = 0;
    let mut failed = 0;

    for (i, (path, result)) in outcomes.iter().enumerate() {
        match result {
            Ok(report) => {
                if report.is_stale() {
                    stale += 1;
                } else {
                    current += 1;
                }
                lines.extend(format_report(i + 1, report, root, action));
            }
            Err(e) => {
                failed += 1;
                lines.extend(format_failure(i + 1, path, e, root));
            }
        }
    }

    let verb = match action {
        Action::Check => "Checked",
        Action::Upgrade => "Processed",
    };
    let noun = if outcomes.len() == 1 { "post" } else { "posts" };
    lines.push(String::new());
    lines.push(format!(
        "{} {} {}: {} current, {} {}, {} failed",
        verb,
        outcomes.len(),
        noun,
        current,
        stale,
        action.stale_verb(),
        failed
    ));
    lines
}

pub fn print_outcomes(outcomes: &[FileOutcome], root: &Path, action: Action) {
    for line in format_outcomes(outcomes, root, action) {
        println!("{}", line);
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Machine-readable summary of one file, for `check --json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<&'static str>,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    pub pictures: usize,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileSummary {
    pub fn new(path: &Path, result: &Result<LoadReport, StoreError>) -> Self {
        match result {
            Ok(report) => Self {
                path: path.display().to_string(),
                title: Some(report.post.title.clone()),
                collection: Some(report.post.collection().id().to_string()),
                detected_version: Some(report.detection.version.number()),
                rule: report.detection.rule,
                stale: report.is_stale(),
                backup: report.backup.as_ref().map(|b| b.path().display().to_string()),
                pictures: report.post.pictures().len(),
                tags: report.post.tags.clone(),
                error: None,
            },
            Err(e) => Self {
                path: path.display().to_string(),
                title: None,
                collection: None,
                detected_version: None,
                rule: None,
                stale: false,
                backup: None,
                pictures: 0,
                tags: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Pretty-printed JSON array with one [`FileSummary`] per outcome.
pub fn format_json(outcomes: &[FileOutcome]) -> Result<String, serde_json::Error> {
    let summaries: Vec<FileSummary> = outcomes
        .iter()
        .map(|(path, result)| FileSummary::new(path, result))
        .collect();
    serde_json::to_string_pretty(&summaries)
}
