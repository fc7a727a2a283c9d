//! Change reports built from reconciled plugin states

use std::sync::LazyLock;

use regex::Regex;

use crate::reconcile::PluginState;

static UPDATE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+\+\+ (.+) \+\+\+$").expect("update marker regex is valid"));

/// Header of the confirmation document
pub const CONFIRM_HEADER: &str = "\
This is a confirmation report before an actual update.

Apply the update by saving this file and closing the editor.
Cancel the update by exiting the editor with an error (`:cq` in Vim).

Lines `+++ <name> +++` mark plugins with pending updates.
Delete such a line to skip updating that plugin.

Lines `!!! <name> !!!` mark plugins with errors.
Lines `--- <name> ---` mark plugins without pending updates.
";

/// Report category, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    Error,
    Update,
    Monitor,
    Same,
}

/// One plugin's section of a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub name: String,
    pub kind: EntryKind,
    pub text: String,
}

fn short(commit: &Option<String>) -> &str {
    commit.as_deref().unwrap_or("<unknown>")
}

fn entry(p: &PluginState) -> ReportEntry {
    let name = p.name().to_string();
    if let Some(failure) = p.job.failure() {
        return ReportEntry {
            text: format!("!!! {} !!!\n\n{}", name, failure),
            name,
            kind: EntryKind::Error,
        };
    }

    let kind = if p.needs_checkout {
        EntryKind::Update
    } else if p.has_monitor_changes() {
        EntryKind::Monitor
    } else {
        EntryKind::Same
    };
    let marker = match kind {
        EntryKind::Update => "+++",
        _ => "---",
    };
    let checkout = p.spec.checkout.as_deref().unwrap_or("<default>");
    let monitor = p.spec.monitor.as_deref().unwrap_or("<default>");

    let mut lines = vec![
        format!("{} {} {}", marker, name, marker),
        format!("Path:         {}", p.path.display()),
        format!("Source:       {}", p.spec.source.as_deref().unwrap_or("<none>")),
        format!("State before: {}", short(&p.head)),
        format!("State after:  {} ({})", short(&p.checkout_to), checkout),
    ];
    if !p.checkout_log.trim().is_empty() {
        lines.push(String::new());
        lines.push(format!("Pending updates from `{}`:", checkout));
        lines.push(p.checkout_log.trim_end().to_string());
    }
    if p.has_monitor_changes() {
        lines.push(String::new());
        lines.push(format!("Monitor updates from `{}`:", monitor));
        lines.push(p.monitor_log.trim_end().to_string());
    }

    ReportEntry {
        name,
        kind,
        text: lines.join("\n"),
    }
}

/// One entry per plugin: errors first, then updates, monitor-only changes, unchanged
///
/// The sort is stable, so plugins keep batch order within a category.
pub fn build_entries(plugs: &[PluginState]) -> Vec<ReportEntry> {
    let mut entries: Vec<ReportEntry> = plugs.iter().map(entry).collect();
    entries.sort_by_key(|e| e.kind);
    entries
}

pub fn render(entries: &[ReportEntry]) -> String {
    entries.iter().map(|e| e.text.as_str()).collect::<Vec<_>>().join("\n\n")
}

/// The editable document for confirm mode
pub fn confirm_document(entries: &[ReportEntry]) -> String {
    format!("{}\n{}\n", CONFIRM_HEADER, render(entries))
}

/// Names whose `+++ <name> +++` marker survived editing, in document order
pub fn parse_confirmed(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = UPDATE_MARKER.captures(line.trim_end()) {
            let name = caps[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}
