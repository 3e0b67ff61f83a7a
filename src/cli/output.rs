use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::host::SettingScope;
use crate::io::session::SessionState;
use crate::model::view::FoldAction;
use crate::parse::span::BlockRange;
use crate::sync::{SyncReport, ViewOutcome};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusJson {
    pub collapsed: bool,
    pub scope: SettingScope,
    pub apply_on_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

#[derive(Serialize)]
pub struct LocateJson {
    pub path: String,
    pub language: String,
    pub qualifies: bool,
    pub block: Option<BlockRange>,
}

#[derive(Serialize)]
pub struct RangesJson {
    pub path: String,
    pub ranges: Vec<BlockRange>,
}

#[derive(Serialize)]
pub struct ViewJson {
    pub id: String,
    pub group: usize,
    pub path: String,
    pub focused: bool,
    pub active: bool,
    pub cursor_line: usize,
    pub folded: Vec<BlockRange>,
}

#[derive(Serialize)]
pub struct ActivationJson {
    pub view: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<BlockRange>,
}

pub fn views_to_json(state: &SessionState) -> Vec<ViewJson> {
    let mut out = Vec::new();
    for (gi, group) in state.groups.iter().enumerate() {
        for view in &group.views {
            out.push(ViewJson {
                id: view.id.to_string(),
                group: gi + 1,
                path: view.path.display().to_string(),
                focused: state.focused.as_ref() == Some(&view.id),
                active: group.active.as_ref() == Some(&view.id),
                cursor_line: view.cursor_line,
                folded: view.folded.clone(),
            });
        }
    }
    out
}

pub fn activation_to_json(view: &str, outcome: Option<&ViewOutcome>) -> ActivationJson {
    let range = match outcome {
        Some(ViewOutcome::Applied { range, .. }) => Some(*range),
        _ => None,
    };
    ActivationJson {
        view: view.to_string(),
        outcome: outcome_name(outcome),
        range,
    }
}

/// Activation JSON for a view opened or focused with `apply_on_open` off.
pub fn unapplied_to_json(view: &str) -> ActivationJson {
    ActivationJson {
        view: view.to_string(),
        outcome: "not_applied",
        range: None,
    }
}

fn outcome_name(outcome: Option<&ViewOutcome>) -> &'static str {
    match outcome {
        None => "ignored",
        Some(ViewOutcome::NotQualified) => "not_qualified",
        Some(ViewOutcome::NoBlock) => "no_block",
        Some(ViewOutcome::Applied { .. }) => "applied",
        Some(ViewOutcome::StaleFocus) => "stale_focus",
        Some(ViewOutcome::Failed) => "failed",
    }
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

fn state_word(collapsed: bool) -> &'static str {
    if collapsed { "collapsed" } else { "expanded" }
}

/// One-line summary of a toggle.
pub fn format_report(report: &SyncReport) -> String {
    let verb = if report.collapsed { "folded" } else { "unfolded" };
    let noun = if report.applied == 1 { "view" } else { "views" };
    let mut line = format!(
        "annotations {}: {} {} {}",
        state_word(report.collapsed),
        report.applied,
        noun,
        verb
    );
    if report.failed > 0 {
        let _ = write!(line, ", {} failed", report.failed);
    }
    if report.stale > 0 {
        let _ = write!(line, ", {} skipped (focus moved)", report.stale);
    }
    line
}

pub fn format_status(collapsed: bool, scope: SettingScope, settings_path: Option<&Path>) -> String {
    let mut out = format!("annotations {}\n", state_word(collapsed));
    let _ = write!(out, "stored in {} settings", scope);
    if let Some(path) = settings_path {
        let _ = write!(out, " ({})", path.display());
    }
    out
}

pub fn format_block(path: &Path, block: Option<BlockRange>) -> String {
    match block {
        Some(range) => format!("{}: {}", path.display(), range),
        None => format!("{}: no annotation block", path.display()),
    }
}

/// One `start-end` pair per line, 0-based and inclusive, for hosts that
/// feed a folding-range provider.
pub fn format_ranges(ranges: &[BlockRange]) -> String {
    ranges
        .iter()
        .map(|r| format!("{}-{}", r.start_line, r.end_line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_activation(view: &str, outcome: Option<&ViewOutcome>) -> String {
    match outcome {
        None => format!("{}: ignored (focus change in progress)", view),
        Some(ViewOutcome::NotQualified) => format!("{}: not an annotated file type", view),
        Some(ViewOutcome::NoBlock) => format!("{}: no annotation block", view),
        Some(ViewOutcome::Applied { action, range }) => {
            let verb = match action {
                FoldAction::Fold => "folded",
                FoldAction::Unfold => "unfolded",
            };
            format!("{}: {} {}", view, verb, range)
        }
        Some(ViewOutcome::StaleFocus) => format!("{}: skipped, focus moved", view),
        Some(ViewOutcome::Failed) => format!("{}: fold request failed", view),
    }
}

pub fn format_unapplied(view: &str) -> String {
    format!("{}: not applied (apply_on_open is off)", view)
}

/// Views by group. `>` marks the focused view, `*` a group's active tab.
pub fn format_views(state: &SessionState) -> String {
    if state.groups.iter().all(|g| g.views.is_empty()) {
        return "no open views".to_string();
    }
    let mut lines = Vec::new();
    for (gi, group) in state.groups.iter().enumerate() {
        if group.views.is_empty() {
            continue;
        }
        lines.push(format!("group {}:", gi + 1));
        for view in &group.views {
            let marker = if state.focused.as_ref() == Some(&view.id) {
                "> "
            } else if group.active.as_ref() == Some(&view.id) {
                "* "
            } else {
                "  "
            };
            let mut line = format!("{}{:<4} {}", marker, view.id.as_str(), view.path.display());
            if !view.folded.is_empty() {
                let folds: Vec<String> = view.folded.iter().map(|r| r.to_string()).collect();
                let _ = write!(line, "  [folded {}]", folds.join(", "));
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    fn sample_session() -> SessionState {
        let mut state = SessionState::default();
        let model = state.open("app/models/user.rb".into(), 0);
        let _readme = state.open("README.md".into(), 0);
        let split = state.open("app/models/user.rb".into(), 1);
        state.focus(&split);
        state.focus(&model);
        state.groups[0].views[0].folded.push(BlockRange::new(0, 3));
        state
    }

    #[test]
    fn views_listing() {
        assert_snapshot!(format_views(&sample_session()), @r"
        group 1:
        > v1   app/models/user.rb  [folded lines 1-4]
          v2   README.md
        group 2:
        * v3   app/models/user.rb
        ");
    }

    #[test]
    fn empty_views_listing() {
        assert_eq!(format_views(&SessionState::default()), "no open views");
    }

    #[test]
    fn views_json_marks_focus() {
        let json = views_to_json(&sample_session());
        assert_eq!(json.len(), 3);
        assert!(json[0].focused && json[0].active);
        assert!(!json[2].focused && json[2].active);
        assert_eq!(json[2].group, 2);
    }

    #[test]
    fn report_summary() {
        let report = SyncReport {
            collapsed: true,
            applied: 2,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(format_report(&report), "annotations collapsed: 2 views folded, 1 failed");

        let report = SyncReport {
            applied: 1,
            ..Default::default()
        };
        assert_eq!(format_report(&report), "annotations expanded: 1 view unfolded");
    }

    #[test]
    fn block_lines_are_one_based() {
        let path = Path::new("app/models/user.rb");
        assert_eq!(
            format_block(path, Some(BlockRange::new(0, 3))),
            "app/models/user.rb: lines 1-4"
        );
        assert_eq!(format_block(path, None), "app/models/user.rb: no annotation block");
    }

    #[test]
    fn activation_messages() {
        let applied = ViewOutcome::Applied {
            action: FoldAction::Fold,
            range: BlockRange::new(0, 1),
        };
        assert_eq!(format_activation("v1", Some(&applied)), "v1: folded lines 1-2");
        assert_eq!(format_activation("v1", None), "v1: ignored (focus change in progress)");
        assert_eq!(activation_to_json("v1", Some(&applied)).outcome, "applied");
        assert_eq!(unapplied_to_json("v1").outcome, "not_applied");
        assert_eq!(format_unapplied("v1"), "v1: not applied (apply_on_open is off)");
    }
}
