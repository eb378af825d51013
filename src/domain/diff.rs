//! Snapshot diff: which entries changed between two reports.
//!
//! Timestamps never count as changes. Entries are matched by
//! (section title, label), which is stable across runs because the section
//! plan is fixed.

use serde::Serialize;

use super::report::{Entry, Report};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    /// Text changed.
    Changed,
    /// Same text, different status (e.g. became unavailable).
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub section: String,
    pub label: String,
    pub kind: ChangeKind,
}

pub fn compare(old: &Report, new: &Report) -> Vec<Change> {
    let mut changes = Vec::new();

    for section in &new.sections {
        let previous = old.section(&section.title);
        for entry in &section.entries {
            let before = previous.and_then(|s| s.entry(&entry.label));
            if let Some(kind) = classify(before, entry) {
                changes.push(Change {
                    section: section.title.clone(),
                    label: entry.label.clone(),
                    kind,
                });
            }
        }
    }

    for section in &old.sections {
        let current = new.section(&section.title);
        for entry in &section.entries {
            if current.and_then(|s| s.entry(&entry.label)).is_none() {
                changes.push(Change {
                    section: section.title.clone(),
                    label: entry.label.clone(),
                    kind: ChangeKind::Removed,
                });
            }
        }
    }

    changes
}

fn classify(before: Option<&Entry>, after: &Entry) -> Option<ChangeKind> {
    let before = match before {
        Some(b) => b,
        None => return Some(ChangeKind::Added),
    };
    if before.text != after.text {
        Some(ChangeKind::Changed)
    } else if before.status != after.status {
        Some(ChangeKind::Status)
    } else {
        None
    }
}
