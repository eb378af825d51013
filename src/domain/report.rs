//! Host report: the ordered, immutable result of one collection run.
//!
//! Shape: Report → sections → (label, text) entries. The shape is the same on
//! every host regardless of which tools are installed, so two snapshots can be
//! diffed section by section.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Ok,
    /// The source ran and legitimately had nothing to say.
    Empty,
    /// Resolved, but only through an unprivileged fallback of a probe that
    /// prefers elevation; some detail may be hidden.
    Limited,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub label: String,
    pub status: EntryStatus,
    pub text: String,
    /// Command or file that produced the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Why the entry is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Entry {
    pub fn resolved(
        label: &str,
        status: EntryStatus,
        text: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            label: label.to_string(),
            status,
            text: text.into(),
            method: Some(method.into()),
            note: None,
        }
    }

    pub fn unavailable(label: &str, reason: Option<ProbeError>) -> Self {
        Self {
            label: label.to_string(),
            status: EntryStatus::Unavailable,
            text: String::new(),
            method: None,
            note: reason.map(|r| r.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status != EntryStatus::Unavailable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionResult {
    pub title: String,
    pub entries: Vec<Entry>,
}

impl SectionResult {
    pub fn entry(&self, label: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn all_unavailable(&self) -> bool {
        self.entries.iter().all(|e| !e.is_available())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub hostname: String,
    pub collector_version: String,
    pub generated_at_start: DateTime<Utc>,
    pub generated_at_end: DateTime<Utc>,
    /// The run deadline fired before every source resolved.
    pub truncated: bool,
    pub sections: Vec<SectionResult>,
}

impl Report {
    pub fn section(&self, title: &str) -> Option<&SectionResult> {
        self.sections.iter().find(|s| s.title == title)
    }

    /// Hash of everything except the timestamps. Two runs against an
    /// unchanged host produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let content = (&self.hostname, self.truncated, &self.sections);
        let serialized = serde_json::to_string(&content).unwrap_or_default();
        format!("sha256:{:x}", Sha256::digest(serialized.as_bytes()))
    }

    /// (available, total) entry counts.
    pub fn coverage(&self) -> (usize, usize) {
        let entries = self.sections.iter().flat_map(|s| &s.entries);
        let total = entries.clone().count();
        let available = entries.filter(|e| e.is_available()).count();
        (available, total)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.generated_at_end - self.generated_at_start).num_milliseconds() as f64 / 1000.0
    }
}

/// A report wrapped with integrity metadata for storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReport {
    /// SHA-256 checksum of the serialized report: "sha256:<hex>"
    pub checksum: String,
    /// Version of the collector that stored the report.
    pub collector_version: String,
    pub report: Report,
}

impl StoredReport {
    pub fn new(report: Report) -> Self {
        Self {
            checksum: checksum(&report),
            collector_version: env!("CARGO_PKG_VERSION").to_string(),
            report,
        }
    }

    /// Seconds since the report finished collecting.
    pub fn age_secs(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.report.generated_at_end)
            .num_seconds()
    }

    /// Verify the checksum matches the report data.
    pub fn verify(&self) -> bool {
        self.checksum == checksum(&self.report)
    }
}

fn checksum(report: &Report) -> String {
    let serialized = serde_json::to_string(report).unwrap_or_default();
    format!("sha256:{:x}", Sha256::digest(serialized.as_bytes()))
}
