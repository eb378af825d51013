//! Report rendering: aligned text, JSON, YAML.

use std::fmt::Write as _;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::domain::report::{Entry, EntryStatus, Report};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
    Yaml,
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" | "table" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            "yaml" => Ok(Format::Yaml),
            other => bail!("unknown format '{}' (expected 'text', 'json' or 'yaml')", other),
        }
    }
}

pub fn render(report: &Report, format: Format) -> Result<String> {
    match format {
        Format::Text => Ok(text(report)),
        Format::Json => serde_json::to_string_pretty(report).context("serializing report as JSON"),
        Format::Yaml => serde_yaml::to_string(report).context("serializing report as YAML"),
    }
}

fn text(report: &Report) -> String {
    let mut out = String::new();
    let (available, total) = report.coverage();

    let _ = writeln!(out, "{}", "═══ Host Inventory ═══".cyan().bold());
    let _ = writeln!(out, "  Hostname:   {}", report.hostname.bold());
    let _ = writeln!(out, "  Started:    {}", report.generated_at_start.to_rfc3339());
    let _ = writeln!(out, "  Finished:   {}", report.generated_at_end.to_rfc3339());
    let _ = writeln!(out, "  Collector:  {}", report.collector_version);
    let _ = writeln!(out, "  Coverage:   {}/{} sources", available, total);
    if report.truncated {
        let _ = writeln!(
            out,
            "  {}",
            "Run deadline exceeded; report is partial".red().bold()
        );
    }

    let width = report
        .sections
        .iter()
        .flat_map(|s| &s.entries)
        .map(|e| e.label.len())
        .max()
        .unwrap_or(0);

    for section in &report.sections {
        let _ = writeln!(out);
        let mut header = format!("── {} ──", section.title).yellow().to_string();
        if section.all_unavailable() {
            header.push_str(&format!(" {}", "nothing available".dimmed()));
        }
        let _ = writeln!(out, "{}", header);
        for entry in &section.entries {
            write_entry(&mut out, entry, width);
        }
    }
    out
}

fn write_entry(out: &mut String, entry: &Entry, width: usize) {
    let label = format!("{:<width$}", entry.label, width = width);
    match entry.status {
        EntryStatus::Unavailable => {
            let reason = entry.note.as_deref().unwrap_or("no method succeeded");
            let _ = writeln!(
                out,
                "  {}  {}",
                label.bold(),
                format!("unavailable ({})", reason).dimmed()
            );
        }
        EntryStatus::Empty => {
            let _ = writeln!(out, "  {}  {}", label.bold(), "(none)".dimmed());
        }
        EntryStatus::Ok | EntryStatus::Limited => {
            let source = entry.method.as_deref().unwrap_or_default();
            let mut header = format!("  {}  {}", label.bold(), format!("[{}]", source).dimmed());
            if entry.status == EntryStatus::Limited {
                header.push_str(&format!(" {}", "permission-limited".yellow()));
            }
            let _ = writeln!(out, "{}", header);
            for line in entry.text.lines() {
                let _ = writeln!(out, "    {}", line);
            }
        }
    }
}
