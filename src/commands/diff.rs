//! `hostscan diff OLD NEW`: compare two saved snapshots.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;

use crate::domain::diff::{self, Change, ChangeKind};
use crate::domain::report_store::ReportStore;
use crate::render::Format;

pub fn run(old: PathBuf, new: PathBuf, format: &str) -> Result<()> {
    let format: Format = format.parse()?;
    let rt = tokio::runtime::Runtime::new()?;
    let (old, new) = rt.block_on(async {
        let old = ReportStore::new(old).read().await?;
        let new = ReportStore::new(new).read().await?;
        anyhow::Ok((old.report, new.report))
    })?;

    let changes = if old.fingerprint() == new.fingerprint() {
        Vec::new()
    } else {
        diff::compare(&old, &new)
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&changes)?),
        Format::Yaml => print!("{}", serde_yaml::to_string(&changes)?),
        Format::Text => print!("{}", describe(&changes)),
    }
    Ok(())
}

fn describe(changes: &[Change]) -> String {
    if changes.is_empty() {
        return format!("{}\n", "No changes".green());
    }
    let mut out = String::new();
    for change in changes {
        let marker = match change.kind {
            ChangeKind::Added => "+".green(),
            ChangeKind::Removed => "-".red(),
            ChangeKind::Changed => "~".yellow(),
            ChangeKind::Status => "!".cyan(),
        };
        let suffix = if change.kind == ChangeKind::Status {
            " (status)"
        } else {
            ""
        };
        out.push_str(&format!(
            "{} {} / {}{}\n",
            marker, change.section, change.label, suffix
        ));
    }
    out
}
