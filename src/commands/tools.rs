//! `hostscan tools`: which probe tools and files this host offers.

use std::collections::BTreeSet;

use anyhow::Result;
use colored::Colorize;

use crate::domain::capability::{CapabilityProbe, HostCapabilities};
use crate::domain::catalog;
use crate::domain::collector::Section;
use crate::domain::elevation::{self, ElevationMode};
use crate::platform;

pub fn run(mode: ElevationMode) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let elevated = rt.block_on(async { elevation::from_mode(mode).available().await });

    let caps = HostCapabilities::new();
    for name in requirements(&catalog::default_plan()) {
        caps.has(&name);
    }
    let snapshot = caps.snapshot();
    let present = snapshot.iter().filter(|(_, found)| *found).count();

    let width = snapshot.iter().map(|(name, _)| name.len()).max().unwrap_or(0) + 1;
    println!("{}", "hostscan tools".bold());
    for (name, found) in &snapshot {
        let label = format!("{}:", name);
        if *found {
            println!("  {:<width$} {}", label, "found".green(), width = width);
        } else {
            println!("  {:<width$} {}", label, "missing".red(), width = width);
        }
    }
    println!();
    println!("  {}/{} available", present, snapshot.len());

    let status = if platform::is_root() {
        "running as root".green()
    } else if elevated {
        "passwordless sudo".green()
    } else {
        "unavailable".yellow()
    };
    println!("  Elevation: {}", status);
    Ok(())
}

/// Every distinct tool or path any candidate in `plan` depends on.
fn requirements(plan: &[Section]) -> BTreeSet<String> {
    plan.iter()
        .flat_map(|s| &s.sources)
        .flat_map(|s| &s.candidates)
        .flat_map(|c| c.requires.iter().cloned())
        .collect()
}
