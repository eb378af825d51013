//! `hostscan sections`: print the section plan and every candidate chain.

use anyhow::Result;
use colored::Colorize;

use crate::domain::catalog;
use crate::domain::collector::Section;
use crate::domain::source::{Candidate, Elevation};

pub fn run() -> Result<()> {
    print!("{}", describe(&catalog::default_plan()));
    Ok(())
}

fn describe(plan: &[Section]) -> String {
    let mut out = String::new();
    for (i, section) in plan.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{}\n", section.title.bold()));
        for source in &section.sources {
            out.push_str(&format!("  {}\n", source.label.green()));
            for (n, candidate) in source.candidates.iter().enumerate() {
                out.push_str(&format!(
                    "    {}. {}{}\n",
                    n + 1,
                    candidate.method,
                    annotations(candidate).dimmed()
                ));
            }
        }
    }
    out
}

fn annotations(candidate: &Candidate) -> String {
    let mut tags = Vec::new();
    match candidate.elevation {
        Elevation::None => {}
        Elevation::Optional => tags.push("elevated if possible"),
        Elevation::Mandatory => tags.push("root only"),
    }
    if candidate.accept_empty {
        tags.push("empty ok");
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!("  ({})", tags.join(", "))
    }
}
