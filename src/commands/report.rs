//! `hostscan report`: collect (or load) a snapshot and render it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use crate::config::{CollectorConfig, Config};
use crate::domain::capability::HostCapabilities;
use crate::domain::catalog;
use crate::domain::collector::{Collector, Section};
use crate::domain::elevation;
use crate::domain::executor::ShellExecutor;
use crate::domain::report::{Report, StoredReport};
use crate::domain::report_store::ReportStore;
use crate::domain::source::ProbeContext;
use crate::platform::{self, Os};
use crate::render::{self, Format};

#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Output format (text, json or yaml)
    #[arg(long)]
    pub format: Option<String>,

    /// Overall run deadline in seconds (overrides config)
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Per-command timeout in seconds (overrides config)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Number of sections probed concurrently (overrides config)
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Elevation mode: auto, sudo or never (overrides config)
    #[arg(long)]
    pub elevation: Option<String>,

    /// Only collect these sections (repeatable, case-insensitive)
    #[arg(long, value_name = "SECTION")]
    pub only: Vec<String>,

    /// Skip these sections (repeatable, case-insensitive)
    #[arg(long, value_name = "SECTION")]
    pub skip: Vec<String>,

    /// Write the snapshot to the cache file after collecting
    #[arg(long)]
    pub save: bool,

    /// Render the last saved snapshot instead of collecting
    #[arg(long, conflicts_with = "save")]
    pub cached: bool,
}

pub fn run(args: &ReportArgs, cfg: Config) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(args, cfg))
}

async fn run_async(args: &ReportArgs, mut cfg: Config) -> Result<()> {
    let format: Format = args.format.as_deref().unwrap_or("text").parse()?;
    apply_overrides(args, &mut cfg.collector)?;
    let store = ReportStore::new(PathBuf::from(&cfg.store.cache_file));

    let report = if args.cached {
        let stored = store.read_fresh(cfg.store.max_age()).await?;
        info!(
            path = %store.path().display(),
            age_secs = stored.age_secs(),
            "rendering cached report"
        );
        stored.report
    } else {
        if platform::os() != Os::Linux {
            warn!(os = %platform::os(), "section plan targets Linux, most sources will be unavailable");
        }
        let mut skip = cfg.collector.skip_sections.clone();
        skip.extend(args.skip.iter().cloned());
        let plan = catalog::filter(catalog::default_plan(), &args.only, &skip)?;
        collect(&cfg.collector, &plan).await
    };

    let mut out = render::render(&report, format)?;
    if !out.ends_with('\n') {
        out.push('\n');
    }
    print!("{}", out);

    if args.save {
        match store.write(&StoredReport::new(report)).await {
            Ok(()) => info!(path = %store.path().display(), "report saved"),
            Err(e) => warn!(error = %e, "failed to save report"),
        }
    }

    Ok(())
}

fn apply_overrides(args: &ReportArgs, collector: &mut CollectorConfig) -> Result<()> {
    if let Some(deadline) = args.deadline {
        collector.deadline_secs = deadline;
    }
    if let Some(timeout) = args.timeout {
        collector.command_timeout_secs = timeout;
    }
    if let Some(parallel) = args.parallel {
        collector.max_parallel = parallel;
    }
    if let Some(mode) = &args.elevation {
        collector.elevation = mode.parse()?;
    }
    Ok(())
}

/// Wire the real host collaborators and run `plan` once.
pub async fn collect(cfg: &CollectorConfig, plan: &[Section]) -> Report {
    let elevation = elevation::from_mode(cfg.elevation);
    let ctx = ProbeContext {
        capabilities: Arc::new(HostCapabilities::new()),
        executor: Arc::new(ShellExecutor::new(elevation.clone(), cfg.max_output_bytes)),
        elevation,
        default_timeout: cfg.command_timeout(),
    };
    Collector::new(ctx, cfg.options()).run(plan).await
}
