//! Collector: runs a section plan and assembles the report.
//!
//! Sections run sequentially by default. With `max_parallel > 1` they run on a
//! bounded pool. Either way every resolved entry is written into a slot
//! indexed by (section, source), so the report is assembled in plan order no
//! matter what finished first. The whole run is bounded by a deadline; slots
//! still empty when it fires become `unavailable` and the report is flagged
//! as truncated.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::error::ProbeError;
use super::report::{Entry, Report, SectionResult};
use super::source::{DataSource, ProbeContext};

#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub sources: Vec<DataSource>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sources: Vec::new(),
        }
    }

    pub fn source(mut self, source: DataSource) -> Self {
        self.sources.push(source);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub deadline: Duration,
    pub max_parallel: usize,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(120),
            max_parallel: 1,
        }
    }
}

type Slots = Arc<Mutex<Vec<Vec<Option<Entry>>>>>;

pub struct Collector {
    ctx: Arc<ProbeContext>,
    options: CollectorOptions,
}

impl Collector {
    pub fn new(ctx: ProbeContext, options: CollectorOptions) -> Self {
        Self {
            ctx: Arc::new(ctx),
            options,
        }
    }

    pub async fn run(&self, plan: &[Section]) -> Report {
        let started = Utc::now();
        info!(
            sections = plan.len(),
            max_parallel = self.options.max_parallel,
            deadline_secs = self.options.deadline.as_secs(),
            "collection started"
        );

        let slots: Slots = Arc::new(Mutex::new(
            plan.iter().map(|s| vec![None; s.sources.len()]).collect(),
        ));

        let work = self.resolve_all(plan, slots.clone());
        let truncated = tokio::time::timeout(self.options.deadline, work)
            .await
            .is_err();
        if truncated {
            warn!(
                deadline_secs = self.options.deadline.as_secs(),
                "run deadline exceeded, assembling partial report"
            );
        }

        let filled = std::mem::take(&mut *slots.lock().unwrap_or_else(PoisonError::into_inner));
        let sections: Vec<SectionResult> = plan
            .iter()
            .zip(filled)
            .map(|(section, entries)| SectionResult {
                title: section.title.clone(),
                entries: section
                    .sources
                    .iter()
                    .zip(entries)
                    .map(|(source, entry)| {
                        entry.unwrap_or_else(|| {
                            let reason = if truncated {
                                ProbeError::DeadlineExceeded
                            } else {
                                ProbeError::Aborted
                            };
                            Entry::unavailable(&source.label, Some(reason))
                        })
                    })
                    .collect(),
            })
            .collect();

        let report = Report {
            hostname: gethostname(),
            collector_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at_start: started,
            generated_at_end: Utc::now(),
            truncated,
            sections,
        };

        let (available, total) = report.coverage();
        info!(
            available,
            total,
            truncated,
            duration_secs = report.duration_secs(),
            "collection finished"
        );
        report
    }

    async fn resolve_all(&self, plan: &[Section], slots: Slots) {
        if self.options.max_parallel <= 1 {
            for (index, section) in plan.iter().enumerate() {
                resolve_section(&self.ctx, index, section, &slots).await;
            }
            return;
        }

        let permits = Arc::new(Semaphore::new(self.options.max_parallel));
        let mut tasks = JoinSet::new();
        for (index, section) in plan.iter().enumerate() {
            let ctx = self.ctx.clone();
            let section = section.clone();
            let slots = slots.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                resolve_section(&ctx, index, &section, &slots).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "section task failed");
            }
        }
    }
}

async fn resolve_section(ctx: &ProbeContext, index: usize, section: &Section, slots: &Slots) {
    for (position, source) in section.sources.iter().enumerate() {
        let entry = source.resolve(ctx).await;
        let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots[index][position] = Some(entry);
    }
}

fn gethostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".into())
}
