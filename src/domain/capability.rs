//! Capability probe: "is tool or file X available on this host?"
//!
//! Host state is assumed stable for the duration of a run, so every answer is
//! memoized by name for the lifetime of the probe instance. One instance is
//! created per run and handed to the collector explicitly.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::tools;

pub trait CapabilityProbe: Send + Sync {
    /// Names beginning with `/` are filesystem paths, anything else is an
    /// executable looked up on the search path. Absence is `false`, never an
    /// error.
    fn has(&self, name: &str) -> bool;
}

#[derive(Default)]
pub struct HostCapabilities {
    cache: Mutex<HashMap<String, bool>>,
}

impl HostCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every name queried so far with its answer, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(String, bool)> =
            cache.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort();
        entries
    }

    fn detect(name: &str) -> bool {
        if name.starts_with('/') {
            Path::new(name).exists()
        } else {
            tools::find(name).is_some()
        }
    }
}

impl CapabilityProbe for HostCapabilities {
    fn has(&self, name: &str) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(present) = cache.get(name) {
            return *present;
        }
        let present = Self::detect(name);
        debug!(capability = name, present, "capability probed");
        cache.insert(name.to_string(), present);
        present
    }
}

/// A fixed capability set, for deterministic runs against a fake host.
#[cfg(test)]
pub struct FixedCapabilities(std::collections::HashSet<String>);

#[cfg(test)]
impl FixedCapabilities {
    pub fn new<I, S>(present: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(present.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
impl CapabilityProbe for FixedCapabilities {
    fn has(&self, name: &str) -> bool {
        self.0.contains(name)
    }
}
