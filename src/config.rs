use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::collector::CollectorOptions;
use crate::domain::elevation::ElevationMode;
use crate::domain::executor::DEFAULT_MAX_OUTPUT_BYTES;

/// Environment variables override the file: `HOSTSCAN_LOG_LEVEL`,
/// `HOSTSCAN_COLLECTOR__MAX_PARALLEL`, ...
const ENV_PREFIX: &str = "HOSTSCAN_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub collector: CollectorConfig,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".into(),
            collector: CollectorConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Per-invocation timeout for probe commands.
    pub command_timeout_secs: u64,
    /// Bound on the whole run.
    pub deadline_secs: u64,
    /// Sections probed concurrently; 1 means strictly sequential.
    pub max_parallel: usize,
    pub max_output_bytes: usize,
    pub elevation: ElevationMode,
    /// Section titles left out of every run.
    pub skip_sections: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 10,
            deadline_secs: 120,
            max_parallel: 1,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            elevation: ElevationMode::Auto,
            skip_sections: Vec::new(),
        }
    }
}

impl CollectorConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    pub fn options(&self) -> CollectorOptions {
        CollectorOptions {
            deadline: Duration::from_secs(self.deadline_secs.max(1)),
            max_parallel: self.max_parallel.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where `report --save` writes and `report --cached` reads.
    pub cache_file: String,
    /// `report --cached` refuses snapshots older than this; 0 disables the
    /// check.
    pub max_age_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let path = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("hostscan")
            .join("last-report.json");
        Self {
            cache_file: path.to_string_lossy().to_string(),
            max_age_secs: 24 * 60 * 60,
        }
    }
}

impl StoreConfig {
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs))
    }
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("hostscan").join("config.yaml"))
    }
}

/// Defaults, then the YAML file (custom path or default location; a missing
/// file is fine), then `HOSTSCAN_*` environment variables.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::path()?,
    };

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(&path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .with_context(|| format!("loading configuration ({})", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|_jail| {
            let cfg = load(Some(Path::new("absent.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(cfg.log_level, "warn");
            assert_eq!(cfg.collector.max_parallel, 1);
            assert_eq!(cfg.collector.elevation, ElevationMode::Auto);
            assert!(cfg.store.cache_file.ends_with("last-report.json"));
            assert_eq!(cfg.store.max_age(), Some(Duration::from_secs(86400)));
            Ok(())
        });
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hostscan.yaml",
                r#"
log_level: info
collector:
  deadline_secs: 30
  max_parallel: 2
  elevation: never
  skip_sections: [Containers]
"#,
            )?;
            jail.set_env("HOSTSCAN_COLLECTOR__MAX_PARALLEL", "6");

            let cfg = load(Some(Path::new("hostscan.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(cfg.log_level, "info");
            assert_eq!(cfg.collector.deadline_secs, 30);
            assert_eq!(cfg.collector.max_parallel, 6);
            assert_eq!(cfg.collector.elevation, ElevationMode::Never);
            assert_eq!(cfg.collector.skip_sections, vec!["Containers".to_string()]);
            assert_eq!(cfg.collector.command_timeout_secs, 10);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_errors() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.yaml", "collector:\n  elevation: always\n")?;
            assert!(load(Some(Path::new("bad.yaml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn zero_max_age_disables_the_staleness_check() {
        Jail::expect_with(|jail| {
            jail.set_env("HOSTSCAN_STORE__MAX_AGE_SECS", "0");
            let cfg = load(Some(Path::new("absent.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(cfg.store.max_age(), None);
            Ok(())
        });
    }

    #[test]
    fn options_never_zero() {
        let collector = CollectorConfig {
            deadline_secs: 0,
            max_parallel: 0,
            command_timeout_secs: 0,
            ..CollectorConfig::default()
        };
        let options = collector.options();
        assert_eq!(options.max_parallel, 1);
        assert_eq!(options.deadline, Duration::from_secs(1));
        assert_eq!(collector.command_timeout(), Duration::from_secs(1));
    }
}
