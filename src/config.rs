use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::recurrence::DEFAULT_RESET_HOUR;
use crate::scheduler::TimeBudget;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Minutes, or "all".
    pub default_budget: Option<String>,
    /// Hour of the daily recurrence checkpoint, local time.
    pub reset_hour: Option<u32>,
}

impl Config {
    /// Load config from `$SWEEP_CONFIG` or `~/.sweep/config.toml`.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(&crate::paths::config_path()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(hour) = self.session.reset_hour {
            if hour > 23 {
                bail!(
                    "failed to parse {}: session.reset_hour must be 0..=23, got {hour}",
                    path.display()
                );
            }
        }
        if let Some(budget) = &self.session.default_budget {
            TimeBudget::parse(budget).with_context(|| {
                format!("failed to parse {}: session.default_budget", path.display())
            })?;
        }
        Ok(())
    }

    pub fn reset_hour(&self) -> u32 {
        self.session.reset_hour.unwrap_or(DEFAULT_RESET_HOUR)
    }

    /// Budget used when a session is started without `--budget`.
    pub fn default_budget(&self) -> TimeBudget {
        self.session
            .default_budget
            .as_deref()
            .and_then(|b| TimeBudget::parse(b).ok())
            .unwrap_or(TimeBudget::Minutes(30))
    }
}
