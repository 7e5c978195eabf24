//! Engine configuration
//!
//! Every empirically chosen threshold in the engine is surfaced here as
//! a tunable with the shipped defaults, persisted as TOML under the
//! user's home directory. Loading falls back to defaults when no file
//! exists; saving writes the full tree so the file documents every
//! available knob.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::baseline::BaselineConfig;
use crate::error::{Result, VeloError};
use crate::logging::LogConfig;
use crate::models::ProviderKind;
use crate::pmc::PmcConfig;
use crate::recovery::RecoveryConfig;
use crate::sleep::SleepConfig;
use crate::trimp::TrimpConfig;
use crate::wellness::WellnessConfig;
use crate::zones::ZoneConfig;

/// Provider chain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Sources in fallback priority order
    pub priority: Vec<ProviderKind>,

    /// Per-fetch timeout in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            priority: vec![
                ProviderKind::Intervals,
                ProviderKind::Strava,
                ProviderKind::HealthKit,
            ],
            fetch_timeout_secs: 30,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub baseline: BaselineConfig,
    pub trimp: TrimpConfig,
    pub pmc: PmcConfig,
    pub sleep: SleepConfig,
    pub wellness: WellnessConfig,
    pub recovery: RecoveryConfig,
    pub zones: ZoneConfig,
    pub providers: ProviderConfig,
    pub log: LogConfig,

    /// Athlete's fixed UTC offset in minutes, used for calendar-day
    /// bucketing
    pub tz_offset_minutes: i32,

    /// Store path; None uses the default location
    pub store_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Default config directory (~/.veloscore)
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".veloscore")
    }

    /// Default config file path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Resolved store path
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("veloscore.db"))
    }

    /// Athlete timezone as a chrono offset
    pub fn tz(&self) -> chrono::FixedOffset {
        chrono::FixedOffset::east_opt(self.tz_offset_minutes * 60)
            .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).expect("UTC offset"))
    }

    /// Load from the default path, or defaults when no file exists
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from an explicit path, or defaults when no file exists
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)
            .map_err(|e| VeloError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default path
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| VeloError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Sanity-check the tunables
    pub fn validate(&self) -> Result<()> {
        let recovery_weights = self.recovery.hrv_weight
            + self.recovery.sleep_weight
            + self.recovery.rhr_weight
            + self.recovery.respiratory_weight
            + self.recovery.tsb_weight;
        if (recovery_weights - 1.0).abs() > 0.01 {
            return Err(VeloError::Config(format!(
                "recovery weights must sum to 1.0, got {:.3}",
                recovery_weights
            )));
        }

        let sleep_weights = self.sleep.performance_weight
            + self.sleep.quality_weight
            + self.sleep.efficiency_weight
            + self.sleep.disturbances_weight
            + self.sleep.consistency_weight;
        if (sleep_weights - 1.0).abs() > 0.01 {
            return Err(VeloError::Config(format!(
                "sleep weights must sum to 1.0, got {:.3}",
                sleep_weights
            )));
        }

        if !(0.0..=1.0).contains(&self.trimp.assumed_intensity) {
            return Err(VeloError::Config(
                "trimp.assumed_intensity must be within 0..=1".to_string(),
            ));
        }

        if self.pmc.ctl_days == 0 || self.pmc.atl_days == 0 {
            return Err(VeloError::Config(
                "pmc time constants must be positive".to_string(),
            ));
        }

        if self.providers.priority.is_empty() {
            return Err(VeloError::Config(
                "at least one provider must be configured".to_string(),
            ));
        }

        if self.zones.lookback_days > self.zones.max_lookback_days {
            return Err(VeloError::Config(format!(
                "zones.lookback_days {} exceeds the {}-day ceiling",
                self.zones.lookback_days, self.zones.max_lookback_days
            )));
        }

        Ok(())
    }
}
