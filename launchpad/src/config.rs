//! Configuration loader for the launchpad calculators.
//!
//! Layers (highest precedence last):
//!   1) Built-in defaults
//!   2) Config file (explicit path or auto-discovered)
//!   3) Environment variables (optionally via .env)
//!
//! Env prefix is `DECENTRAMIND`, nested keys separated by `__`:
//!   DECENTRAMIND__STAKING__BASE_APY=1500
//!   DECENTRAMIND__STAKING__LOCK_PERIOD=90days
//!   DECENTRAMIND__VESTING__ALIGNMENT=grid

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config as cfg;
use directories::ProjectDirs;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::staking::StakingParams;
use crate::vesting::UnlockAlignment;
use crate::{Amount, Bps};

/// Application config (validated).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub staking: Staking,
    pub vesting: VestingOptions,
    pub telemetry: Telemetry,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct App {
    pub name: String,
    /// "prod" | "staging" | "dev".
    pub environment: String,
}

/// Staking programme as configured. The minimum stake is kept to 64 bits
/// here since file and env sources carry plain integers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Staking {
    pub base_apy: Bps,
    pub max_apy: Bps,
    pub min_stake_amount: u64,
    #[serde(with = "humantime_serde")]
    pub lock_period: Duration,
    #[serde(with = "humantime_serde")]
    pub reward_interval: Duration,
    pub early_exit_penalty: Bps,
    pub early_exit_reward_share: Bps,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VestingOptions {
    pub alignment: UnlockAlignment,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    /// EnvFilter directives, e.g. "info,launchpad=debug".
    pub log_filter: String,
    /// Emit JSON lines instead of text.
    pub json: bool,
}

impl Default for App {
    fn default() -> Self {
        Self {
            name: "launchpad-calc".into(),
            environment: "prod".into(),
        }
    }
}

impl Default for Staking {
    fn default() -> Self {
        StakingParams::default().into()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            json: false,
        }
    }
}

impl From<StakingParams> for Staking {
    fn from(p: StakingParams) -> Self {
        Self {
            base_apy: p.base_apy,
            max_apy: p.max_apy,
            min_stake_amount: u64::try_from(p.min_stake_amount).unwrap_or(u64::MAX),
            lock_period: p.lock_period,
            reward_interval: p.reward_interval,
            early_exit_penalty: p.early_exit_penalty,
            early_exit_reward_share: p.early_exit_reward_share,
        }
    }
}

impl Staking {
    pub fn params(&self) -> StakingParams {
        StakingParams {
            base_apy: self.base_apy,
            max_apy: self.max_apy,
            min_stake_amount: Amount::from(self.min_stake_amount),
            lock_period: self.lock_period,
            reward_interval: self.reward_interval,
            early_exit_penalty: self.early_exit_penalty,
            early_exit_reward_share: self.early_exit_reward_share,
        }
    }
}

/// Errors during configuration loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] cfg::ConfigError),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("path not found `{0}`")]
    PathNotFound(String),
}

/// Load configuration: defaults -> file(s) -> environment.
pub fn load(explicit_file: Option<&Path>) -> Result<Config, ConfigError> {
    // no-op if absent
    let _ = dotenv();

    let d = Config::default();
    let mut builder = cfg::Config::builder()
        .set_default("app.name", d.app.name.clone())?
        .set_default("app.environment", d.app.environment.clone())?
        .set_default("staking.base_apy", i64::from(d.staking.base_apy.get()))?
        .set_default("staking.max_apy", i64::from(d.staking.max_apy.get()))?
        .set_default("staking.min_stake_amount", d.staking.min_stake_amount)?
        .set_default("staking.lock_period", "30days")?
        .set_default("staking.reward_interval", "1day")?
        .set_default("staking.early_exit_penalty", i64::from(d.staking.early_exit_penalty.get()))?
        .set_default(
            "staking.early_exit_reward_share",
            i64::from(d.staking.early_exit_reward_share.get()),
        )?
        .set_default("vesting.alignment", "drifting")?
        .set_default("telemetry.log_filter", d.telemetry.log_filter.clone())?
        .set_default("telemetry.json", d.telemetry.json)?;

    for path in discover_config_files(explicit_file)? {
        builder = builder.add_source(cfg::File::from(path));
    }

    // DECENTRAMIND__STAKING__BASE_APY -> staking.base_apy
    builder = builder.add_source(
        cfg::Environment::with_prefix("DECENTRAMIND")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: Config = builder.build()?.try_deserialize()?;
    validate_and_normalize(&mut cfg)?;
    Ok(cfg)
}

/// Discover config files in precedence order:
/// - explicit path if provided
/// - $XDG_CONFIG_HOME/launchpad/config.{yaml,yml,toml,json}
/// - ./launchpad.{yaml,yml,toml,json}
fn discover_config_files(explicit: Option<&Path>) -> Result<Vec<PathBuf>, ConfigError> {
    if let Some(p) = explicit {
        if p.exists() {
            return Ok(vec![p.to_path_buf()]);
        }
        return Err(ConfigError::PathNotFound(p.display().to_string()));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(pd) = ProjectDirs::from("io", "DecentraMind", "launchpad") {
        let cd = pd.config_dir();
        for ext in ["yaml", "yml", "toml", "json"] {
            candidates.push(cd.join(format!("config.{ext}")));
        }
    }
    for ext in ["yaml", "yml", "toml", "json"] {
        candidates.push(PathBuf::from(format!("launchpad.{ext}")));
    }

    Ok(candidates.into_iter().filter(|c| c.exists()).collect())
}

fn validate_and_normalize(cfg: &mut Config) -> Result<(), ConfigError> {
    cfg.app.environment = cfg.app.environment.trim().to_ascii_lowercase();
    if !matches!(cfg.app.environment.as_str(), "prod" | "staging" | "dev") {
        return Err(ConfigError::Invalid {
            key: "app.environment",
            reason: format!("unknown environment `{}`", cfg.app.environment),
        });
    }

    cfg.staking.params().validate().map_err(|e| ConfigError::Invalid {
        key: "staking",
        reason: e.to_string(),
    })?;

    cfg.telemetry.log_filter = cfg.telemetry.log_filter.trim().to_string();
    EnvFilter::try_new(&cfg.telemetry.log_filter).map_err(|e| ConfigError::Invalid {
        key: "telemetry.log_filter",
        reason: e.to_string(),
    })?;
    Ok(())
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) base_apy={} lock={} alignment={:?}",
            self.app.name,
            self.app.environment,
            self.staking.base_apy,
            humantime_serde::re::humantime::format_duration(self.staking.lock_period),
            self.vesting.alignment,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let mut cfg = Config::default();
        assert!(validate_and_normalize(&mut cfg).is_ok());
        assert_eq!(cfg.staking.params(), StakingParams::default());
        assert_eq!(cfg.vesting.alignment, UnlockAlignment::Drifting);
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let err = load(Some(Path::new("/definitely/not/here/launchpad.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::PathNotFound(_)));
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("launchpad-cfg-{}.toml", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[staking]\nbase_apy = 1500\nlock_period = \"90days\"\n\n[vesting]\nalignment = \"grid\"\n"
        )
        .unwrap();
        drop(f);

        let cfg = load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.staking.base_apy, Bps(1_500));
        assert_eq!(cfg.staking.lock_period, Duration::from_secs(90 * 86_400));
        assert_eq!(cfg.staking.max_apy, Bps(2_500));
        assert_eq!(cfg.vesting.alignment, UnlockAlignment::Grid);
    }

    #[test]
    fn invalid_values_rejected() {
        let mut cfg = Config::default();
        cfg.staking.base_apy = Bps(3_000);
        assert!(matches!(
            validate_and_normalize(&mut cfg),
            Err(ConfigError::Invalid { key: "staking", .. })
        ));

        let mut cfg = Config::default();
        cfg.app.environment = " Dev ".into();
        assert!(validate_and_normalize(&mut cfg).is_ok());
        assert_eq!(cfg.app.environment, "dev");
        cfg.app.environment = "moon".into();
        assert!(validate_and_normalize(&mut cfg).is_err());
    }
}
