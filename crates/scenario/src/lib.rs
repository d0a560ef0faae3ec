#![deny(warnings)]

//! Game configuration: embedded YAML defaults, file overrides, rate
//! profiles and the process-wide event card catalog.

mod embedded;

pub use embedded::get_yaml;

use destiny_core::{validate_capital, EventCard, EventCatalog, ValidationError};
use destiny_econ::{EconError, RateProfile};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable that overrides the configured admin secret.
pub const ADMIN_SECRET_ENV: &str = "DESTINY_ADMIN_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid yaml: {0}")]
    Yaml(String),
    #[error("missing embedded asset: {0}")]
    MissingAsset(&'static str),
    #[error("unknown rate profile: {0}")]
    UnknownProfile(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Econ(#[from] EconError),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Yaml(e.to_string())
    }
}

/// Either a built-in profile by name or an inline custom profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileChoice {
    Named(String),
    Custom(RateProfile),
}

impl Default for ProfileChoice {
    fn default() -> Self {
        ProfileChoice::Named("volatile".to_string())
    }
}

/// Where finished games are recorded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordsConfig {
    Csv { path: PathBuf },
    Sqlite { url: String },
}

impl Default for RecordsConfig {
    fn default() -> Self {
        RecordsConfig::Csv {
            path: PathBuf::from("./saves/game_records.csv"),
        }
    }
}

fn default_capital() -> f64 {
    destiny_core::DEFAULT_STARTING_CAPITAL
}

fn default_secret() -> String {
    "tsts".to_string()
}

/// Top-level game configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameConfig {
    #[serde(default = "default_capital")]
    pub starting_capital: f64,
    #[serde(default)]
    pub profile: ProfileChoice,
    /// Fixed RNG seed for reproducible runs; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Replacement event card catalog (YAML list).
    #[serde(default)]
    pub cards_path: Option<PathBuf>,
    #[serde(default = "default_secret")]
    pub admin_secret: String,
    #[serde(default)]
    pub records: RecordsConfig,
}

impl GameConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: GameConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The configuration shipped with the game.
    pub fn embedded_default() -> Result<Self, ConfigError> {
        let text = get_yaml("default_config").ok_or(ConfigError::MissingAsset("default_config"))?;
        Self::from_yaml(text)
    }

    /// Load from `path` (or the embedded default) and apply the
    /// environment override for the admin secret.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => {
                info!(path = %p.display(), "loading game config");
                Self::from_yaml(&fs::read_to_string(p)?)?
            }
            None => Self::embedded_default()?,
        };
        if let Ok(secret) = std::env::var(ADMIN_SECRET_ENV) {
            if !secret.trim().is_empty() {
                debug!("admin secret overridden from environment");
                cfg.admin_secret = secret;
            }
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_capital(self.starting_capital)?;
        if self.admin_secret.is_empty() {
            return Err(ConfigError::Invalid("admin_secret must not be empty".into()));
        }
        if let RecordsConfig::Sqlite { url } = &self.records {
            if !url.starts_with("sqlite:") {
                return Err(ConfigError::Invalid(format!("not a sqlite url: {url}")));
            }
        }
        self.rate_profile()?;
        Ok(())
    }

    /// Resolve the configured rate profile.
    pub fn rate_profile(&self) -> Result<RateProfile, ConfigError> {
        match &self.profile {
            ProfileChoice::Named(name) => builtin_profile(name),
            ProfileChoice::Custom(p) => {
                p.validate()?;
                Ok(p.clone())
            }
        }
    }

    /// Resolve the event card catalog: the override file when configured,
    /// the embedded catalog otherwise.
    pub fn event_catalog(&self) -> Result<Arc<EventCatalog>, ConfigError> {
        match &self.cards_path {
            Some(path) => Ok(Arc::new(load_catalog_file(path)?)),
            None => default_catalog(),
        }
    }
}

/// All built-in rate profiles, validated.
pub fn builtin_profiles() -> Result<Vec<RateProfile>, ConfigError> {
    let text = get_yaml("rate_profiles").ok_or(ConfigError::MissingAsset("rate_profiles"))?;
    let profiles: Vec<RateProfile> = serde_yaml::from_str(text)?;
    for p in &profiles {
        p.validate()?;
    }
    Ok(profiles)
}

/// Look up a built-in rate profile by name.
pub fn builtin_profile(name: &str) -> Result<RateProfile, ConfigError> {
    builtin_profiles()?
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
}

/// Parse and validate a YAML list of event cards.
pub fn parse_catalog(text: &str) -> Result<EventCatalog, ConfigError> {
    let cards: Vec<EventCard> = serde_yaml::from_str(text)?;
    Ok(EventCatalog::new(cards)?)
}

pub fn load_catalog_file(path: &Path) -> Result<EventCatalog, ConfigError> {
    let catalog = parse_catalog(&fs::read_to_string(path)?)?;
    info!(path = %path.display(), cards = catalog.len(), "loaded event card catalog");
    Ok(catalog)
}

static DEFAULT_CATALOG: OnceCell<Arc<EventCatalog>> = OnceCell::new();

/// The embedded catalog, parsed once per process and shared read-only.
pub fn default_catalog() -> Result<Arc<EventCatalog>, ConfigError> {
    DEFAULT_CATALOG
        .get_or_try_init(|| {
            let text = get_yaml("event_cards").ok_or(ConfigError::MissingAsset("event_cards"))?;
            parse_catalog(text).map(Arc::new)
        })
        .cloned()
}
