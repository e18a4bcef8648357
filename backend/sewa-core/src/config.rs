// src/config.rs

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::bs_date::{BsDate, BsDateError};
use crate::era::DEFAULT_ERA_CUTOFF;

//=============================================================================
// Configuration
//=============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid {name} '{value}': {source}")]
    InvalidDate {
        name: &'static str,
        value: String,
        #[source]
        source: BsDateError,
    },
}

/// Raw `SEWA_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Reference data
    #[serde(default = "default_reference_dir")]
    pub reference_dir: PathBuf,

    // Scoring
    #[serde(default = "default_era_cutoff")]
    pub era_cutoff: String,

    // Open-end substitute; the current date when unset
    pub today: Option<String>,
}

fn default_reference_dir() -> PathBuf {
    PathBuf::from("./reference")
}

fn default_era_cutoff() -> String {
    DEFAULT_ERA_CUTOFF.format()
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        envy::prefixed("SEWA_").from_env::<Config>()
    }

    pub fn era_cutoff(&self) -> Result<BsDate, ConfigError> {
        parse_setting("SEWA_ERA_CUTOFF", &self.era_cutoff)
    }

    /// `today` when configured, else the current local date.
    pub fn today(&self) -> Result<Option<BsDate>, ConfigError> {
        match self.today.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => parse_setting("SEWA_TODAY", s).map(Some),
            _ => Ok(BsDate::today()),
        }
    }
}

fn parse_setting(name: &'static str, value: &str) -> Result<BsDate, ConfigError> {
    BsDate::parse(value).map_err(|source| ConfigError::InvalidDate {
        name,
        value: value.to_string(),
        source,
    })
}
