//! Workspace configuration, read from `.healthcheck/config.yaml`.
//!
//! Every field has a default, so an empty file is a valid config. The
//! processor secret is normally supplied through the environment rather than
//! written to disk.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HealthError, Result};

pub const ENV_SECRET_KEY: &str = "HEALTHCHECK_STRIPE_SECRET_KEY";
pub const ENV_API_BASE: &str = "HEALTHCHECK_STRIPE_API_BASE";

const MAX_PAGE_SIZE: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stripe: StripeConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
    /// Retries for rate-limited, 5xx and transport failures.
    pub max_retries: usize,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            api_base: "https://api.stripe.com".into(),
            timeout_secs: 20,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub donor_page_size: u64,
    pub donation_page_size: u64,
    pub legacy_meta_page_size: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            donor_page_size: 20,
            donation_page_size: 100,
            legacy_meta_page_size: 100,
        }
    }
}

impl Config {
    /// Read `path` (a missing file yields defaults), then apply overrides from `env`.
    pub fn load(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path)?;
            Self::parse(&raw)?
        } else {
            Self::default()
        };
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| HealthError::Configuration(e.to_string()))
    }

    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(key) = env(ENV_SECRET_KEY) {
            self.stripe.secret_key = Some(key);
        }
        if let Some(base) = env(ENV_API_BASE) {
            self.stripe.api_base = base;
        }
        if self
            .stripe
            .secret_key
            .as_deref()
            .is_some_and(|k| k.trim().is_empty())
        {
            self.stripe.secret_key = None;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("batch.donor_page_size", self.batch.donor_page_size),
            ("batch.donation_page_size", self.batch.donation_page_size),
            ("batch.legacy_meta_page_size", self.batch.legacy_meta_page_size),
        ];
        for (name, size) in sizes {
            if size == 0 || size > MAX_PAGE_SIZE {
                return Err(HealthError::Configuration(format!(
                    "{name} must be between 1 and {MAX_PAGE_SIZE}, got {size}"
                )));
            }
        }
        if self.stripe.timeout_secs == 0 {
            return Err(HealthError::Configuration(
                "stripe.timeout_secs must be greater than 0".into(),
            ));
        }
        if !self.stripe.api_base.starts_with("http://") && !self.stripe.api_base.starts_with("https://")
        {
            return Err(HealthError::Configuration(format!(
                "stripe.api_base must be an http(s) URL, got '{}'",
                self.stripe.api_base
            )));
        }
        Ok(())
    }
}
