//! Typed configuration.
//!
//! Pipeline parameters come from an optional TOML file, then environment
//! overrides, then (in the binary) command-line flags. Loads once at startup
//! and fails fast on anything unparseable or out of range.

use std::path::Path;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Total work items the generator emits.
    pub orders: u64,
    /// Worker pool size.
    pub workers: usize,
    /// Processing invocations per item, including the first.
    pub max_attempts: u32,
    /// Upper bound (exclusive) of the random delay before each item.
    pub generation_interval_ms: u64,
    /// Simulated processing time range, inclusive.
    pub processing_min_ms: u64,
    pub processing_max_ms: u64,
    /// Chance that a single attempt succeeds.
    pub success_probability: f64,
    pub max_items_per_order: usize,
    /// Fixed seed for reproducible runs. Entropy when unset.
    pub seed: Option<u64>,
    pub customers: Vec<String>,
    pub catalog: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            orders: 20,
            workers: 5,
            max_attempts: 3,
            generation_interval_ms: 300,
            processing_min_ms: 500,
            processing_max_ms: 1499,
            success_probability: 0.8,
            max_items_per_order: 1,
            seed: None,
            customers: ["Anna", "Bartek", "Celina", "Damian", "Emilia"]
                .map(String::from)
                .to_vec(),
            catalog: ["Laptop", "Mouse", "Monitor", "Keyboard", "Headphones"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("bad pipeline config: {e}")))
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Other(format!("serialize config: {e}")))
    }

    /// Reject configurations the pipeline cannot run.
    /// Apply `ORDERFLOW_ORDERS`, `ORDERFLOW_WORKERS`,
    /// `ORDERFLOW_MAX_ATTEMPTS` and `ORDERFLOW_SEED` on top of this config.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(orders) = parsed_var(&var, "ORDERFLOW_ORDERS")? {
            self.orders = orders;
        }
        if let Some(workers) = parsed_var(&var, "ORDERFLOW_WORKERS")? {
            self.workers = workers;
        }
        if let Some(max_attempts) = parsed_var(&var, "ORDERFLOW_MAX_ATTEMPTS")? {
            self.max_attempts = max_attempts;
        }
        if let Some(seed) = parsed_var(&var, "ORDERFLOW_SEED")? {
            self.seed = Some(seed);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.processing_min_ms > self.processing_max_ms {
            return Err(Error::Config(format!(
                "processing_min_ms ({}) exceeds processing_max_ms ({})",
                self.processing_min_ms, self.processing_max_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.success_probability) {
            return Err(Error::Config(format!(
                "success_probability must be within [0, 1], got {}",
                self.success_probability
            )));
        }
        if self.max_items_per_order == 0 {
            return Err(Error::Config(
                "max_items_per_order must be at least 1".to_string(),
            ));
        }
        if self.customers.is_empty() {
            return Err(Error::Config("customers must not be empty".to_string()));
        }
        if self.catalog.is_empty() {
            return Err(Error::Config("catalog must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn generation_interval(&self) -> Duration {
        Duration::from_millis(self.generation_interval_ms)
    }

    pub fn processing_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.processing_min_ms),
            Duration::from_millis(self.processing_max_ms),
        )
    }

    /// An independent random stream. Seeded runs derive each stream from the
    /// seed so the generator and the processor never share state.
    pub fn rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }
}

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut pipeline = match var("ORDERFLOW_CONFIG") {
            Some(path) => PipelineConfig::load(Path::new(&path))?,
            None => PipelineConfig::default(),
        };

        pipeline.apply_env_overrides(&var)?;

        Ok(Self {
            pipeline,
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parsed_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid value for {name} ({raw:?}): {e}")))
        })
        .transpose()
}
