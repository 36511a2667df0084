#![allow(clippy::must_use_candidate)]

//! Configuration for chatrelay
//!
//! Loaded from a TOML file with `{{ env.VAR }}` placeholder expansion.
//! Provider entries describe how to reach a backend; the `generation`
//! table holds the model defaults every call starts from.

mod duration;
mod env;
pub mod generation;
mod loader;
pub mod provider;
pub mod telemetry;

use indexmap::IndexMap;
use serde::Deserialize;

pub use env::EnvExpansionError;
pub use generation::{ChunkPacingConfig, GenerationConfig, SplitMode};
pub use provider::ProviderConfig;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level chatrelay configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Backend configurations keyed by provider id
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Model defaults applied to every call
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

impl Config {
    /// Look up a provider by id
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.get(id)
    }

    /// Id of the first configured provider, used when none is requested
    pub fn default_provider_id(&self) -> Option<&str> {
        self.providers.keys().next().map(String::as_str)
    }
}
