use std::path::Path;

use http::{HeaderName, HeaderValue};

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured or a provider
    /// entry is unusable
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured under [providers]");
        }

        for (id, provider) in &self.providers {
            match provider.base_url.scheme() {
                "http" | "https" => {}
                other => anyhow::bail!("provider '{id}' base_url must use http or https, got '{other}'"),
            }

            if provider.timeout.is_zero() {
                anyhow::bail!("provider '{id}' timeout must be greater than 0");
            }

            for (name, value) in &provider.headers {
                HeaderName::try_from(name.as_str())
                    .map_err(|e| anyhow::anyhow!("provider '{id}' has invalid header name '{name}': {e}"))?;
                HeaderValue::try_from(value.as_str())
                    .map_err(|e| anyhow::anyhow!("provider '{id}' has invalid value for header '{name}': {e}"))?;
            }
        }

        if self.generation.model.trim().is_empty() {
            anyhow::bail!("generation.model must not be empty");
        }

        Ok(())
    }
}
