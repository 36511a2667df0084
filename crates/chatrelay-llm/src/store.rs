use chatrelay_config::{Config, ProviderConfig};

use crate::error::LlmError;

/// Read-only source of provider connection settings
pub trait ProviderConfigStore: Send + Sync {
    /// Settings for `provider_id`
    fn resolve(&self, provider_id: &str) -> Result<ProviderConfig, LlmError>;
}

impl ProviderConfigStore for Config {
    fn resolve(&self, provider_id: &str) -> Result<ProviderConfig, LlmError> {
        self.provider(provider_id).cloned().ok_or_else(|| {
            let known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            LlmError::Configuration(format!(
                "unknown provider '{provider_id}' (configured: {})",
                known.join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_configured_provider() {
        let config = Config::from_toml(
            r#"
            [providers.local]
            base_url = "http://127.0.0.1:8080/v1"
            timeout = "5s"
            "#,
        )
        .unwrap();

        let provider = config.resolve("local").unwrap();
        assert_eq!(provider.base_url.as_str(), "http://127.0.0.1:8080/v1");
        assert_eq!(provider.timeout, std::time::Duration::from_secs(5));
    }

    #[test]
    fn unknown_provider_is_configuration_error() {
        let config = Config::from_toml(
            r#"
            [providers.local]
            base_url = "http://127.0.0.1:8080/v1"
            "#,
        )
        .unwrap();

        let err = config.resolve("remote").unwrap_err();
        assert!(matches!(err, LlmError::Configuration(ref m) if m.contains("local")));
    }
}
