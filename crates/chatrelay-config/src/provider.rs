use std::time::Duration;

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

/// Default request timeout, applied independently to every request
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of transport-level retries for rate limits and transient failures
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay before the first transport-level retry
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Connection settings for a single chat-completions backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL; `/chat/completions` is appended
    pub base_url: Url,
    /// Bearer token sent in the `Authorization` header
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Upper bound for one complete network call
    #[serde(default = "default_timeout", deserialize_with = "crate::duration::deserialize")]
    pub timeout: Duration,
    /// Retries for rate limits and transient failures before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial retry delay, doubled on each attempt
    #[serde(default = "default_retry_backoff", deserialize_with = "crate::duration::deserialize")]
    pub retry_backoff: Duration,
}

impl ProviderConfig {
    /// Minimal configuration for a base URL with default timeouts and retries
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            headers: IndexMap::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Attach an API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// API key if one is configured and non-empty
    ///
    /// Placeholders like `{{ env.KEY | default("") }}` expand to an empty
    /// string, which means "send no `Authorization` header".
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .filter(|key| !key.is_empty())
    }
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_retry_backoff() -> Duration {
    DEFAULT_RETRY_BACKOFF
}
