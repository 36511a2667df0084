//! Configuration helpers for integration tests

use chatrelay_config::Config;
use chatrelay_llm::{ChatAdapter, ChatMessage};

/// Builder for TOML configurations pointed at mock backends
pub struct ConfigBuilder {
    providers: Vec<String>,
    generation: Vec<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            generation: vec![r#"model = "mock-model-1""#.to_owned()],
        }
    }

    /// Add a provider with a test key and fast retries
    pub fn with_provider(mut self, id: &str, base_url: &str) -> Self {
        self.providers.push(format!(
            r#"
[providers.{id}]
base_url = "{base_url}"
api_key = "test-key"
timeout = "5s"
max_retries = 2
retry_backoff = "10ms"
"#
        ));
        self
    }

    /// Add a raw line to the `[generation]` table
    pub fn with_generation(mut self, line: &str) -> Self {
        self.generation.push(line.to_owned());
        self
    }

    pub fn toml(&self) -> String {
        format!(
            "{}\n[generation]\n{}\n\n[generation.pacing]\ndelay = \"0ms\"\n",
            self.providers.concat(),
            self.generation.join("\n")
        )
    }

    pub fn build(&self) -> Config {
        Config::from_toml(&self.toml()).expect("valid test configuration")
    }
}

/// Adapter for the first provider of `config`
pub fn adapter(config: &Config) -> ChatAdapter {
    let provider = config.default_provider_id().expect("a provider");
    ChatAdapter::from_store(config, provider)
        .expect("provider resolves")
        .generation(config.generation.clone())
        .build()
}

pub fn user(text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(text)]
}
