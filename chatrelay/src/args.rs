use std::io::Read;
use std::path::PathBuf;

use clap::Parser;

/// Chatrelay command line
#[derive(Debug, Parser)]
#[command(name = "chatrelay", about = "Stream a chat completion from an OpenAI-compatible backend")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "chatrelay.toml", env = "CHATRELAY_CONFIG")]
    pub config: PathBuf,

    /// Provider id from the configuration; defaults to the first one
    #[arg(short, long, env = "CHATRELAY_PROVIDER")]
    pub provider: Option<String>,

    /// Override the configured model
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt sent before the user prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Send one non-streaming request instead of streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Prompt text; read from stdin when omitted
    pub prompt: Vec<String>,
}

impl Args {
    /// Prompt from the arguments, or all of stdin
    pub fn prompt_text(&self) -> anyhow::Result<String> {
        let prompt = if self.prompt.is_empty() {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| anyhow::anyhow!("failed to read prompt from stdin: {e}"))?;
            buf
        } else {
            self.prompt.join(" ")
        };

        if prompt.trim().is_empty() {
            anyhow::bail!("prompt must not be empty");
        }
        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn prompt_words_are_joined() {
        let args = Args::parse_from(["chatrelay", "--provider", "local", "--no-stream", "tell", "me", "a", "joke"]);

        assert_eq!(args.provider.as_deref(), Some("local"));
        assert!(args.no_stream);
        assert_eq!(args.prompt_text().unwrap(), "tell me a joke");
    }
}
