use clap::{Parser, Subcommand};
use coach_cli::config::default_config_path;
use coach_cli::Overrides;
use std::path::PathBuf;

/// Coach CLI - follow conversations on the coaching backend in real time
#[derive(Parser, Debug)]
#[command(name = "coach")]
#[command(author = "Coach Platform Team")]
#[command(version)]
#[command(about = "Watch conversation messages and notifications as they happen", long_about = None)]
pub struct Cli {
    /// Backend base URL (e.g., https://coach.example.com)
    #[arg(short = 'u', long = "url", global = true)]
    pub url: Option<String>,

    /// Public API key
    #[arg(long = "api-key", env = "COACH_API_KEY", global = true)]
    pub api_key: Option<String>,

    /// Access token of the signed-in user
    #[arg(long = "token", env = "COACH_ACCESS_TOKEN", global = true)]
    pub token: Option<String>,

    /// Configuration file
    #[arg(long = "config", default_value_os_t = default_config_path(), global = true)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Log format: compact or json (overrides [logging] format)
    #[arg(long = "log-format", global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print new messages and notifications of a conversation as JSON lines
    Watch {
        /// Conversation id to follow
        #[arg(short = 'c', long = "conversation")]
        conversation: String,

        /// Delay before a subscription is set up, in milliseconds
        #[arg(long = "coalesce-ms")]
        coalesce_ms: Option<u64>,

        /// Retry ceiling per stream
        #[arg(long = "max-retries")]
        max_retries: Option<u32>,
    },
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        let (coalesce_delay_ms, max_retries) = match &self.command {
            Command::Watch {
                coalesce_ms,
                max_retries,
                ..
            } => (*coalesce_ms, *max_retries),
        };
        Overrides {
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            access_token: self.token.clone(),
            coalesce_delay_ms,
            max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch() {
        let cli = Cli::try_parse_from([
            "coach",
            "--url",
            "http://localhost:54321",
            "watch",
            "--conversation",
            "conv-1",
            "--coalesce-ms",
            "50",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.url.as_deref(), Some("http://localhost:54321"));
        assert_eq!(overrides.coalesce_delay_ms, Some(50));
        assert!(matches!(cli.command, Command::Watch { ref conversation, .. } if conversation == "conv-1"));
    }

    #[test]
    fn test_watch_requires_conversation() {
        assert!(Cli::try_parse_from(["coach", "watch"]).is_err());
    }
}
