//! Coach CLI - terminal client for the coaching backend's realtime feed
//!
//! # Usage
//!
//! ```bash
//! # Follow a conversation (Ctrl+C to stop)
//! coach --url https://coach.example.com --api-key <KEY> --token <TOKEN> \
//!     watch --conversation conv-1
//!
//! # Values from ~/.coach/config.toml, JSON logs on stderr
//! coach --log-format json watch -c conv-1
//! ```

use clap::Parser;

use coach_cli::{
    init_logging, run_watch, CLIConfiguration, ClientSettings, EventPrinter, LogFormat,
};
use coach_link::Target;

mod args;

use args::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CLIConfiguration::load(&cli.config)?;

    let logging = config.resolved_logging();
    let level = if cli.verbose { "debug" } else { logging.level.as_str() };
    let format = LogFormat::parse(cli.log_format.as_deref().unwrap_or(&logging.format));
    init_logging(level, format)?;

    let settings = ClientSettings::resolve(&config, &cli.overrides())?;

    match cli.command {
        Command::Watch { conversation, .. } => {
            let conversation = Target::new(conversation)?;
            let client = settings.build_client()?;
            let printer = EventPrinter::new(std::io::stdout());

            run_watch(&client, conversation, printer, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                }
            })
            .await?;
        },
    }

    Ok(())
}
