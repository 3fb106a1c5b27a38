//! chat-relay - a minimal chat-completions relay for DeepSeek-compatible APIs
//!
//! Serves a small JSON/SSE API for a local web client and forwards chat
//! requests upstream with a server-held API key.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::config::{Config, ConfigSources};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Minimal chat-completions relay for DeepSeek-compatible APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Env file read for DEEPSEEK_* settings (ignored if missing)
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

impl SourceArgs {
    fn sources(self) -> ConfigSources {
        ConfigSources {
            config_file: self.config,
            env_file: Some(self.env_file),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        #[command(flatten)]
        sources: SourceArgs,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and show the resolved upstream endpoint
    Check {
        #[command(flatten)]
        sources: SourceArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { sources, listen } => {
            let sources = sources.sources();
            tracing::info!(
                config = ?sources.config_file,
                env_file = ?sources.env_file,
                "Loading configuration"
            );
            let (mut config, key_source) = Config::load(&sources)?;
            tracing::info!(key_source = %key_source, "API key resolved");

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            chat_relay::proxy::run_server(config).await
        }

        Commands::Check { sources } => {
            let (config, key_source) = Config::load(&sources.sources())?;
            let endpoint = config.provider.endpoint()?;

            println!("listen:   {}", config.server.listen);
            println!("base url: {}", config.provider.url);
            println!("endpoint: {}", endpoint);
            println!("model:    {}", config.provider.model);
            println!("api key:  {}", key_source);

            if config.provider.api_key.is_none() {
                anyhow::bail!("no API key configured; set DEEPSEEK_API_KEY");
            }
            Ok(())
        }
    }
}
