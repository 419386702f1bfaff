use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exovoice_gateway::api::ApiServer;
use exovoice_gateway::telephony::ExotelClient;
use exovoice_gateway::Config;

/// Exovoice - Exotel telephony gateway for real-time voice AI calls
#[derive(Parser)]
#[command(name = "exovoice", version, about)]
struct Cli {
    /// Host to bind
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Place an outbound call through the configured voice app
    Call {
        /// Destination number (E.164, e.g. +919876543210)
        number: String,

        /// Value passed to the voice app as CustomField
        #[arg(long)]
        custom_field: Option<String>,
    },
    /// Validate configuration and credentials without serving
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A local .env is the development workflow; absence is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,exovoice_gateway=info",
        1 => "info,exovoice_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Call {
                number,
                custom_field,
            } => cmd_call(config, &number, custom_field).await,
            Command::Check => cmd_check(&config),
        };
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "starting exovoice gateway"
    );

    let server = ApiServer::new(Arc::new(config))?;
    server.run().await?;

    Ok(())
}

/// Place one outbound call from the command line
async fn cmd_call(
    config: Config,
    number: &str,
    custom_field: Option<String>,
) -> anyhow::Result<()> {
    if let Err(detail) = config.outbound.validate_number(number) {
        anyhow::bail!(detail);
    }

    let custom_field = custom_field.or_else(|| config.outbound.default_custom_field.clone());
    let client = ExotelClient::new(config.exotel, config.outbound)?;

    println!("Calling {number}...");
    let result = client.connect_call(number, custom_field.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

/// Validate configuration without serving
fn cmd_check(config: &Config) -> anyhow::Result<()> {
    ExotelClient::new(config.exotel.clone(), config.outbound.clone())?;

    println!("Configuration OK");
    println!(
        "  bind address:  {}:{}",
        config.server.host, config.server.port
    );
    println!("  voice app:     {}", config.exotel.voice_app_url());
    println!("  caller id:     {}", config.exotel.caller_id);
    println!(
        "  STT:           {} ({})",
        config.speech.model, config.speech.language
    );
    println!("  LLM:           {}", config.llm.model);
    println!(
        "  TTS:           {} (voice {})",
        config.tts.model, config.tts.voice_id
    );
    println!(
        "  interruptions: {}",
        if config.session.enable_interruptions {
            "enabled"
        } else {
            "disabled"
        }
    );

    Ok(())
}
