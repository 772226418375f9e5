//! voxchain command line
//!
//! Speaks text through the fallback chain and manages the persisted
//! credentials and endpoints.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{debug, error, info};
use std::process;
use voxchain::speech::{EnginePolicy, SpeechEngine};
use voxchain::state::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "voxchain",
    version = voxchain::VERSION,
    about = "Text-to-speech with graceful fallback across engines"
)]
struct Cli {
    /// Log at debug level to voxchain.log
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Speak text and wait until it has been heard
    Speak {
        text: String,

        /// Two-letter language code (detected when omitted)
        #[arg(short, long)]
        lang: Option<String>,

        /// Backend policy for this request (auto, server, hosted, neural, native)
        #[arg(short, long)]
        engine: Option<EnginePolicy>,
    },

    /// Print engine status as JSON
    Status,

    /// List the TTS server's voice presets
    Voices,

    /// Store the inference API token
    SetToken { token: String },

    /// Store the hosted space URL
    SetSpaceUrl { url: String },

    /// Store the TTS server URL
    SetServerUrl { url: String },

    /// Store the default backend policy
    SetEngine { policy: EnginePolicy },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logger
    if cli.debug {
        // Debug mode: write to voxchain.log file
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("voxchain.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open voxchain.log for debug logging: {}", e);
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "voxchain version {} starting (debug mode, logging to voxchain.log)",
            voxchain::VERSION
        );
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Warn)
            .parse_default_env()
            .init();
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli.command)) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let mut settings = Settings::load().context("loading settings")?;
    debug!("Settings loaded from {:?}", settings.path());

    match command {
        Command::Speak { text, lang, engine } => {
            if let Some(policy) = engine {
                // Only for this run; not written back
                settings.set("engine", "policy", &policy.to_string());
            }
            let engine = SpeechEngine::init(settings).await?;

            tokio::select! {
                _ = async {
                    engine.speak(&text, lang.as_deref()).await;
                    engine.wait_until_idle().await;
                } => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    engine.stop();
                }
            }
        }
        Command::Status => {
            let engine = SpeechEngine::init(settings).await?;
            println!("{}", serde_json::to_string_pretty(&engine.status())?);
        }
        Command::Voices => {
            let engine = SpeechEngine::init(settings).await?;
            let voices = engine
                .list_server_voices()
                .await
                .context("fetching voices from the TTS server")?;
            println!("{}", serde_json::to_string_pretty(&voices)?);
        }
        Command::SetToken { token } => {
            settings.set_hf_token(&token)?;
            println!("Token saved to {}", settings.path().display());
        }
        Command::SetSpaceUrl { url } => {
            settings.set_space_url(&url)?;
            println!("Space URL saved to {}", settings.path().display());
        }
        Command::SetServerUrl { url } => {
            settings.set_server_url(&url)?;
            println!("Server URL saved to {}", settings.path().display());
        }
        Command::SetEngine { policy } => {
            settings.set_policy(policy)?;
            println!("Engine policy set to {}", policy);
        }
    }

    Ok(())
}
