use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_relay::backend::SpeechBackend;
use voice_relay::{Config, Daemon};

/// Voice relay - answers Telegram voice messages with spoken replies
#[derive(Parser)]
#[command(name = "voice-relay", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Directory for temporary audio files
    #[arg(long, value_name = "PATH")]
    temp_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe an audio file and print the text
    Transcribe {
        /// Audio file (ogg, mp3, wav, ...)
        file: PathBuf,
    },
    /// Synthesize speech to a file
    Speak {
        /// Text to speak
        text: String,
        /// Output audio file
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Run one conversation turn and print the reply
    Ask {
        /// Message to send
        text: String,
        /// Conversation to continue (chat id when sessions are per chat)
        #[arg(long, default_value = "cli")]
        session: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_relay=info",
        1 => "info,voice_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.env_file.as_deref())?;
    if let Some(temp_dir) = cli.temp_dir {
        config.temp_dir = temp_dir;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        None => {
            tracing::info!("starting voice relay");
            Daemon::new(config).run().await?;
        }
        Some(Command::Transcribe { file }) => transcribe(&config, &file).await?,
        Some(Command::Speak { text, out }) => speak(&config, &text, &out).await?,
        Some(Command::Ask { text, session }) => ask(&config, &session, &text).await?,
    }

    Ok(())
}

/// Print the transcription of an audio file
async fn transcribe(config: &Config, file: &Path) -> anyhow::Result<()> {
    let backend = Daemon::backend(config);
    let text = backend.transcribe(file).await?;
    println!("{text}");
    Ok(())
}

/// Write synthesized speech to `out`
async fn speak(config: &Config, text: &str, out: &Path) -> anyhow::Result<()> {
    let backend = Daemon::backend(config);
    backend.synthesize(text, out).await?;
    println!("Wrote {} ({})", out.display(), backend.reply_format());
    Ok(())
}

/// Print the assistant's reply to one message
async fn ask(config: &Config, session: &str, text: &str) -> anyhow::Result<()> {
    let backend = Daemon::backend(config);
    let reply = backend.converse(session, text).await?;
    println!("{reply}");
    Ok(())
}
