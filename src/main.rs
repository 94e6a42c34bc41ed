use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use atc_fleet::speech::cache_voice;
use atc_fleet::{Config, DiscordConnector, FleetManager, make_provider};

/// ATC - voice channel announcer fleet
#[derive(Parser)]
#[command(name = "atc", version, about)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "ATC_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the fleet (default)
    Run,
    /// Pre-render clips into a voice cache directory
    CacheVoice {
        /// Directory to write clips into
        #[arg(short, long)]
        dir: PathBuf,
        /// Provider that renders the clips
        #[arg(long, default_value = "festival")]
        voice: String,
        /// Messages to render, e.g. "Welcome Alice"
        #[arg(required = true)]
        messages: Vec<String>,
    },
    /// Synthesize one clip with the configured voice
    Say {
        /// Text to speak
        #[arg(default_value = "ATC Online")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,atc_fleet=info,serenity=warn,songbird=warn",
        1 => "info,atc_fleet=debug,serenity=warn,songbird=warn",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
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
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_fleet(config).await,
        Command::CacheVoice {
            dir,
            voice,
            messages,
        } => {
            let provider = make_provider(&voice, &config.speech);
            let written = cache_voice(&*provider, &dir, &messages).await?;
            println!("Wrote {} clips to {}", written.len(), dir.display());
            Ok(())
        }
        Command::Say { text } => {
            let provider = make_provider(&config.voice, &config.speech);
            let clip = provider.synthesize(&text).await?;
            println!("{}", clip.path().display());
            Ok(())
        }
    }
}

async fn run_fleet(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!(
        workers = config.tokens.len(),
        voice = %config.voice,
        path = %config.path.display(),
        "starting atc"
    );

    let speech = make_provider(&config.voice, &config.speech);
    let fleet = Arc::new(FleetManager::new(config, speech));
    let run = fleet.run(Arc::new(DiscordConnector));
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            fleet.shutdown().await;
            run.await?;
        }
    }

    Ok(())
}
