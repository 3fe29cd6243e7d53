use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chatrobot_gateway::audio::wav::{self, WavFormat};
use chatrobot_gateway::behavior::{PhraseFile, builtin};
use chatrobot_gateway::device::ParticleCloud;
use chatrobot_gateway::intent::LuisClassifier;
use chatrobot_gateway::speech::AzureSpeech;
use chatrobot_gateway::{BehaviorRegistry, ChatRobot, Config, EventBus, ToneSpec};

/// Chat Robot - audio streaming and behavior gateway for a toy robot
#[derive(Parser)]
#[command(name = "chatrobot", version, about)]
struct Cli {
    /// Streaming server port
    #[arg(short, long, env = "CHATBOT_PORT")]
    port: Option<u16>,

    /// Host advertised to the device (detected when omitted)
    #[arg(long, env = "CHATBOT_HOST")]
    host: Option<String>,

    /// Reply phrase file (JSON, YAML or TOML)
    #[arg(long, env = "CHATROBOT_PHRASES")]
    phrases: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and summarize a phrase file
    CheckPhrases {
        /// Phrase file path
        file: PathBuf,
    },
    /// Validate a tone spec such as "C4Q,E4Q,G4H;120"
    Tone {
        /// Tone spec
        spec: String,
    },
    /// Print the capture WAV header as hex
    Header {
        /// Nominal sample count used for the RIFF size
        #[arg(short, long, default_value = "1000")]
        samples: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,chatrobot_gateway=info",
        1 => "info,chatrobot_gateway=debug",
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
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::CheckPhrases { file } => check_phrases(&file),
            Command::Tone { spec } => check_tone(&spec),
            Command::Header { samples } => {
                print_header(samples);
                Ok(())
            }
        };
    }

    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = Some(host);
    }
    if let Some(phrases) = cli.phrases {
        config.phrases_path = Some(phrases);
    }
    tracing::debug!(?config, "loaded configuration");

    let cloud = Arc::new(ParticleCloud::new(
        config.device.cloud_url.clone(),
        config.request_timeout,
    ));
    let speech = Arc::new(AzureSpeech::new(&config.speech, config.request_timeout)?);
    let classifier = Arc::new(LuisClassifier::new(&config.intent, config.request_timeout)?);

    let mut registry = BehaviorRegistry::new();
    builtin::register_builtin(&mut registry);
    if let Some(path) = &config.phrases_path {
        registry.load_phrases(path)?;
    }

    let robot = ChatRobot::new(
        &config,
        cloud,
        speech,
        classifier,
        registry,
        EventBus::new(),
    );
    let listener = robot.manager().bind().await?;

    tracing::info!(port = config.server.port, "starting chat robot gateway");

    robot
        .run(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("received ctrl-c");
        })
        .await?;

    Ok(())
}

/// Validate a phrase file and list its tokens
fn check_phrases(path: &std::path::Path) -> anyhow::Result<()> {
    let phrases = PhraseFile::load(path)?;

    println!(
        "{}: {} tokens, {} phrases",
        path.display(),
        phrases.token_count(),
        phrases.phrase_count()
    );
    for (token, replies) in phrases.iter() {
        println!("  {token} ({})", replies.len());
        for reply in replies {
            println!("    - {reply}");
        }
    }

    Ok(())
}

/// Validate a tone spec and show its normalized form
fn check_tone(spec: &str) -> anyhow::Result<()> {
    let tone: ToneSpec = spec.parse()?;

    println!("{tone}");
    println!(
        "{} notes at {} bpm, {:.2}s",
        tone.notes().len(),
        tone.tempo(),
        tone.duration().as_secs_f32()
    );

    Ok(())
}

/// Dump the capture header, 16 bytes per row
fn print_header(samples: u32) {
    let header = wav::encode_header(&WavFormat::CAPTURE, samples);

    for (row, bytes) in header.chunks(16).enumerate() {
        let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = bytes
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!("{:04x}  {:<47}  {ascii}", row * 16, hex.join(" "));
    }
}
