use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lingualeap::audio::{create_capture_device, CaptureSource, FileSink, NullSink};
use lingualeap::session::{SessionMode, TurnOutcome};
use lingualeap::store::{MatchRecord, Profile};
use lingualeap::{
    create_router, AppState, AudioSink, Config, ConversationSession, MediaCapture, MemoryStore,
    SessionServices, SpeechBridge, SpeechService, Store,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Voice practice sessions with AI feedback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/lingualeap", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP control API
    Serve,

    /// Run a scripted session from the terminal
    Practice(PracticeCommand),
}

#[derive(Parser, Debug)]
struct PracticeCommand {
    /// solo (AI partner) or partner
    #[arg(short, long, default_value = "solo")]
    mode: SessionMode,

    /// Number of learner turns
    #[arg(short, long, default_value_t = 3)]
    turns: usize,

    /// Seconds of audio captured per turn
    #[arg(long, default_value_t = 3.0)]
    turn_secs: f64,

    /// Conversation topic
    #[arg(long, default_value = "Travel and holidays")]
    topic: String,

    /// Replay a WAV file instead of the configured source
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write synthesized speech to this directory
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lingualeap=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("LinguaLeap v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Commands::Serve => serve(cfg).await,
        Commands::Practice(cmd) => practice(cfg, cmd).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let state = AppState::from_config(&cfg)?;
    if !state.services.speech.is_online() {
        warn!("No API key configured, AI responses use offline fallbacks");
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn practice(cfg: Config, cmd: PracticeCommand) -> Result<()> {
    let source = match &cmd.input {
        Some(path) => CaptureSource::File(path.clone()),
        None => cfg.capture_source()?,
    };
    let output_dir = cmd.output.clone().or_else(|| cfg.session.output_dir.clone());

    let speech: Arc<dyn SpeechService> = Arc::new(SpeechBridge::new(cfg.bridge_config()));
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let sink: Arc<dyn AudioSink> = match output_dir {
        Some(dir) => Arc::new(FileSink::new(dir).realtime(true)),
        None => Arc::new(NullSink),
    };

    if !speech.is_online() {
        warn!("No API key configured, running with offline fallbacks");
    }

    let profile = Profile::new(cfg.session.user_name.clone());
    let user_id = profile.id;
    store.upsert_profile(profile).await?;
    let match_record = store
        .create_match(MatchRecord::new(user_id, None, cmd.topic.clone()))
        .await?;

    let device = create_capture_device(&source)
        .map_err(|e| anyhow::anyhow!("{} ({})", e, e.remediation().unwrap_or("check the audio source")))?;
    let capture = MediaCapture::new(device, cfg.capture_constraints());

    let mut session = ConversationSession::new(
        cfg.session_config(user_id, cmd.mode),
        match_record,
        capture,
        SessionServices {
            speech,
            store,
            sink,
        },
    );
    let canceller = session.canceller();

    session.begin().await?;
    info!("Topic: {}", session.topic());

    let turn_length = Duration::from_secs_f64(cmd.turn_secs.max(0.1));
    // Ctrl-C aborts whatever is in flight, including a pending reply
    let interrupted = CancellationToken::new();
    let interrupt_watch = {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.cancel();
                canceller.cancel();
            }
        })
    };

    for turn in 1..=cmd.turns {
        if interrupted.is_cancelled() {
            info!("Interrupted");
            break;
        }
        if session.is_expired() {
            info!("Time limit reached");
            break;
        }

        if !session.start_listening().await? {
            warn!("Session busy, skipping turn {}", turn);
            continue;
        }
        info!("Turn {}/{}: listening for {:?}", turn, cmd.turns, turn_length);

        tokio::select! {
            _ = interrupted.cancelled() => {
                info!("Interrupted");
                break;
            }
            _ = tokio::time::sleep(turn_length) => {}
        }

        match session.stop_listening().await {
            Ok(TurnOutcome::Exchange { user, reply, .. }) => {
                println!("{}: {}", user.speaker, user.text);
                println!("{}: {}", reply.speaker, reply.text);
            }
            Ok(TurnOutcome::UserTurn { user }) => println!("{}: {}", user.speaker, user.text),
            Ok(TurnOutcome::Ignored) => {}
            Err(e) => warn!("Turn {} interrupted: {}", turn, e),
        }
    }
    interrupt_watch.abort();

    let summary = session.end().await;
    let feedback = &summary.feedback;

    println!();
    println!("Session complete ({} turns, {}s)", summary.turns.len(), summary.duration_secs);
    println!("  Fluency:       {}", feedback.fluency);
    println!("  Vocabulary:    {}", feedback.vocabulary);
    println!("  Tone:          {}", feedback.tone);
    println!("  Pronunciation: {}", feedback.pronunciation);
    println!("  Rating:        {:.1}/10", feedback.overall_rating);
    println!("  {}", feedback.overall_notes);
    if let Some(progress) = &summary.progress {
        println!(
            "  ELO {} -> {}, streak {} day(s)",
            progress.elo_before, progress.elo_after, progress.current_streak
        );
    }

    Ok(())
}
