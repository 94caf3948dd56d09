//! prospect-sim CLI
//!
//! Usage:
//!   prospect-sim --text "Hi, this is Dana from Acme"   # Single gate evaluation
//!   prospect-sim --interactive                         # Offline roleplay call
//!   prospect-sim --serve                               # HTTP API server
//!   prospect-sim --text "..." --json                   # JSON output

use clap::Parser;
use colored::Colorize;
use std::error::Error;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prospect_sim::core::{
    run_server, spawn_session, variance_seed_for, BehaviorGateEngine, ConsoleSpeechSink,
    SessionReport, SessionServices, SessionUpdate,
};
use prospect_sim::types::TranscriptEvent;
use prospect_sim::{SessionConfig, VERSION};

/// Simulated speaking rate for typed lines
const TYPED_MS_PER_WORD: u64 = 350;

/// How long to wait for the prospect to answer before prompting again
const REPLY_WAIT: Duration = Duration::from_secs(8);

#[derive(Parser, Debug)]
#[command(
    name = "prospect-sim",
    version = VERSION,
    about = "Simulated sales prospect - turn-taking, candidate queue and behavior gate",
    long_about = "prospect-sim orchestrates a simulated sales prospect for cold-call practice.\n\n\
                  Modes:\n  \
                  --text         Evaluate one rep line against the behavior gate\n  \
                  --interactive  Offline roleplay call (type your lines)\n  \
                  --serve        HTTP + WebSocket API server\n\n\
                  Stages:\n  \
                  NEEDS_NAME / NEEDS_COMPANY / NEEDS_PURPOSE - Prospect wants basics first\n  \
                  NORMAL     - Engaged conversation\n  \
                  DIRECT     - Pushing for the point\n  \
                  IMPATIENT  - About to hang up\n  \
                  DONE       - Call over"
)]
struct Args {
    /// Rep line to evaluate (single mode)
    #[arg(short, long)]
    text: Option<String>,

    /// Offline roleplay call from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Session config file (JSON)
    #[arg(long)]
    config: Option<String>,

    /// Silence before the rep counts as done (ms)
    #[arg(long)]
    silence_ms: Option<u64>,

    /// Minimum rep speaking time before the floor is handed over (ms)
    #[arg(long)]
    user_done_ms: Option<u64>,

    /// Fixed variance seed in [0, 1]
    #[arg(long)]
    seed: Option<f64>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn session_config(&self) -> Result<SessionConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)?,
            None => SessionConfig::default(),
        };
        if let Some(ms) = self.silence_ms {
            config.turn.silence_threshold_ms = ms;
        }
        if let Some(ms) = self.user_done_ms {
            config.turn.user_done_threshold_ms = ms;
        }
        if self.seed.is_some() {
            config.variance_seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("prospect_sim={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.no_color {
        colored::control::set_override(false);
    }
    let config = args.session_config()?;

    if args.serve {
        run_server(&args.addr, config).await
    } else if args.interactive {
        run_interactive(&args, config).await
    } else if let Some(ref text) = args.text {
        run_single(text, &args, config)
    } else {
        // Default to interactive if no mode specified
        run_interactive(&args, config).await
    }
}

/// Evaluate one rep line from a fresh gate
fn run_single(text: &str, args: &Args, config: SessionConfig) -> Result<(), Box<dyn Error>> {
    let seed = config.variance_seed.unwrap_or_else(|| variance_seed_for("cli"));
    let mut engine = BehaviorGateEngine::new(config.gate, seed);
    let output = engine.observe_user_turn(text);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if args.no_color {
        println!("{}", output.to_parseable_string());
    } else {
        println!("{}", output.to_terminal_string());
    }
    Ok(())
}

/// Offline roleplay: typed lines stand in for speech
async fn run_interactive(args: &Args, config: SessionConfig) -> Result<(), Box<dyn Error>> {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let silence_ms = config.turn.silence_threshold_ms;
    let user_done_ms = config.turn.user_done_threshold_ms;
    let persona = config
        .planner
        .persona
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()
        .unwrap_or("the prospect")
        .to_string();
    let services = SessionServices::from_config(&config)?.with_speech(std::sync::Arc::new(ConsoleSpeechSink));
    let handle = spawn_session(session_id, config, services);
    let mut updates = handle.subscribe();

    print_header();
    println!("You are cold-calling {}. Type your lines; 'quit' hangs up.", persona.bold());
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(format!("{} ", "You:".bold()).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        handle.user_started_speaking().await?;
        if let Some(output) = handle.transcript(TranscriptEvent::user(line)).await? {
            if args.json {
                println!("{}", serde_json::to_string(&output)?);
            } else {
                println!("  {}", output.to_terminal_string().dimmed());
            }
        }

        // Hold the floor for as long as the line would take to say, then go quiet
        let words = line.split_whitespace().count() as u64;
        let speaking_ms = (words * TYPED_MS_PER_WORD).max(user_done_ms);
        tokio::time::sleep(Duration::from_millis(speaking_ms + silence_ms)).await;
        handle.user_stopped_speaking(silence_ms).await?;

        if wait_for_reply(&mut updates).await {
            println!();
            println!("{}", "The prospect hung up.".red().bold());
            break;
        }
    }

    let report = handle.end().await?;
    print_report(&report, args.json)?;
    Ok(())
}

/// Wait until the prospect's line has played; true if the call ended
async fn wait_for_reply(updates: &mut broadcast::Receiver<SessionUpdate>) -> bool {
    let deadline = tokio::time::sleep(REPLY_WAIT);
    tokio::pin!(deadline);
    let mut spoke = false;
    loop {
        tokio::select! {
            _ = &mut deadline => return false,
            update = updates.recv() => match update {
                Ok(SessionUpdate::ProspectSpeaking { .. }) => spoke = true,
                Ok(SessionUpdate::ObjectionRaised { name, .. }) => {
                    println!("  {}", format!("objection raised: {}", name).yellow());
                }
                Ok(SessionUpdate::ObjectionResolved { name }) => {
                    println!("  {}", format!("objection resolved: {}", name).green());
                }
                Ok(SessionUpdate::CallEnded { .. }) => return true,
                Ok(SessionUpdate::ProspectFinished { .. }) if spoke => {
                    // A farewell is followed immediately by CallEnded
                    return matches!(updates.try_recv(), Ok(SessionUpdate::CallEnded { .. }));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return true,
            },
        }
    }
}

fn print_header() {
    println!("{}", "========================================".bold());
    println!("{}", format!("  prospect-sim v{} - Roleplay", VERSION).bold());
    println!("{}", "========================================".bold());
    println!();
}

fn print_report(report: &SessionReport, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let rubric = &report.rubric;
    println!();
    println!("{}", "Call summary".bold());
    println!("  final stage: {}", report.final_stage.stage.colored());
    println!(
        "  rapport {:.0} | trust {:.0} | interest {:.0} ({})",
        report.scores.rapport, report.scores.trust, report.scores.interest, report.tier
    );
    println!(
        "  talk ratio {:.2} | open questions {} | follow-ups {} | objections {}/{} resolved",
        report.stats.talk_ratio,
        report.stats.open_ended_count,
        report.stats.follow_up_count,
        report.stats.objections_resolved,
        report.stats.objections_raised
    );
    println!("  rubric: {:.1} ({:?})", rubric.score, rubric.level);
    for s in &rubric.strengths {
        println!("    {} {}", "+".green(), s);
    }
    for i in &rubric.improvements {
        println!("    {} {}", "-".yellow(), i);
    }
    Ok(())
}
