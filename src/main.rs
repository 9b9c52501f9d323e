use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lingo_coach::audio::{AudioInputConfig, WavFileInput, WavTimelineOutput};
use lingo_coach::session::{CoordinatorSettings, LiveFlow, SessionCoordinator, SystemClock};
use lingo_coach::{create_router, AppState, CoachState, Config, GeminiClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lingo-coach", about = "Language coaching sessions backed by a hosted model")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/lingo-coach")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve,
    /// Interactive text chat on stdin
    Chat,
    /// Stream a WAV file into a live voice session
    Voice {
        /// Speech to send (any rate, mono or stereo)
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the model's synthesized speech
        #[arg(short, long, default_value = "coach-reply.wav")]
        output: PathBuf,
        /// Stop after this many seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let api_key = cfg.gemini.resolve_api_key()?;
    let client = GeminiClient::new(cfg.gemini.clone(), api_key)
        .context("Failed to build remote client")?;
    let settings = CoordinatorSettings::from_config(&cfg);
    // Rendered when the coordinator is dropped at exit
    let readout =
        WavTimelineOutput::realtime(cfg.audio.speech_sample_rate).write_to("report-readout.wav");
    let coordinator = SessionCoordinator::new(Arc::new(client), Arc::new(SystemClock), settings)
        .with_readout_output(Box::new(readout));

    match cli.command {
        Command::Serve => serve(&cfg, coordinator).await,
        Command::Chat => chat(&cfg, coordinator).await,
        Command::Voice {
            input,
            output,
            seconds,
        } => voice(&cfg, coordinator, input, output, seconds).await,
    }
}

async fn serve(cfg: &Config, coordinator: SessionCoordinator) -> Result<()> {
    let app = create_router(AppState::new(coordinator));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn chat(cfg: &Config, mut coordinator: SessionCoordinator) -> Result<()> {
    coordinator.start_text_chat().await?;

    println!(
        "Practising {} ({}). Commands: /report, /export <path>, /reset, /quit",
        cfg.coaching.language, cfg.coaching.scenario
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                coordinator.reset().await;
                coordinator.start_text_chat().await?;
                println!("Started a new session.");
                continue;
            }
            "/report" => {
                if let Err(e) = coordinator.request_assessment().await {
                    println!("! {}", e);
                }
            }
            _ if line.starts_with("/export") => {
                let path = line.trim_start_matches("/export").trim();
                match coordinator.export_report() {
                    Some(export) => {
                        let path = if path.is_empty() { export.file_name.as_str() } else { path };
                        std::fs::write(path, &export.contents)
                            .with_context(|| format!("Failed to write {}", path))?;
                        println!("Report saved to {}", path);
                    }
                    None => println!("! No report yet."),
                }
                continue;
            }
            text => {
                coordinator.set_draft(text);
                if let Err(e) = coordinator.send_draft().await {
                    println!("! {}", e);
                }
            }
        }

        for notice in coordinator.take_notices() {
            println!("! {}", notice);
        }

        if coordinator.state() == CoachState::ReportReady {
            if let Some(report) = coordinator.report() {
                println!("\n== {} ==\n{}\n", report.score, report.summary);
            }
        } else if let Some(last) = coordinator.messages().last() {
            println!("{}: {}", last.role.label(), last.content);
        }
    }

    Ok(())
}

async fn voice(
    cfg: &Config,
    mut coordinator: SessionCoordinator,
    input: PathBuf,
    output: PathBuf,
    seconds: u64,
) -> Result<()> {
    let input = WavFileInput::new(
        &input,
        AudioInputConfig {
            target_sample_rate: cfg.audio.input_sample_rate,
            target_channels: 1,
            frame_duration_ms: cfg.audio.frame_ms,
        },
    );
    let output = WavTimelineOutput::realtime(cfg.audio.output_sample_rate).write_to(&output);

    coordinator.start_live(Box::new(input), Box::new(output)).await?;

    let flow = tokio::select! {
        flow = coordinator.run_live() => Some(flow?),
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => None,
        _ = tokio::signal::ctrl_c() => None,
    };
    coordinator.stop_live().await;

    match flow {
        Some(LiveFlow::Assessed) => info!("Session ended with an assessment"),
        Some(_) => info!("Live session ended"),
        None => info!("Stopped after {}s", seconds),
    }

    for notice in coordinator.take_notices() {
        warn!("{}", notice);
    }
    for message in coordinator.messages() {
        println!("{}: {}", message.role.label(), message.content);
    }
    if let Some(export) = coordinator.export_report() {
        std::fs::write(&export.file_name, &export.contents)
            .with_context(|| format!("Failed to write {}", export.file_name))?;
        println!("Report saved to {}", export.file_name);
    }

    Ok(())
}
