use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::time;

use crate::{
    capture::{self, CaptureStatus, FfmpegPlatform},
    events::{
        ChannelEventSink, LogEventSink, SharedEventSink, CAPTURE_ERROR, PREDICTION_COMPLETED,
        SEGMENT_RECORDED,
    },
    models::PredictionResult,
    results, AppState, SettingsOverrides,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "cli";

use crate::{log_info, log_warn};

const FFMPEG_BINARY: &str = "ffmpeg";

#[derive(Parser, Debug)]
#[command(author, version, about = "Record or upload interview video and collect deception predictions")]
pub struct Cli {
    /// Base URL of the prediction service
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where settings, history and previews are kept
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging (same as DEEPLIE_DEBUG=1)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and submit one video file
    Upload { file: PathBuf },
    /// Record from the camera, submitting one segment every interval
    Camera {
        #[arg(long)]
        segment_secs: Option<u64>,
        /// Stop automatically after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Inspect or manage stored results
    Results {
        #[command(subcommand)]
        action: ResultsAction,
    },
    /// Print the effective configuration
    Config {
        /// Persist the effective configuration to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ResultsAction {
    List {
        /// Only results from this camera session
        #[arg(long)]
        session: Option<String>,
    },
    /// Write the result's video to the preview folder and print its path
    Show { id: String },
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Write a JSON report of the given ids (all results when none are given)
    Export { path: PathBuf, ids: Vec<String> },
    /// List recorded camera sessions
    Sessions,
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .map(|dir| dir.join("deeplie"))
            .unwrap_or_else(|| PathBuf::from(".deeplie"))
    })
}

async fn initialize(cli: &Cli, segment_secs: Option<u64>, events: SharedEventSink) -> Result<AppState> {
    let overrides = SettingsOverrides {
        api_url: cli.api_url.clone(),
        segment_secs,
    };
    let platform = Arc::new(FfmpegPlatform::probe(FFMPEG_BINARY));
    AppState::initialize(&data_dir(cli), &overrides, events, platform).await
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Upload { file } => {
            let state = initialize(&cli, None, Arc::new(LogEventSink)).await?;
            let result = results::commands::submit_file(&state, file.clone())
                .await
                .map_err(|e| anyhow!(e))?;
            print_result(&result);
            Ok(())
        }
        Command::Camera {
            segment_secs,
            duration_secs,
        } => run_camera(&cli, *segment_secs, *duration_secs).await,
        Command::Results { action } => {
            let state = initialize(&cli, None, Arc::new(LogEventSink)).await?;
            run_results(&state, action).await
        }
        Command::Config { save } => {
            let state = initialize(&cli, None, Arc::new(LogEventSink)).await?;
            println!("{}", serde_json::to_string_pretty(&state.config)?);
            if *save {
                state.settings.update(state.config.clone())?;
                log_info!("settings saved");
            }
            Ok(())
        }
    }
}

async fn run_results(state: &AppState, action: &ResultsAction) -> Result<()> {
    match action {
        ResultsAction::List { session } => {
            let rows = match session {
                Some(session_id) => {
                    results::commands::list_session_results(state, session_id).await
                }
                None => results::commands::list_results(state),
            }
            .map_err(|e| anyhow!(e))?;
            if rows.is_empty() {
                println!("no results yet");
            }
            for row in &rows {
                print_result(row);
            }
        }
        ResultsAction::Show { id } => {
            let preview = results::commands::select_result(state, id).map_err(|e| anyhow!(e))?;
            match preview.path {
                Some(path) => println!("{}: {}", preview.video_name, path.display()),
                None => println!("{}: no stored video for this result", preview.video_name),
            }
        }
        ResultsAction::Delete { ids } => {
            let removed = results::commands::delete_results(state, ids.clone())
                .await
                .map_err(|e| anyhow!(e))?;
            println!("deleted {removed} of {} results", ids.len());
        }
        ResultsAction::Export { path, ids } => {
            let summary = results::commands::export_results(state, ids.clone(), path.clone())
                .map_err(|e| anyhow!(e))?;
            println!(
                "wrote {} results to {} ({} deceptive, {} truthful, {} failed)",
                summary.total,
                path.display(),
                summary.deceptive,
                summary.truthful,
                summary.failed
            );
        }
        ResultsAction::Sessions => {
            let sessions = capture::commands::list_capture_sessions(state)
                .await
                .map_err(|e| anyhow!(e))?;
            for session in sessions {
                println!(
                    "{}  {}  {:<11}  {} segments",
                    session.id,
                    session.started_at.format("%Y-%m-%d %H:%M:%S"),
                    session.status.as_str(),
                    session.segments_recorded
                );
            }
        }
    }
    Ok(())
}

async fn run_camera(cli: &Cli, segment_secs: Option<u64>, duration_secs: Option<u64>) -> Result<()> {
    let (sink, mut events) = ChannelEventSink::new();
    let state = initialize(cli, segment_secs, Arc::new(sink)).await?;

    let printer = tokio::spawn(async move {
        while let Some((name, payload)) = events.recv().await {
            print_event(&name, &payload);
        }
    });

    capture::commands::start_camera(&state)
        .await
        .map_err(|e| anyhow!(e))?;
    println!(
        "recording {}s segments, press Ctrl-C to stop",
        state.config.capture.segment_length_secs
    );

    let deadline = async {
        match duration_secs {
            Some(secs) => time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                log_warn!("failed to listen for Ctrl-C: {err}");
            }
        }
        _ = deadline => {}
        _ = wait_until_idle(&state) => {}
    }

    let stopped = capture::commands::stop_camera(&state)
        .await
        .map_err(|e| anyhow!(e))?;
    let progress = results::commands::get_visible_progress(&state).map_err(|e| anyhow!(e))?;
    println!(
        "camera stopped, waiting for {} pending submissions ({progress}%)",
        state.submission.progress().in_flight()
    );
    state.submission.drain().await;
    printer.abort();

    match stopped.last_error {
        Some(error) => Err(anyhow!(error)),
        None => Ok(()),
    }
}

/// Resolves once the controller leaves the session on its own (fatal error).
async fn wait_until_idle(state: &AppState) {
    let mut ticker = time::interval(Duration::from_millis(500));
    loop {
        ticker.tick().await;
        match capture::commands::get_capture_state(state).await {
            Ok(snapshot) if snapshot.status != CaptureStatus::Idle => {}
            _ => break,
        }
    }
}

fn print_result(result: &PredictionResult) {
    println!(
        "{}  {}  {:<28}  {:<9}  {:>4}{}",
        result.id,
        result.time.format("%H:%M:%S"),
        result.video_name,
        result.result.as_str(),
        result.confidence_label(),
        result
            .error
            .as_deref()
            .map(|e| format!("  ({e})"))
            .unwrap_or_default()
    );
}

fn print_event(name: &str, payload: &Value) {
    match name {
        SEGMENT_RECORDED => println!(
            "recorded {} ({} bytes)",
            payload["sourceName"].as_str().unwrap_or("?"),
            payload["sizeBytes"]
        ),
        PREDICTION_COMPLETED => match serde_json::from_value::<PredictionResult>(payload.clone()) {
            Ok(result) => print_result(&result),
            Err(err) => log_warn!("unreadable prediction event: {err}"),
        },
        CAPTURE_ERROR => eprintln!(
            "capture error: {}",
            payload["message"].as_str().unwrap_or("unknown error")
        ),
        _ => {}
    }
}
