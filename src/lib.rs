pub mod capture;
mod cli;
pub mod db;
pub mod events;
pub mod models;
pub mod results;
pub mod settings;
pub mod submission;
pub mod upload;
pub mod utils;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;

use capture::{CaptureController, MediaPlatform};
use db::Database;
use events::SharedEventSink;
use results::{FilePreviewSink, ResultStore};
use settings::{SettingsStore, UserSettings};
use submission::{HttpPredictionApi, PredictionApi, SubmissionClient};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "deeplie";

/// Values supplied on the command line; they win over env vars and the
/// settings file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub api_url: Option<String>,
    pub segment_secs: Option<u64>,
}

impl SettingsOverrides {
    fn apply(&self, settings: &mut UserSettings) -> Result<()> {
        if let Some(url) = &self.api_url {
            settings.api.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = self.segment_secs {
            settings.capture.segment_length_secs = secs;
        }
        settings.validate()
    }
}

pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    /// Effective configuration: settings file, then env, then CLI flags.
    pub config: UserSettings,
    pub results: ResultStore,
    pub submission: SubmissionClient,
    pub capture: CaptureController,
}

impl AppState {
    pub async fn initialize(
        data_dir: &Path,
        overrides: &SettingsOverrides,
        events: SharedEventSink,
        platform: Arc<dyn MediaPlatform>,
    ) -> Result<Self> {
        Self::initialize_with_api(data_dir, overrides, events, platform, None).await
    }

    /// Like `initialize`, but submits through `api` instead of an HTTP client
    /// built from the effective settings.
    pub async fn initialize_with_api(
        data_dir: &Path,
        overrides: &SettingsOverrides,
        events: SharedEventSink,
        platform: Arc<dyn MediaPlatform>,
        api: Option<Arc<dyn PredictionApi>>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let mut config = settings.snapshot();
        config.apply_env_overrides()?;
        overrides.apply(&mut config)?;

        let database = Database::new(data_dir.join("deeplie.sqlite3"))?;

        // Close out capture sessions that were recording when the app last exited.
        let recovered = database.mark_incomplete_sessions_interrupted(Utc::now()).await?;
        if recovered > 0 {
            log_warn!("marked {recovered} unfinished capture sessions as interrupted");
        }

        let preview = Arc::new(FilePreviewSink::new(
            data_dir.join("previews"),
            Arc::clone(&events),
        ));
        let results = ResultStore::new(preview).with_database(database.clone());
        results.load_history().await?;

        let api: Arc<dyn PredictionApi> = match api {
            Some(api) => api,
            None => Arc::new(HttpPredictionApi::new(
                &config.api.base_url,
                config.api.request_timeout(),
            )),
        };
        let submission = SubmissionClient::new(
            api,
            results.clone(),
            Arc::clone(&events),
            config.api.poll_interval(),
        );

        let capture = CaptureController::new(
            platform,
            submission.clone(),
            events,
            config.capture.clone(),
        )
        .with_database(database.clone());

        log_info!(
            "initialized: api {}, {}s segments, history in {}",
            config.api.base_url,
            config.capture.segment_length_secs,
            database.path().display()
        );

        Ok(Self {
            db: database,
            settings,
            config,
            results,
            submission,
            capture,
        })
    }
}

pub fn run() {
    let cli = <cli::Cli as clap::Parser>::parse();
    utils::logging::init(cli.verbose || settings::debug_mode());

    log_info!("DeepLie starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log_error!("failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(cli::dispatch(cli)) {
        log_error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
