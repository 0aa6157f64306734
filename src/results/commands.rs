use std::path::PathBuf;

use crate::{
    models::PredictionResult,
    results::{export::ReportSummary, PreviewSource},
    upload::handle_file_select,
    AppState,
};

/// Validate a user-selected file and run it through the prediction service.
/// Rejected files never reach the network.
pub async fn submit_file(state: &AppState, path: PathBuf) -> Result<PredictionResult, String> {
    let max_bytes = state.config.api.max_upload_bytes;
    let segment = handle_file_select(&path, max_bytes)
        .await
        .map_err(|e| e.to_string())?;
    Ok(state.submission.submit(segment).await)
}

pub fn list_results(state: &AppState) -> Result<Vec<PredictionResult>, String> {
    Ok(state.results.list())
}

pub async fn list_session_results(
    state: &AppState,
    session_id: &str,
) -> Result<Vec<PredictionResult>, String> {
    state
        .db
        .get_predictions_for_session(session_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn delete_results(state: &AppState, ids: Vec<String>) -> Result<usize, String> {
    state.results.delete(&ids).await.map_err(|e| e.to_string())
}

pub fn select_result(state: &AppState, id: &str) -> Result<PreviewSource, String> {
    state.results.select(id).map_err(|e| e.to_string())
}

pub fn clear_selection(state: &AppState) -> Result<(), String> {
    state.results.clear_selection();
    Ok(())
}

pub fn export_results(
    state: &AppState,
    ids: Vec<String>,
    path: PathBuf,
) -> Result<ReportSummary, String> {
    state.results.export(&ids, &path).map_err(|e| e.to_string())
}

pub fn get_visible_progress(state: &AppState) -> Result<u8, String> {
    Ok(state.submission.progress().visible_progress())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::capture::platform::fakes::FakePlatform;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::events::LogEventSink;
    use crate::submission::client::tests::FakeApi;
    use crate::submission::{PredictResponse, PredictionApi};
    use crate::SettingsOverrides;

    async fn app_state_with_api(dir: &std::path::Path) -> (AppState, Arc<FakeApi>) {
        let api = Arc::new(FakeApi::new(
            Duration::from_millis(10),
            Ok(PredictResponse {
                prediction: vec![0.4],
                ..Default::default()
            }),
        ));
        let state = AppState::initialize_with_api(
            dir,
            &SettingsOverrides::default(),
            Arc::new(LogEventSink),
            Arc::new(FakePlatform::new()),
            Some(api.clone() as Arc<dyn PredictionApi>),
        )
        .await
        .unwrap();
        (state, api)
    }

    async fn app_state(dir: &std::path::Path) -> AppState {
        app_state_with_api(dir).await.0
    }

    #[tokio::test]
    async fn oversized_upload_never_reaches_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let (state, api) = app_state_with_api(dir.path()).await;
        let path = dir.path().join("long-interview.mp4");
        std::fs::File::create(&path)
            .unwrap()
            .set_len(150 * 1024 * 1024)
            .unwrap();

        let err = submit_file(&state, path).await.unwrap_err();

        assert_eq!(err, "File is too large. Please select a video under 100MB.");
        assert!(state.results.is_empty());
        assert_eq!(api.predict_calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.submission.progress().in_flight(), 0);
    }

    #[tokio::test]
    async fn non_video_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path()).await;
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let err = submit_file(&state, path).await.unwrap_err();

        assert_eq!(err, "Please select a valid video file.");
        assert!(list_results(&state).unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_upload_is_submitted_once() {
        let dir = tempfile::tempdir().unwrap();
        let (state, api) = app_state_with_api(dir.path()).await;
        let path = dir.path().join("answer.webm");
        std::fs::write(&path, vec![7u8; 256]).unwrap();

        let result = submit_file(&state, path).await.unwrap();

        assert_eq!(api.predict_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.video_name, "answer.webm");
        assert_eq!(list_results(&state).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn selecting_and_clearing_a_result() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path()).await;
        let segment =
            crate::models::VideoSegment::from_upload(vec![9; 16], "video/mp4", "answer.mp4");
        let row = PredictionResult::failed(&segment, "network error");
        state.results.append(row.clone()).await;

        let preview = select_result(&state, &row.id).unwrap();
        assert_eq!(preview.video_name, "answer.mp4");
        assert!(preview.path.unwrap().starts_with(dir.path().join("previews")));
        assert_eq!(state.results.selected(), Some(row.id.clone()));

        clear_selection(&state).unwrap();
        assert_eq!(state.results.selected(), None);

        assert_eq!(delete_results(&state, vec![row.id]).await.unwrap(), 1);
        assert!(state.db.list_predictions().await.unwrap().is_empty());
    }
}
