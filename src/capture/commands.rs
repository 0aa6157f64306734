use crate::{
    capture::{CaptureController, CaptureState, InputMode},
    models::CaptureSessionRecord,
    AppState,
};

fn controller_from_state(state: &AppState) -> CaptureController {
    state.capture.clone()
}

pub async fn get_capture_state(state: &AppState) -> Result<CaptureState, String> {
    Ok(controller_from_state(state).snapshot().await)
}

pub async fn start_camera(state: &AppState) -> Result<CaptureState, String> {
    controller_from_state(state)
        .start_camera()
        .await
        .map_err(|e| e.to_string())
}

pub async fn stop_camera(state: &AppState) -> Result<CaptureState, String> {
    Ok(controller_from_state(state).stop_camera().await)
}

pub async fn set_input_mode(state: &AppState, mode: InputMode) -> Result<CaptureState, String> {
    controller_from_state(state)
        .set_input_mode(mode)
        .await
        .map_err(|e| e.to_string())
}

pub async fn list_capture_sessions(state: &AppState) -> Result<Vec<CaptureSessionRecord>, String> {
    state
        .db
        .list_capture_sessions()
        .await
        .map_err(|e| e.to_string())
}
