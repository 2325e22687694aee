use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::error::ApiError,
    controller::{AppState, ControllerStatus},
    domain::{tariff::TariffWindow, types::ClockTime},
    scheduler::ChargePlan,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/plan", get(get_plan))
        .route("/target", put(set_target))
        .route("/ready-by", put(set_ready_by))
        .route("/window", put(set_window))
        .route("/charge/start", post(start_charge))
        .route("/charge/stop", post(stop_charge))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn get_status(State(st): State<AppState>) -> Json<ControllerStatus> {
    Json(st.controller.status().await)
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub plan: Option<ChargePlan>,
}

pub async fn get_plan(State(st): State<AppState>) -> Json<PlanResponse> {
    Json(PlanResponse {
        plan: st.controller.current_plan().await,
    })
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetTargetRequest {
    /// Absolute target SoC the next session charges to
    #[validate(range(min = 20.0, max = 100.0))]
    pub target_soc_percent: f64,
}

pub async fn set_target(
    State(st): State<AppState>,
    Json(req): Json<SetTargetRequest>,
) -> Result<StatusCode, ApiError> {
    req.validate()?;
    st.controller.set_target_soc(req.target_soc_percent).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SetReadyByRequest {
    /// "HH:MM", or null to clear the deadline
    pub ready_by: Option<String>,
}

pub async fn set_ready_by(
    State(st): State<AppState>,
    Json(req): Json<SetReadyByRequest>,
) -> Result<StatusCode, ApiError> {
    let ready_by = req
        .ready_by
        .as_deref()
        .map(str::parse::<ClockTime>)
        .transpose()?;
    st.controller.set_ready_by(ready_by).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetWindowRequest {
    pub cheap_start: String,
    pub cheap_end: String,
    #[validate(range(min = 0.0))]
    pub cheap_rate_per_kwh: f64,
    #[validate(range(min = 0.0))]
    pub standard_rate_per_kwh: f64,
}

pub async fn set_window(
    State(st): State<AppState>,
    Json(req): Json<SetWindowRequest>,
) -> Result<StatusCode, ApiError> {
    req.validate()?;
    let window = TariffWindow {
        cheap_start: req.cheap_start.parse::<ClockTime>()?,
        cheap_end: req.cheap_end.parse::<ClockTime>()?,
        cheap_rate_per_kwh: req.cheap_rate_per_kwh,
        standard_rate_per_kwh: req.standard_rate_per_kwh,
    };
    st.controller.set_tariff_window(window).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_charge(State(st): State<AppState>) -> Result<StatusCode, ApiError> {
    st.controller
        .start_manual_charge()
        .await
        .map_err(|e| ApiError::VehicleError(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop_charge(State(st): State<AppState>) -> Result<StatusCode, ApiError> {
    st.controller
        .stop_charge()
        .await
        .map_err(|e| ApiError::VehicleError(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::recovery::SessionState;

    #[test]
    fn test_status_serializes_for_clients() {
        let status = ControllerStatus {
            observed_at: None,
            plugged_in: Some(true),
            charging: Some(false),
            soc_percent: Some(64.5),
            session_state: SessionState::Idle,
            attempt_count: 0,
            manual_override: false,
            plan: None,
            target_soc_percent: 80.0,
            ready_by: Some("07:30".to_string()),
            cheap_window: "23:30-05:30".to_string(),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["session_state"], "Idle");
        assert_eq!(value["target_soc_percent"], 80.0);
        assert_eq!(value["cheap_window"], "23:30-05:30");
        assert!(value["plan"].is_null());
    }

    #[test]
    fn test_target_request_validation() {
        let ok: SetTargetRequest =
            serde_json::from_str(r#"{"target_soc_percent": 80.0}"#).unwrap();
        assert!(ok.validate().is_ok());

        let low: SetTargetRequest =
            serde_json::from_str(r#"{"target_soc_percent": 10.0}"#).unwrap();
        assert!(low.validate().is_err());
    }

    #[test]
    fn test_window_request_rejects_bad_times() {
        let req: SetWindowRequest = serde_json::from_str(
            r#"{"cheap_start":"23:70","cheap_end":"05:30","cheap_rate_per_kwh":0.075,"standard_rate_per_kwh":0.30}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert!(req.cheap_start.parse::<ClockTime>().is_err());
    }
}
