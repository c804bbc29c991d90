use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use cartlock_core::IssueOutcome;
use cartlock_types::{
    ClaimRequest, ClaimResponse, EligibilityResponse, HeartbeatResponse, JobId, JobRequest,
    OkResponse, OpenSessionResponse, SessionId, SessionRequest,
};

use crate::AppState;
use crate::error::ApiError;

const MAX_NONCE_LEN: usize = 256;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Unwrap a JSON body, turning axum's rejection into a `bad_request` body.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

pub(crate) async fn open_session(
    State(state): State<AppState>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<OpenSessionResponse> {
    let target = body(payload)?.parse()?;
    Ok(Json(state.coordinator.open_session(&target)?))
}

pub(crate) async fn heartbeat(
    State(state): State<AppState>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<HeartbeatResponse> {
    let target = body(payload)?.parse()?;
    Ok(Json(state.coordinator.heartbeat(&target)?))
}

pub(crate) async fn stop_session(
    State(state): State<AppState>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<OkResponse> {
    let request = body(payload)?;
    let target = request.parse()?;
    Ok(Json(
        state.coordinator.stop_session(&target, request.release)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EligibilityQuery {
    session_id: Option<String>,
}

pub(crate) async fn eligibility(
    State(state): State<AppState>,
    query: Result<Query<EligibilityQuery>, QueryRejection>,
) -> ApiResult<EligibilityResponse> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let raw = query
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("sessionId is required"))?;
    let session_id = SessionId::parse(&raw).map_err(|err| ApiError::bad_request(err.to_string()))?;

    state
        .coordinator
        .eligibility(&session_id)?
        .map(|verdict| Json(verdict.into()))
        .ok_or(ApiError::SessionNotFound)
}

/// `200` with the job, or `429` with the cadence verdict.
pub(crate) async fn request_job(
    State(state): State<AppState>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let session_id = SessionId::parse(&request.session_id)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let response = match state.coordinator.request_job(&session_id)? {
        IssueOutcome::Issued(job) => Json(job).into_response(),
        IssueOutcome::Throttled(verdict) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(EligibilityResponse::from(verdict)),
        )
            .into_response(),
    };
    Ok(response)
}

pub(crate) async fn claim(
    State(state): State<AppState>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> ApiResult<ClaimResponse> {
    let request = body(payload)?;
    let session_id = SessionId::parse(&request.session_id)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    if request.job_id.is_empty() {
        return Err(ApiError::bad_request("jobId is required"));
    }
    if request.nonce.is_empty() || request.nonce.len() > MAX_NONCE_LEN {
        return Err(ApiError::bad_request(format!(
            "nonce must be 1..={MAX_NONCE_LEN} characters"
        )));
    }

    let job = state
        .coordinator
        .begin_claim(&session_id, &JobId::new(request.job_id))?;
    Ok(Json(ClaimResponse {
        ok: true,
        job_id: job.job_id,
        session_id,
        nonce: request.nonce,
    }))
}

pub(crate) async fn healthz() -> &'static str {
    "ok"
}
