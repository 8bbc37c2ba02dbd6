//! Entry verification endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use seatgate_common::api::Principal;
use seatgate_common::db::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::require_role;
use crate::error::{ApiError, ApiResult};
use crate::verification::{DenialReason, VerificationDecision, VerificationStats};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Scanned credential text
    pub qr_data: Option<Value>,
    /// Room the scanner is stationed at
    pub room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub room_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: VerificationStats,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: String,
}

/// HTTP status for a verification decision
pub fn decision_status(decision: &VerificationDecision) -> StatusCode {
    match decision.reason {
        Some(DenialReason::MalformedCredential) => StatusCode::BAD_REQUEST,
        Some(DenialReason::UnknownStudent) => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    }
}

/// POST /api/verification/verify
pub async fn verify_student(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<(StatusCode, Json<VerificationDecision>)> {
    require_role(&principal, &[Role::Admin, Role::Teacher])?;

    let scanned = match req.qr_data {
        None | Some(Value::Null) => {
            return Err(ApiError::Validation("QR data is required".to_string()))
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(ApiError::Validation("QR data is required".to_string()))
        }
        Some(Value::String(s)) => s,
        Some(_) => return Err(ApiError::MalformedCredential),
    };
    let room_id = req
        .room_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let decision = state.verification.verify(&scanned, room_id, &principal).await?;
    Ok((decision_status(&decision), Json(decision)))
}

/// GET /api/verification/stats?roomId=
pub async fn verification_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let room_id = query.room_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let stats = state.verification.stats(room_id).await?;
    Ok(Json(StatsResponse { stats }))
}

/// PUT /api/verification/reset/:student_id
pub async fn reset_verification(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(student_id): Path<String>,
) -> ApiResult<Json<ResetResponse>> {
    require_role(&principal, &[Role::Admin])?;

    state.verification.reset(&student_id).await?;
    Ok(Json(ResetResponse {
        message: "Verification status reset successfully".to_string(),
    }))
}
