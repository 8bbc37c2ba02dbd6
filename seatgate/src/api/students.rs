//! Student registry endpoints

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use seatgate_common::api::Principal;
use seatgate_common::db::{Role, Student};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::require_role;
use super::views::{student_view, student_views, StudentView};
use crate::db::students;
use crate::error::{ApiError, ApiResult};
use crate::import::{import_students, ImportReport, ImportRow};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub rows: Option<Vec<ImportRow>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignedQuery {
    pub exam_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: ImportReport,
}

#[derive(Debug, Serialize)]
pub struct StudentListResponse<T> {
    pub count: usize,
    pub students: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub credential: String,
}

/// POST /api/students/upload
pub async fn upload_students(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<UploadRequest>,
) -> ApiResult<Json<UploadResponse>> {
    require_role(&principal, &[Role::Admin])?;

    let rows = req
        .rows
        .ok_or_else(|| ApiError::Validation("Please provide student rows".to_string()))?;
    let report = import_students(&state.db, &state.bus, &rows).await?;

    Ok(Json(UploadResponse {
        message: format!("Successfully uploaded {} students", report.students_uploaded),
        report,
    }))
}

/// GET /api/students
///
/// Newest first, rooms resolved.
pub async fn list_students(
    State(state): State<AppState>,
) -> ApiResult<Json<StudentListResponse<StudentView>>> {
    let list = students::list_students(&state.db).await?;
    let views = student_views(&state.db, list).await?;
    Ok(Json(StudentListResponse {
        count: views.len(),
        students: views,
    }))
}

/// GET /api/students/unassigned?examName=
pub async fn list_unassigned(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UnassignedQuery>,
) -> ApiResult<Json<StudentListResponse<Student>>> {
    require_role(&principal, &[Role::Admin])?;

    let exam_name = query.exam_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let list = students::list_unassigned(&state.db, exam_name).await?;
    Ok(Json(StudentListResponse {
        count: list.len(),
        students: list,
    }))
}

/// GET /api/students/:id
///
/// Students may only read their own record.
pub async fn get_student(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<StudentView>> {
    if let Some(own_id) = principal.student_id() {
        if own_id != id {
            return Err(ApiError::Forbidden(
                "Students may only view their own record".to_string(),
            ));
        }
    }

    let student = students::get_student(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
    Ok(Json(student_view(&state.db, student).await?))
}

/// DELETE /api/students/:id
pub async fn delete_student(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    require_role(&principal, &[Role::Admin])?;

    if !students::delete_student(&state.db, &id).await? {
        return Err(ApiError::NotFound("Student not found".to_string()));
    }

    info!("Deleted student {}", id);
    Ok(Json(MessageResponse {
        message: "Student deleted successfully".to_string(),
    }))
}

/// POST /api/students/:id/credential
///
/// Re-render the credential from the student's current state.
pub async fn regenerate_credential(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<CredentialResponse>> {
    require_role(&principal, &[Role::Admin])?;

    let credential = state.credentials.issue(&id).await?;
    Ok(Json(CredentialResponse { credential }))
}
