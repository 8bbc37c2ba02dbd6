//! Account registration, login and the current-session endpoint

use axum::{extract::State, http::StatusCode, Extension, Json};
use seatgate_common::api::{hash_password, verify_password, Principal};
use seatgate_common::db::{Role, User};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::required;
use super::views::{student_view, StudentView};
use crate::db::{self, students, students::NewStudent, users};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_CLASS: &str = "Not Assigned";
const PENDING_EXAM: &str = "Pending Assignment";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSignupRequest {
    pub roll_number: Option<String>,
    pub name: Option<String>,
    pub dob: Option<String>,
    pub class_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentLoginRequest {
    pub roll_number: Option<String>,
    pub dob: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserSession {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct StudentSession {
    pub token: String,
    pub student: StudentView,
}

/// Session subject as returned by `/api/auth/me`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Me {
    User { user: User },
    Student { student: StudentView },
}

/// POST /api/auth/register
///
/// Creates an admin or teacher account. Students sign up separately.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserSession>)> {
    let (Some(email), Some(password), Some(name), Some(role)) = (
        required(req.email),
        req.password.filter(|p| !p.is_empty()),
        required(req.name),
        required(req.role),
    ) else {
        return Err(ApiError::Validation(
            "Please provide all required fields".to_string(),
        ));
    };

    let role = match role.parse::<Role>() {
        Ok(role @ (Role::Admin | Role::Teacher)) => role,
        _ => {
            return Err(ApiError::Validation(
                "Invalid role. Only admin and teacher can register here.".to_string(),
            ))
        }
    };

    let email = email.to_lowercase();
    let duplicate = || ApiError::Conflict("User already exists with this email".to_string());
    if users::find_by_email(&state.db, &email).await?.is_some() {
        return Err(duplicate());
    }

    let password_hash = hash_password(&password)?;
    let id = seatgate_common::uuid_utils::new_id();
    users::insert_user(
        &state.db,
        &id,
        &email,
        &name,
        &password_hash,
        role,
        seatgate_common::time::now(),
    )
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            duplicate()
        } else {
            e.into()
        }
    })?;

    let user = users::get_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::Internal("registered user vanished".to_string()))?;
    let token = state.tokens.issue(&user.id, user.role, &user.name)?;

    info!("Registered {} account {}", user.role, user.email);
    Ok((StatusCode::CREATED, Json(UserSession { token, user })))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<UserSession>> {
    let (Some(email), Some(password)) = (required(req.email), req.password) else {
        return Err(ApiError::Validation(
            "Please provide email and password".to_string(),
        ));
    };

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());
    let user = users::find_by_email(&state.db, &email.to_lowercase())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&password, &user.password_hash) {
        return Err(invalid());
    }

    let token = state.tokens.issue(&user.id, user.role, &user.name)?;
    Ok(Json(UserSession { token, user }))
}

/// POST /api/auth/student-signup
pub async fn student_signup(
    State(state): State<AppState>,
    Json(req): Json<StudentSignupRequest>,
) -> ApiResult<(StatusCode, Json<StudentSession>)> {
    let (Some(roll_number), Some(name), Some(dob)) =
        (required(req.roll_number), required(req.name), required(req.dob))
    else {
        return Err(ApiError::Validation(
            "Please provide roll number, name, and date of birth".to_string(),
        ));
    };

    let duplicate = || ApiError::Conflict("Student with this roll number already exists".to_string());
    if students::find_by_roll_number(&state.db, &roll_number).await?.is_some() {
        return Err(duplicate());
    }

    let new_student = NewStudent {
        roll_number,
        name,
        class_name: required(req.class_name).unwrap_or_else(|| DEFAULT_CLASS.to_string()),
        dob,
        email: required(req.email).unwrap_or_default().to_lowercase(),
        phone: required(req.phone).unwrap_or_default(),
        exam_name: PENDING_EXAM.to_string(),
        exam_date: seatgate_common::time::today(),
    };

    let id = seatgate_common::uuid_utils::new_id();
    students::insert_student(&state.db, &id, &new_student, seatgate_common::time::now())
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                duplicate()
            } else {
                e.into()
            }
        })?;

    let student = students::get_student(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::Internal("registered student vanished".to_string()))?;
    let token = state.tokens.issue(&student.id, Role::Student, &student.name)?;

    info!("Student {} signed up", student.roll_number);
    Ok((
        StatusCode::CREATED,
        Json(StudentSession {
            token,
            student: StudentView {
                student,
                room: None,
            },
        }),
    ))
}

/// POST /api/auth/student-login
///
/// Roll number plus date of birth.
pub async fn student_login(
    State(state): State<AppState>,
    Json(req): Json<StudentLoginRequest>,
) -> ApiResult<Json<StudentSession>> {
    let (Some(roll_number), Some(dob)) = (required(req.roll_number), required(req.dob)) else {
        return Err(ApiError::Validation(
            "Please provide roll number and date of birth".to_string(),
        ));
    };

    let student = students::find_by_login(&state.db, &roll_number, &dob)
        .await?
        .ok_or_else(|| {
            ApiError::Unauthorized("Invalid credentials or student not found".to_string())
        })?;

    let token = state.tokens.issue(&student.id, Role::Student, &student.name)?;
    let student = student_view(&state.db, student).await?;
    Ok(Json(StudentSession { token, student }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Me>> {
    if let Some(student_id) = principal.student_id() {
        let student = students::get_student(&state.db, student_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
        let student = student_view(&state.db, student).await?;
        return Ok(Json(Me::Student { student }));
    }

    let user = users::get_user(&state.db, &principal.subject)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(Me::User { user }))
}
