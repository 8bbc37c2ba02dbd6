//! Room registry endpoints and seat allocation

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use seatgate_common::api::Principal;
use seatgate_common::db::{Role, Room};
use seatgate_common::events::ExamEvent;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::required;
use super::views::{room_detail, RoomDetail};
use super::require_role;
use crate::allocator::AllocationOutcome;
use crate::db::{self, rooms, rooms::NewRoom, students};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Upper bound on either grid dimension
pub const MAX_GRID_DIMENSION: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub room_number: Option<String>,
    pub room_name: Option<String>,
    pub rows: Option<i64>,
    pub columns: Option<i64>,
    pub exam_name: Option<String>,
    pub exam_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRequest {
    pub room_id: Option<String>,
    pub student_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub message: String,
    pub room: RoomDetail,
    /// Members whose credential could not be reissued after a rename
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credential_failures: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub count: usize,
    pub rooms: Vec<RoomDetail>,
}

#[derive(Debug, Serialize)]
pub struct RoomDeletedResponse {
    pub message: String,
    pub unassigned: u64,
}

#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub message: String,
    pub allocation: AllocationOutcome,
    pub room: RoomDetail,
}

fn validate_grid(rows: i64, columns: i64) -> ApiResult<()> {
    if rows < 1 || columns < 1 {
        return Err(ApiError::Validation(
            "Rows and columns must be at least 1".to_string(),
        ));
    }
    if rows > MAX_GRID_DIMENSION || columns > MAX_GRID_DIMENSION {
        return Err(ApiError::Validation(format!(
            "Rows and columns must be at most {}",
            MAX_GRID_DIMENSION
        )));
    }
    Ok(())
}

fn room_not_found() -> ApiError {
    ApiError::NotFound("Room not found".to_string())
}

fn duplicate_room() -> ApiError {
    ApiError::Conflict("Room with this number already exists".to_string())
}

/// POST /api/rooms
pub async fn create_room(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<RoomRequest>,
) -> ApiResult<(StatusCode, Json<RoomResponse>)> {
    require_role(&principal, &[Role::Admin])?;

    let (Some(room_number), Some(room_name), Some(rows), Some(columns), Some(exam_name), Some(exam_date)) = (
        required(req.room_number),
        required(req.room_name),
        req.rows,
        req.columns,
        required(req.exam_name),
        required(req.exam_date),
    ) else {
        return Err(ApiError::Validation(
            "Please provide all required fields".to_string(),
        ));
    };
    validate_grid(rows, columns)?;

    if rooms::find_by_number(&state.db, &room_number).await?.is_some() {
        return Err(duplicate_room());
    }

    let new_room = NewRoom {
        room_number,
        room_name,
        rows,
        columns,
        exam_name,
        exam_date,
    };
    let id = seatgate_common::uuid_utils::new_id();
    let now = seatgate_common::time::now();
    rooms::insert_room(&state.db, &id, &new_room, now)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                duplicate_room()
            } else {
                e.into()
            }
        })?;

    let room = rooms::get_room(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::Internal("created room vanished".to_string()))?;

    info!(
        "Created room {} ({}x{}, capacity {})",
        room.room_number, room.rows, room.columns, room.capacity
    );
    state.bus.emit_lossy(ExamEvent::RoomCreated {
        room_id: room.id.clone(),
        room_number: room.room_number.clone(),
        timestamp: now,
    });

    Ok((
        StatusCode::CREATED,
        Json(RoomResponse {
            message: "Room created successfully".to_string(),
            room: RoomDetail {
                room,
                students: Vec::new(),
            },
            credential_failures: Vec::new(),
        }),
    ))
}

/// GET /api/rooms
///
/// Newest first, members resolved.
pub async fn list_rooms(State(state): State<AppState>) -> ApiResult<Json<RoomListResponse>> {
    let list = rooms::list_rooms(&state.db).await?;

    let mut details = Vec::with_capacity(list.len());
    for room in list {
        details.push(room_detail(&state.db, room).await?);
    }

    Ok(Json(RoomListResponse {
        count: details.len(),
        rooms: details,
    }))
}

/// GET /api/rooms/:id
pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RoomDetail>> {
    let room = rooms::get_room(&state.db, &id)
        .await?
        .ok_or_else(room_not_found)?;
    Ok(Json(room_detail(&state.db, room).await?))
}

/// PUT /api/rooms/:id
///
/// Absent fields keep their value. The grid may not shrink below any
/// occupied seat. Renaming the room reissues its members' credentials.
pub async fn update_room(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(req): Json<RoomRequest>,
) -> ApiResult<Json<RoomResponse>> {
    require_role(&principal, &[Role::Admin])?;

    let guard = state.room_locks.lock(&id).await;

    let Some(current) = rooms::get_room(&state.db, &id).await? else {
        drop(guard);
        state.room_locks.forget(&id);
        return Err(room_not_found());
    };

    let updated = NewRoom {
        room_number: required(req.room_number).unwrap_or_else(|| current.room_number.clone()),
        room_name: required(req.room_name).unwrap_or_else(|| current.room_name.clone()),
        rows: req.rows.unwrap_or(current.rows),
        columns: req.columns.unwrap_or(current.columns),
        exam_name: required(req.exam_name).unwrap_or_else(|| current.exam_name.clone()),
        exam_date: required(req.exam_date).unwrap_or_else(|| current.exam_date.clone()),
    };
    validate_grid(updated.rows, updated.columns)?;

    if let Some(other) = rooms::find_by_number(&state.db, &updated.room_number).await? {
        if other.id != id {
            return Err(duplicate_room());
        }
    }

    let members = students::list_members(&state.db, &id).await?;
    if members.len() as i64 > updated.rows * updated.columns {
        return Err(ApiError::Validation(format!(
            "Room has {} seated students; a {}x{} grid is too small",
            members.len(),
            updated.rows,
            updated.columns
        )));
    }
    let resized = Room {
        rows: updated.rows,
        columns: updated.columns,
        capacity: updated.rows * updated.columns,
        ..current.clone()
    };
    let outside = members
        .iter()
        .filter_map(|m| m.seat_position)
        .find(|seat| !resized.contains(*seat));
    if let Some(seat) = outside {
        return Err(ApiError::Validation(format!(
            "Occupied seat {} lies outside a {}x{} grid",
            seat, updated.rows, updated.columns
        )));
    }

    rooms::update_room(&state.db, &id, &updated, seatgate_common::time::now())
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                duplicate_room()
            } else {
                e.into()
            }
        })?;

    let renamed = updated.room_number != current.room_number;
    let mut credential_failures = Vec::new();
    if renamed {
        for member in &members {
            if let Err(e) = state.credentials.issue(&member.id).await {
                warn!("Credential regeneration failed for student {}: {}", member.id, e);
                credential_failures.push(member.id.clone());
            }
        }
    }
    drop(guard);

    let room = rooms::get_room(&state.db, &id)
        .await?
        .ok_or_else(room_not_found)?;
    info!("Updated room {} (capacity {})", room.room_number, room.capacity);
    if renamed {
        info!(
            "Reissued {} of {} credentials for room {}",
            members.len() - credential_failures.len(),
            members.len(),
            room.room_number
        );
    }

    Ok(Json(RoomResponse {
        message: "Room updated successfully".to_string(),
        room: room_detail(&state.db, room).await?,
        credential_failures,
    }))
}

/// DELETE /api/rooms/:id
///
/// Members are unassigned and lose their credential.
pub async fn delete_room(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<RoomDeletedResponse>> {
    require_role(&principal, &[Role::Admin])?;

    let guard = state.room_locks.lock(&id).await;

    let Some(room) = rooms::get_room(&state.db, &id).await? else {
        drop(guard);
        state.room_locks.forget(&id);
        return Err(room_not_found());
    };

    let now = seatgate_common::time::now();
    let unassigned = rooms::delete_room_cascade(&state.db, &id, now).await?;
    drop(guard);
    state.room_locks.forget(&id);

    info!("Deleted room {}, unassigned {} students", room.room_number, unassigned);
    state.bus.emit_lossy(ExamEvent::RoomDeleted {
        room_id: room.id,
        room_number: room.room_number,
        unassigned,
        timestamp: now,
    });

    Ok(Json(RoomDeletedResponse {
        message: "Room deleted successfully".to_string(),
        unassigned,
    }))
}

/// POST /api/rooms/allocate
pub async fn allocate_seats(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AllocateRequest>,
) -> ApiResult<Json<AllocationResponse>> {
    require_role(&principal, &[Role::Admin])?;

    let (Some(room_id), Some(student_ids)) = (required(req.room_id), req.student_ids) else {
        return Err(ApiError::Validation(
            "Please provide room ID and student IDs".to_string(),
        ));
    };

    let allocation = state.allocator.allocate(&room_id, &student_ids).await?;

    let room = rooms::get_room(&state.db, &room_id)
        .await?
        .ok_or_else(room_not_found)?;

    Ok(Json(AllocationResponse {
        message: format!(
            "Successfully allocated {} students to room {}",
            allocation.placements.len(),
            allocation.room_number
        ),
        allocation,
        room: room_detail(&state.db, room).await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_grid_bounds() {
        assert!(validate_grid(1, 1).is_ok());
        assert!(validate_grid(MAX_GRID_DIMENSION, 2).is_ok());
        assert!(matches!(validate_grid(0, 3), Err(ApiError::Validation(_))));
        assert!(matches!(validate_grid(3, -1), Err(ApiError::Validation(_))));
        assert!(matches!(
            validate_grid(MAX_GRID_DIMENSION + 1, 1),
            Err(ApiError::Validation(_))
        ));
    }
}
