//! Response shapes with references resolved

use std::collections::HashMap;

use seatgate_common::db::{Room, Student};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{rooms, students};
use crate::error::ApiResult;

/// Compact room reference embedded in student responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub id: String,
    pub room_number: String,
    pub room_name: String,
}

impl From<&Room> for RoomRef {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            room_number: room.room_number.clone(),
            room_name: room.room_name.clone(),
        }
    }
}

/// Student with its room resolved
#[derive(Debug, Clone, Serialize)]
pub struct StudentView {
    #[serde(flatten)]
    pub student: Student,
    pub room: Option<RoomRef>,
}

/// Room with its current members in seat order
#[derive(Debug, Clone, Serialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: Room,
    pub students: Vec<Student>,
}

pub async fn student_view(db: &SqlitePool, student: Student) -> ApiResult<StudentView> {
    let room = match &student.room_id {
        Some(room_id) => rooms::get_room(db, room_id).await?,
        None => None,
    };
    Ok(StudentView {
        room: room.as_ref().map(RoomRef::from),
        student,
    })
}

/// Resolve rooms for many students with a single room query
pub async fn student_views(db: &SqlitePool, list: Vec<Student>) -> ApiResult<Vec<StudentView>> {
    let by_id: HashMap<String, Room> = rooms::list_rooms(db)
        .await?
        .into_iter()
        .map(|room| (room.id.clone(), room))
        .collect();

    Ok(list
        .into_iter()
        .map(|student| StudentView {
            room: student
                .room_id
                .as_ref()
                .and_then(|id| by_id.get(id))
                .map(RoomRef::from),
            student,
        })
        .collect())
}

pub async fn room_detail(db: &SqlitePool, room: Room) -> ApiResult<RoomDetail> {
    let students = students::list_members(db, &room.id).await?;
    Ok(RoomDetail { room, students })
}
