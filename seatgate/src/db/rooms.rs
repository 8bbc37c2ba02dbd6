//! Room queries

use chrono::{DateTime, Utc};
use seatgate_common::db::Room;
use sqlx::SqlitePool;

const ROOM_COLUMNS: &str = "id, room_number, room_name, grid_rows, grid_columns, capacity, \
                            exam_name, exam_date, is_active, created_at, updated_at";

/// Validated input for a new room
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub room_number: String,
    pub room_name: String,
    pub rows: i64,
    pub columns: i64,
    pub exam_name: String,
    pub exam_date: String,
}

/// Insert a room; capacity is derived from the grid
pub async fn insert_room(pool: &SqlitePool, id: &str, room: &NewRoom, now: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO rooms (id, room_number, room_name, grid_rows, grid_columns, capacity,
                           exam_name, exam_date, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&room.room_number)
    .bind(&room.room_name)
    .bind(room.rows)
    .bind(room.columns)
    .bind(room.rows * room.columns)
    .bind(&room.exam_name)
    .bind(&room.exam_date)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_room(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<Room>> {
    sqlx::query_as::<_, Room>(&format!("SELECT {} FROM rooms WHERE id = ?", ROOM_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_number(pool: &SqlitePool, room_number: &str) -> sqlx::Result<Option<Room>> {
    sqlx::query_as::<_, Room>(&format!(
        "SELECT {} FROM rooms WHERE room_number = ?",
        ROOM_COLUMNS
    ))
    .bind(room_number)
    .fetch_optional(pool)
    .await
}

/// All rooms, newest first
pub async fn list_rooms(pool: &SqlitePool) -> sqlx::Result<Vec<Room>> {
    sqlx::query_as::<_, Room>(&format!(
        "SELECT {} FROM rooms ORDER BY created_at DESC, rowid DESC",
        ROOM_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// Overwrite the editable fields of a room, recomputing capacity
pub async fn update_room(pool: &SqlitePool, id: &str, room: &NewRoom, now: DateTime<Utc>) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE rooms
        SET room_number = ?, room_name = ?, grid_rows = ?, grid_columns = ?, capacity = ?,
            exam_name = ?, exam_date = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&room.room_number)
    .bind(&room.room_name)
    .bind(room.rows)
    .bind(room.columns)
    .bind(room.rows * room.columns)
    .bind(&room.exam_name)
    .bind(&room.exam_date)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Unassign every member, then delete the room, in one transaction
///
/// Returns the number of students that lost their seat.
pub async fn delete_room_cascade(pool: &SqlitePool, id: &str, now: DateTime<Utc>) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;

    let unassigned = sqlx::query(
        r#"
        UPDATE students
        SET room_id = NULL, seat_row = NULL, seat_column = NULL, credential = NULL, updated_at = ?
        WHERE room_id = ?
        "#,
    )
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query("DELETE FROM rooms WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(unassigned)
}
