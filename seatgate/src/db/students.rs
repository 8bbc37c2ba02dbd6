//! Student queries
//!
//! Assignment and verification writes are conditional updates: they only
//! take effect when the row is still in the state the caller observed, and
//! report whether they did.

use chrono::{DateTime, Utc};
use seatgate_common::db::{SeatPosition, Student, StudentRow};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const STUDENT_COLUMNS: &str = "id, roll_number, name, class_name, dob, email, phone, exam_name, \
                               exam_date, room_id, seat_row, seat_column, credential, is_verified, \
                               verified_at, verified_by, created_at, updated_at";

/// Validated input for a new student
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub roll_number: String,
    pub name: String,
    pub class_name: String,
    pub dob: String,
    pub email: String,
    pub phone: String,
    pub exam_name: String,
    pub exam_date: String,
}

/// Insert an unassigned, unverified student
pub async fn insert_student(
    pool: &SqlitePool,
    id: &str,
    student: &NewStudent,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO students (id, roll_number, name, class_name, dob, email, phone,
                              exam_name, exam_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&student.roll_number)
    .bind(&student.name)
    .bind(&student.class_name)
    .bind(&student.dob)
    .bind(&student.email)
    .bind(&student.phone)
    .bind(&student.exam_name)
    .bind(&student.exam_date)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_student(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<Student>> {
    let row = sqlx::query_as::<_, StudentRow>(&format!(
        "SELECT {} FROM students WHERE id = ?",
        STUDENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

pub async fn find_by_roll_number(pool: &SqlitePool, roll_number: &str) -> sqlx::Result<Option<Student>> {
    let row = sqlx::query_as::<_, StudentRow>(&format!(
        "SELECT {} FROM students WHERE roll_number = ?",
        STUDENT_COLUMNS
    ))
    .bind(roll_number)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

/// Student self-service login lookup (roll number + date of birth)
pub async fn find_by_login(pool: &SqlitePool, roll_number: &str, dob: &str) -> sqlx::Result<Option<Student>> {
    let row = sqlx::query_as::<_, StudentRow>(&format!(
        "SELECT {} FROM students WHERE roll_number = ? AND dob = ?",
        STUDENT_COLUMNS
    ))
    .bind(roll_number)
    .bind(dob)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

/// All students, newest first
pub async fn list_students(pool: &SqlitePool) -> sqlx::Result<Vec<Student>> {
    let rows = sqlx::query_as::<_, StudentRow>(&format!(
        "SELECT {} FROM students ORDER BY created_at DESC, rowid DESC",
        STUDENT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Student::from).collect())
}

/// Students without a room, optionally for one exam, by roll number
pub async fn list_unassigned(pool: &SqlitePool, exam_name: Option<&str>) -> sqlx::Result<Vec<Student>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM students WHERE room_id IS NULL",
        STUDENT_COLUMNS
    ));
    if let Some(exam_name) = exam_name {
        qb.push(" AND exam_name = ").push_bind(exam_name);
    }
    qb.push(" ORDER BY roll_number ASC");

    let rows = qb.build_query_as::<StudentRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Student::from).collect())
}

/// Current members of a room in seat order
pub async fn list_members(pool: &SqlitePool, room_id: &str) -> sqlx::Result<Vec<Student>> {
    let rows = sqlx::query_as::<_, StudentRow>(&format!(
        "SELECT {} FROM students WHERE room_id = ? ORDER BY seat_row ASC, seat_column ASC",
        STUDENT_COLUMNS
    ))
    .bind(room_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Student::from).collect())
}

/// Students matching `ids`; missing ids are simply absent from the result
pub async fn get_students_by_ids(pool: &SqlitePool, ids: &[String]) -> sqlx::Result<Vec<Student>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM students WHERE id IN (", STUDENT_COLUMNS));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = qb.build_query_as::<StudentRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Student::from).collect())
}

/// Place a student, only if still unassigned
///
/// Returns `false` when the student was assigned (or deleted) in the
/// meantime. The seat index rejects a collision with a UNIQUE violation.
pub async fn assign_seat(
    pool: &SqlitePool,
    student_id: &str,
    room_id: &str,
    seat: SeatPosition,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE students
        SET room_id = ?, seat_row = ?, seat_column = ?, updated_at = ?
        WHERE id = ? AND room_id IS NULL
        "#,
    )
    .bind(room_id)
    .bind(i64::from(seat.row))
    .bind(i64::from(seat.column))
    .bind(now)
    .bind(student_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Store (or clear) the rendered credential artifact
pub async fn set_credential(
    pool: &SqlitePool,
    student_id: &str,
    credential: Option<&str>,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE students SET credential = ?, updated_at = ? WHERE id = ?")
        .bind(credential)
        .bind(now)
        .bind(student_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Commit the unverified → verified transition
///
/// Only succeeds while the student is unverified and still seated in
/// `room_id`; a concurrent verifier or a reassignment makes it return
/// `false`.
pub async fn mark_verified(
    pool: &SqlitePool,
    student_id: &str,
    room_id: &str,
    verified_by: &str,
    at: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE students
        SET is_verified = 1, verified_at = ?, verified_by = ?, updated_at = ?
        WHERE id = ? AND is_verified = 0 AND room_id = ?
          AND seat_row IS NOT NULL AND seat_column IS NOT NULL
        "#,
    )
    .bind(at)
    .bind(verified_by)
    .bind(at)
    .bind(student_id)
    .bind(room_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Clear verification state unconditionally; `false` if the student is absent
pub async fn reset_verification(pool: &SqlitePool, student_id: &str, now: DateTime<Utc>) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE students
        SET is_verified = 0, verified_at = NULL, verified_by = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(student_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a student; room membership disappears with the row
pub async fn delete_student(pool: &SqlitePool, student_id: &str) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(student_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// (total, verified) counts, optionally scoped to one room
pub async fn verification_counts(pool: &SqlitePool, room_id: Option<&str>) -> sqlx::Result<(i64, i64)> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_verified = 1 THEN 1 ELSE 0 END), 0) FROM students",
    );
    if let Some(room_id) = room_id {
        qb.push(" WHERE room_id = ").push_bind(room_id);
    }

    qb.build_query_as::<(i64, i64)>().fetch_one(pool).await
}
