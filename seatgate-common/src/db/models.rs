//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Caller role carried by every session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A (row, column) coordinate inside a room grid, both 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatPosition {
    pub row: u32,
    pub column: u32,
}

impl SeatPosition {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl std::fmt::Display for SeatPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}, Column {}", self.row, self.column)
    }
}

/// Exam room with a rows × columns seat grid
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub room_number: String,
    pub room_name: String,
    #[sqlx(rename = "grid_rows")]
    pub rows: i64,
    #[sqlx(rename = "grid_columns")]
    pub columns: i64,
    /// Always `rows * columns`
    pub capacity: i64,
    pub exam_name: String,
    pub exam_date: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn contains(&self, seat: SeatPosition) -> bool {
        seat.row >= 1
            && seat.column >= 1
            && i64::from(seat.row) <= self.rows
            && i64::from(seat.column) <= self.columns
    }
}

/// Flat `students` row as stored
#[derive(Debug, Clone, FromRow)]
pub struct StudentRow {
    pub id: String,
    pub roll_number: String,
    pub name: String,
    pub class_name: String,
    pub dob: String,
    pub email: String,
    pub phone: String,
    pub exam_name: String,
    pub exam_date: String,
    pub room_id: Option<String>,
    pub seat_row: Option<i64>,
    pub seat_column: Option<i64>,
    pub credential: Option<String>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Student record with the seat folded into a single optional position
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub roll_number: String,
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    /// Doubles as the student's login secret
    #[serde(skip_serializing)]
    pub dob: String,
    pub email: String,
    pub phone: String,
    pub exam_name: String,
    pub exam_date: String,
    pub room_id: Option<String>,
    pub seat_position: Option<SeatPosition>,
    pub credential: Option<String>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Room and seat, only when both are present
    pub fn assignment(&self) -> Option<(&str, SeatPosition)> {
        match (&self.room_id, self.seat_position) {
            (Some(room_id), Some(seat)) => Some((room_id.as_str(), seat)),
            _ => None,
        }
    }
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        let seat_position = match (row.seat_row, row.seat_column) {
            (Some(r), Some(c)) => match (u32::try_from(r), u32::try_from(c)) {
                (Ok(r), Ok(c)) => Some(SeatPosition::new(r, c)),
                _ => None,
            },
            _ => None,
        };

        Self {
            id: row.id,
            roll_number: row.roll_number,
            name: row.name,
            class_name: row.class_name,
            dob: row.dob,
            email: row.email,
            phone: row.phone,
            exam_name: row.exam_name,
            exam_date: row.exam_date,
            room_id: row.room_id,
            seat_position,
            credential: row.credential,
            is_verified: row.is_verified,
            verified_at: row.verified_at,
            verified_by: row.verified_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Admin or teacher account
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> StudentRow {
        let now = Utc::now();
        StudentRow {
            id: "s1".to_string(),
            roll_number: "R001".to_string(),
            name: "Asha".to_string(),
            class_name: "10A".to_string(),
            dob: "2008-04-01".to_string(),
            email: String::new(),
            phone: String::new(),
            exam_name: "Physics".to_string(),
            exam_date: "2026-11-02".to_string(),
            room_id: None,
            seat_row: None,
            seat_column: None,
            credential: None,
            is_verified: false,
            verified_at: None,
            verified_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_unassigned_row_has_no_seat() {
        let student = Student::from(row());
        assert!(student.seat_position.is_none());
        assert!(student.assignment().is_none());
    }

    #[test]
    fn test_assigned_row_folds_seat() {
        let mut r = row();
        r.room_id = Some("room-1".to_string());
        r.seat_row = Some(2);
        r.seat_column = Some(3);

        let student = Student::from(r);
        assert_eq!(student.assignment(), Some(("room-1", SeatPosition::new(2, 3))));
    }

    #[test]
    fn test_student_json_hides_dob() {
        let json = serde_json::to_value(Student::from(row())).unwrap();
        assert!(json.get("dob").is_none());
        assert_eq!(json["class"], "10A");
        assert_eq!(json["rollNumber"], "R001");
        assert!(json["seatPosition"].is_null());
    }

    #[test]
    fn test_seat_display() {
        assert_eq!(SeatPosition::new(1, 4).to_string(), "Row 1, Column 4");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert!("root".parse::<Role>().is_err());
    }
}
