//! Bulk student import
//!
//! Each row is validated and inserted on its own; a bad row is reported
//! and skipped without affecting the others. Row numbers in the report
//! follow spreadsheet numbering (header on row 1, first record on row 2).

use seatgate_common::events::{EventBus, ExamEvent};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::{self, students, students::NewStudent};
use crate::error::{ApiError, ApiResult};

/// One imported record as received (column name → cell)
pub type ImportRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub students_uploaded: usize,
    /// `None` when every row was accepted
    pub errors: Option<Vec<String>>,
}

/// Cell as trimmed text; numbers are accepted and stringified
fn cell(row: &ImportRow, key: &str) -> Option<String> {
    let text = match row.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Required fields of a row, or `None` if any is missing
pub fn parse_row(row: &ImportRow) -> Option<NewStudent> {
    Some(NewStudent {
        roll_number: cell(row, "rollNumber")?,
        name: cell(row, "name")?,
        class_name: cell(row, "class")?,
        dob: cell(row, "dob")?,
        email: cell(row, "email").unwrap_or_default().to_lowercase(),
        phone: cell(row, "phone").unwrap_or_default(),
        exam_name: cell(row, "examName")?,
        exam_date: cell(row, "examDate")?,
    })
}

/// Insert every valid row, collecting per-row errors
pub async fn import_students(db: &SqlitePool, bus: &EventBus, rows: &[ImportRow]) -> ApiResult<ImportReport> {
    if rows.is_empty() {
        return Err(ApiError::Validation("Student list is empty".to_string()));
    }

    let mut uploaded = 0usize;
    let mut errors = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let line = index + 2;

        let Some(student) = parse_row(row) else {
            errors.push(format!("Row {}: Missing required fields", line));
            continue;
        };

        let duplicate = format!(
            "Row {}: Student with roll number {} already exists",
            line, student.roll_number
        );
        match students::find_by_roll_number(db, &student.roll_number).await {
            Ok(Some(_)) => {
                errors.push(duplicate);
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                errors.push(format!("Row {}: {}", line, e));
                continue;
            }
        }

        let id = seatgate_common::uuid_utils::new_id();
        match students::insert_student(db, &id, &student, seatgate_common::time::now()).await {
            Ok(()) => uploaded += 1,
            Err(e) if db::is_unique_violation(&e) => errors.push(duplicate),
            Err(e) => errors.push(format!("Row {}: {}", line, e)),
        }
    }

    if errors.is_empty() {
        info!("Imported {} students", uploaded);
    } else {
        warn!("Imported {} students, rejected {} rows", uploaded, errors.len());
    }

    bus.emit_lossy(ExamEvent::StudentsImported {
        imported: uploaded as u64,
        rejected: errors.len() as u64,
        timestamp: seatgate_common::time::now(),
    });

    Ok(ImportReport {
        students_uploaded: uploaded,
        errors: (!errors.is_empty()).then_some(errors),
    })
}
