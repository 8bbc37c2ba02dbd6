//! Entry verification
//!
//! A scan is decoded, the student is resolved, and the first matching
//! denial wins in this order: already verified, wrong room, no seat. Only
//! a scan that passes all three commits the unverified → verified
//! transition, and that commit is a conditional update so exactly one of
//! several concurrent scans can succeed.

use chrono::{DateTime, Utc};
use seatgate_common::api::Principal;
use seatgate_common::db::{Room, Student};
use seatgate_common::events::{EventBus, ExamEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::credential;
use crate::db::{rooms, students};
use crate::error::{ApiError, ApiResult};

/// Attempts before giving up on a student whose state keeps changing
const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    MalformedCredential,
    UnknownStudent,
    AlreadyVerified,
    WrongRoom,
    SeatNotAssigned,
}

impl DenialReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenialReason::MalformedCredential => "Invalid QR code format",
            DenialReason::UnknownStudent => "Student not found",
            DenialReason::AlreadyVerified => "Student already entered",
            DenialReason::WrongRoom => "Wrong room",
            DenialReason::SeatNotAssigned => "Seat not assigned",
        }
    }
}

/// Student fields echoed back to the scanning operator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub roll_number: String,
    pub name: String,
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_room: Option<String>,
}

/// Outcome of one scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentSummary>,
}

impl VerificationDecision {
    fn denied(reason: DenialReason, detail: Option<String>, student: Option<StudentSummary>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            message: reason.message().to_string(),
            detail,
            student,
        }
    }
}

/// Room-wide or global admission counts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStats {
    pub total: i64,
    pub verified: i64,
    pub pending: i64,
    /// Verified share in percent, two decimals; 0 when there are no students
    pub percentage: f64,
}

impl VerificationStats {
    pub fn from_counts(total: i64, verified: i64) -> Self {
        let percentage = if total > 0 {
            ((verified as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            total,
            verified,
            pending: total - verified,
            percentage,
        }
    }
}

/// First applicable denial for `student`, or `None` when entry is allowed
///
/// `room` is the student's assigned room, if any.
pub fn evaluate(
    student: &Student,
    room: Option<&Room>,
    context_room: Option<&str>,
) -> Option<VerificationDecision> {
    if student.is_verified {
        return Some(VerificationDecision::denied(
            DenialReason::AlreadyVerified,
            None,
            Some(StudentSummary {
                roll_number: student.roll_number.clone(),
                name: student.name.clone(),
                verified_at: student.verified_at,
                ..Default::default()
            }),
        ));
    }

    if let (Some(expected), Some(room)) = (context_room, room) {
        if room.id != expected {
            return Some(VerificationDecision::denied(
                DenialReason::WrongRoom,
                Some(format!("Student assigned to Room {}", room.room_number)),
                Some(StudentSummary {
                    roll_number: student.roll_number.clone(),
                    name: student.name.clone(),
                    assigned_room: Some(room.room_number.clone()),
                    ..Default::default()
                }),
            ));
        }
    }

    if room.is_none() || student.seat_position.is_none() {
        return Some(VerificationDecision::denied(
            DenialReason::SeatNotAssigned,
            Some("No seat allocation found".to_string()),
            Some(StudentSummary {
                roll_number: student.roll_number.clone(),
                name: student.name.clone(),
                ..Default::default()
            }),
        ));
    }

    None
}

/// Verification, statistics and reset
#[derive(Clone, Debug)]
pub struct VerificationEngine {
    db: SqlitePool,
    bus: EventBus,
}

impl VerificationEngine {
    pub fn new(db: SqlitePool, bus: EventBus) -> Self {
        Self { db, bus }
    }

    /// Check a scanned credential and admit the student at most once
    ///
    /// Denials are returned as decisions, not errors. Only a failed
    /// commit or lookup surfaces as `Err`.
    pub async fn verify(
        &self,
        scanned: &str,
        context_room: Option<&str>,
        actor: &Principal,
    ) -> ApiResult<VerificationDecision> {
        let payload = match credential::decode(scanned) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Rejected credential scan by {}: {}", actor.subject, e);
                let decision =
                    VerificationDecision::denied(DenialReason::MalformedCredential, None, None);
                self.publish_denial(None, &decision);
                return Ok(decision);
            }
        };

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let Some(student) = students::get_student(&self.db, &payload.student_id).await? else {
                let decision = VerificationDecision::denied(
                    DenialReason::UnknownStudent,
                    Some("Invalid QR Code".to_string()),
                    None,
                );
                self.publish_denial(None, &decision);
                return Ok(decision);
            };

            let room = match &student.room_id {
                Some(room_id) => rooms::get_room(&self.db, room_id).await?,
                None => None,
            };

            if let Some(decision) = evaluate(&student, room.as_ref(), context_room) {
                self.publish_denial(Some(&student.id), &decision);
                return Ok(decision);
            }

            let Some(room) = room else {
                continue;
            };

            let now = seatgate_common::time::now();
            if students::mark_verified(&self.db, &student.id, &room.id, &actor.subject, now).await? {
                info!(
                    "Verified student {} in room {} (by {})",
                    student.roll_number, room.room_number, actor.subject
                );
                self.bus.emit_lossy(ExamEvent::StudentVerified {
                    student_id: student.id.clone(),
                    room_id: room.id.clone(),
                    verified_by: actor.subject.clone(),
                    timestamp: now,
                });

                return Ok(VerificationDecision {
                    allowed: true,
                    reason: None,
                    message: "Student verified successfully".to_string(),
                    detail: None,
                    student: Some(StudentSummary {
                        roll_number: student.roll_number.clone(),
                        name: student.name.clone(),
                        class_name: Some(student.class_name.clone()),
                        room: Some(room.room_number.clone()),
                        seat_position: student.seat_position.map(|s| s.to_string()),
                        exam_name: Some(student.exam_name.clone()),
                        exam_date: Some(student.exam_date.clone()),
                        ..Default::default()
                    }),
                });
            }
            // Lost a race (verified or reassigned meanwhile); evaluate again
        }

        Err(ApiError::Internal(format!(
            "verification state of student {} kept changing",
            payload.student_id
        )))
    }

    pub async fn stats(&self, room_id: Option<&str>) -> ApiResult<VerificationStats> {
        let (total, verified) = students::verification_counts(&self.db, room_id).await?;
        Ok(VerificationStats::from_counts(total, verified))
    }

    /// Clear verification state; idempotent
    pub async fn reset(&self, student_id: &str) -> ApiResult<()> {
        let now = seatgate_common::time::now();
        if !students::reset_verification(&self.db, student_id, now).await? {
            return Err(ApiError::NotFound("Student not found".to_string()));
        }

        info!("Verification reset for student {}", student_id);
        self.bus.emit_lossy(ExamEvent::VerificationReset {
            student_id: student_id.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    fn publish_denial(&self, student_id: Option<&str>, decision: &VerificationDecision) {
        let Some(reason) = decision.reason else {
            return;
        };
        warn!(
            "Verification denied for {}: {:?}",
            student_id.unwrap_or("<unknown>"),
            reason
        );
        self.bus.emit_lossy(ExamEvent::VerificationDenied {
            student_id: student_id.map(str::to_string),
            reason: reason.message().to_string(),
            timestamp: seatgate_common::time::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialPayload;
    use crate::db::rooms::NewRoom;
    use crate::db::students::NewStudent;
    use seatgate_common::db::{init_memory_database, Role, SeatPosition};

    fn teacher() -> Principal {
        Principal {
            subject: "teacher-1".to_string(),
            role: Role::Teacher,
            name: "T".to_string(),
        }
    }

    async fn setup() -> (SqlitePool, VerificationEngine) {
        let pool = init_memory_database().await.unwrap();
        let engine = VerificationEngine::new(pool.clone(), EventBus::new(64));

        for (id, number) in [("room-1", "101"), ("room-2", "102")] {
            let room = NewRoom {
                room_number: number.to_string(),
                room_name: "Hall".to_string(),
                rows: 2,
                columns: 2,
                exam_name: "Physics".to_string(),
                exam_date: "2026-11-02".to_string(),
            };
            rooms::insert_room(&pool, id, &room, Utc::now()).await.unwrap();
        }

        let student = NewStudent {
            roll_number: "R001".to_string(),
            name: "Asha".to_string(),
            class_name: "10A".to_string(),
            dob: "2008-01-01".to_string(),
            email: String::new(),
            phone: String::new(),
            exam_name: "Physics".to_string(),
            exam_date: "2026-11-02".to_string(),
        };
        students::insert_student(&pool, "s1", &student, Utc::now()).await.unwrap();

        (pool, engine)
    }

    async fn seat(pool: &SqlitePool) {
        students::assign_seat(pool, "s1", "room-1", SeatPosition::new(1, 1), Utc::now())
            .await
            .unwrap();
    }

    /// Text a scanner reads off the student's current QR code
    async fn scan(pool: &SqlitePool) -> String {
        let student = students::get_student(pool, "s1").await.unwrap().unwrap();
        let room = match &student.room_id {
            Some(room_id) => rooms::get_room(pool, room_id).await.unwrap(),
            None => None,
        };
        CredentialPayload::for_student(&student, room.as_ref())
            .to_json()
            .unwrap()
    }

    #[test]
    fn test_stats_rounding() {
        let stats = VerificationStats::from_counts(3, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.percentage, 33.33);
        assert_eq!(VerificationStats::from_counts(0, 0).percentage, 0.0);
    }

    #[tokio::test]
    async fn test_unassigned_student_is_denied() {
        let (pool, engine) = setup().await;
        let qr = scan(&pool).await;

        let decision = engine.verify(&qr, Some("room-1"), &teacher()).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenialReason::SeatNotAssigned));

        let student = students::get_student(&pool, "s1").await.unwrap().unwrap();
        assert!(!student.is_verified);
        assert!(student.credential.is_none());
    }

    #[tokio::test]
    async fn test_verify_once_then_already_verified() {
        let (pool, engine) = setup().await;
        seat(&pool).await;
        let qr = scan(&pool).await;

        let first = engine.verify(&qr, Some("room-1"), &teacher()).await.unwrap();
        assert!(first.allowed);
        let summary = first.student.unwrap();
        assert_eq!(summary.room.as_deref(), Some("101"));
        assert_eq!(summary.seat_position.as_deref(), Some("Row 1, Column 1"));

        let second = engine.verify(&qr, Some("room-1"), &teacher()).await.unwrap();
        assert_eq!(second.reason, Some(DenialReason::AlreadyVerified));
        assert!(second.student.unwrap().verified_at.is_some());

        let student = students::get_student(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(student.verified_by.as_deref(), Some("teacher-1"));
    }

    #[tokio::test]
    async fn test_already_verified_outranks_wrong_room() {
        let (pool, engine) = setup().await;
        seat(&pool).await;
        let qr = scan(&pool).await;

        engine.verify(&qr, Some("room-1"), &teacher()).await.unwrap();
        let decision = engine.verify(&qr, Some("room-2"), &teacher()).await.unwrap();
        assert_eq!(decision.reason, Some(DenialReason::AlreadyVerified));
    }

    #[tokio::test]
    async fn test_wrong_room_names_actual_room() {
        let (pool, engine) = setup().await;
        seat(&pool).await;
        let qr = scan(&pool).await;

        let decision = engine.verify(&qr, Some("room-2"), &teacher()).await.unwrap();
        assert_eq!(decision.reason, Some(DenialReason::WrongRoom));
        assert_eq!(decision.student.unwrap().assigned_room.as_deref(), Some("101"));
        assert_eq!(decision.detail.as_deref(), Some("Student assigned to Room 101"));
    }

    #[tokio::test]
    async fn test_no_context_room_admits_seated_student() {
        let (pool, engine) = setup().await;
        seat(&pool).await;
        let qr = scan(&pool).await;

        let decision = engine.verify(&qr, None, &teacher()).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_scans() {
        let (_pool, engine) = setup().await;

        let decision = engine.verify("{broken", None, &teacher()).await.unwrap();
        assert_eq!(decision.reason, Some(DenialReason::MalformedCredential));

        let payload = CredentialPayload {
            student_id: "ghost".to_string(),
            roll_number: "R999".to_string(),
            name: "Nobody".to_string(),
            room: "101".to_string(),
            seat_position: credential::PayloadSeat {
                row: Some(1),
                column: Some(1),
            },
            exam_name: "Physics".to_string(),
        };
        let decision = engine
            .verify(&payload.to_json().unwrap(), None, &teacher())
            .await
            .unwrap();
        assert_eq!(decision.reason, Some(DenialReason::UnknownStudent));
    }

    #[tokio::test]
    async fn test_concurrent_scans_admit_exactly_once() {
        let (pool, engine) = setup().await;
        seat(&pool).await;
        let qr = scan(&pool).await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let engine = engine.clone();
            let qr = qr.clone();
            handles.push(tokio::spawn(async move {
                engine.verify(&qr, Some("room-1"), &teacher()).await.unwrap()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            let decision = handle.await.unwrap();
            if decision.allowed {
                allowed += 1;
            } else {
                assert_eq!(decision.reason, Some(DenialReason::AlreadyVerified));
            }
        }
        assert_eq!(allowed, 1);
    }

    #[tokio::test]
    async fn test_stats_on_empty_store() {
        let pool = init_memory_database().await.unwrap();
        let engine = VerificationEngine::new(pool, EventBus::new(4));

        let empty = engine.stats(None).await.unwrap();
        assert_eq!((empty.total, empty.verified, empty.pending), (0, 0, 0));
        assert_eq!(empty.percentage, 0.0);
    }

    #[tokio::test]
    async fn test_stats_and_reset() {
        let (pool, engine) = setup().await;

        assert_eq!(engine.stats(None).await.unwrap().total, 1);
        // the student exists but is in no room
        let stats = engine.stats(Some("room-1")).await.unwrap();
        assert_eq!(stats.total, 0);

        seat(&pool).await;
        let qr = scan(&pool).await;
        engine.verify(&qr, Some("room-1"), &teacher()).await.unwrap();

        let stats = engine.stats(Some("room-1")).await.unwrap();
        assert_eq!((stats.total, stats.verified, stats.percentage), (1, 1, 100.0));

        engine.reset("s1").await.unwrap();
        engine.reset("s1").await.unwrap();
        let student = students::get_student(&pool, "s1").await.unwrap().unwrap();
        assert!(!student.is_verified);
        assert!(student.verified_at.is_none());
        assert!(student.verified_by.is_none());

        let err = engine.reset("ghost").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
