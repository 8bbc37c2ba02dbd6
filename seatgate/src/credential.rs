//! Scannable student credentials
//!
//! A credential is the canonical JSON of [`CredentialPayload`], rendered
//! into a transportable artifact by a [`CredentialRenderer`]. The default
//! renderer draws a QR code and stores it as a `data:image/png` URL;
//! [`DataUrlRenderer`] carries the JSON itself in a `data:` URL.
//!
//! Only seated students hold a credential. Decoding accepts either the raw
//! JSON (what a QR scanner hands back) or the JSON `data:` URL, and rejects
//! anything that is not exactly the payload shape.

use std::io::Cursor;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use seatgate_common::db::{Room, Student};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;

use crate::db::{rooms, students};
use crate::error::{ApiError, ApiResult};

/// `room` value for students without an assignment
pub const UNASSIGNED_ROOM: &str = "Not Assigned";

const DATA_URL_PREFIX: &str = "data:application/json;base64,";
const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Seat coordinates as carried in the payload (null when unassigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayloadSeat {
    pub row: Option<u32>,
    pub column: Option<u32>,
}

/// Credential contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CredentialPayload {
    pub student_id: String,
    pub roll_number: String,
    pub name: String,
    /// Room number, or [`UNASSIGNED_ROOM`]
    pub room: String,
    pub seat_position: PayloadSeat,
    pub exam_name: String,
}

impl CredentialPayload {
    /// Payload reflecting the student's current assignment
    pub fn for_student(student: &Student, room: Option<&Room>) -> Self {
        Self {
            student_id: student.id.clone(),
            roll_number: student.roll_number.clone(),
            name: student.name.clone(),
            room: room
                .map(|r| r.room_number.clone())
                .unwrap_or_else(|| UNASSIGNED_ROOM.to_string()),
            seat_position: PayloadSeat {
                row: student.seat_position.map(|s| s.row),
                column: student.seat_position.map(|s| s.column),
            },
            exam_name: student.exam_name.clone(),
        }
    }

    /// Canonical JSON (field order fixed by the struct)
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty credential")]
    Empty,
    #[error("unsupported data URL")]
    UnsupportedDataUrl,
    #[error("invalid base64: {0}")]
    Base64(String),
    #[error("not a credential payload: {0}")]
    Shape(String),
}

/// Parse a scanned credential back into its payload
pub fn decode(scanned: &str) -> Result<CredentialPayload, DecodeError> {
    let scanned = scanned.trim();
    if scanned.is_empty() {
        return Err(DecodeError::Empty);
    }

    let json = if scanned.starts_with("data:") {
        let encoded = scanned
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or(DecodeError::UnsupportedDataUrl)?;
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DecodeError::Base64(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| DecodeError::Base64(e.to_string()))?
    } else {
        scanned.to_string()
    };

    let payload: CredentialPayload =
        serde_json::from_str(&json).map_err(|e| DecodeError::Shape(e.to_string()))?;
    if payload.student_id.trim().is_empty() {
        return Err(DecodeError::Shape("studentId is empty".to_string()));
    }
    Ok(payload)
}

/// Turns canonical payload JSON into a stored artifact
pub trait CredentialRenderer: Send + Sync {
    fn render(&self, payload_json: &str) -> ApiResult<String>;
}

/// `data:application/json;base64,...` renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUrlRenderer;

impl CredentialRenderer for DataUrlRenderer {
    fn render(&self, payload_json: &str) -> ApiResult<String> {
        Ok(format!(
            "{}{}",
            DATA_URL_PREFIX,
            general_purpose::STANDARD.encode(payload_json.as_bytes())
        ))
    }
}

/// QR code PNG renderer, `data:image/png;base64,...`
#[derive(Debug, Clone, Copy)]
pub struct QrPngRenderer {
    /// Minimum edge length of the image in pixels
    pub min_size: u32,
}

impl Default for QrPngRenderer {
    fn default() -> Self {
        Self { min_size: 256 }
    }
}

impl CredentialRenderer for QrPngRenderer {
    fn render(&self, payload_json: &str) -> ApiResult<String> {
        let code = QrCode::with_error_correction_level(payload_json.as_bytes(), EcLevel::M)
            .map_err(|e| ApiError::Internal(format!("QR encoding failed: {}", e)))?;
        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| ApiError::Internal(format!("PNG encoding failed: {}", e)))?;

        Ok(format!("{}{}", PNG_DATA_URL_PREFIX, general_purpose::STANDARD.encode(&png)))
    }
}

/// Issues and persists credentials
#[derive(Clone)]
pub struct CredentialService {
    db: SqlitePool,
    renderer: Arc<dyn CredentialRenderer>,
}

impl CredentialService {
    pub fn new(db: SqlitePool) -> Self {
        Self::with_renderer(db, Arc::new(QrPngRenderer::default()))
    }

    pub fn with_renderer(db: SqlitePool, renderer: Arc<dyn CredentialRenderer>) -> Self {
        Self { db, renderer }
    }

    /// Render the student's current credential and store it on the student
    ///
    /// A student without a room and seat gets no credential: any stored one
    /// is cleared and the call fails with `Validation`.
    pub async fn issue(&self, student_id: &str) -> ApiResult<String> {
        let student = students::get_student(&self.db, student_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;

        let room = match student.assignment() {
            Some((room_id, _)) => rooms::get_room(&self.db, room_id).await?,
            None => None,
        };
        let Some(room) = room else {
            students::set_credential(&self.db, student_id, None, seatgate_common::time::now()).await?;
            return Err(ApiError::Validation(
                "Student has no seat assignment".to_string(),
            ));
        };

        let payload = CredentialPayload::for_student(&student, Some(&room));
        let json = payload
            .to_json()
            .map_err(|e| ApiError::Internal(format!("credential serialization failed: {}", e)))?;
        let artifact = self.renderer.render(&json)?;

        students::set_credential(&self.db, student_id, Some(&artifact), seatgate_common::time::now())
            .await?;
        debug!("Issued credential for student {} ({})", student.roll_number, payload.room);

        Ok(artifact)
    }
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CredentialPayload {
        CredentialPayload {
            student_id: "3f0c5a52-6a1e-4c3b-9d55-2f1f0c9b7e10".to_string(),
            roll_number: "R001".to_string(),
            name: "Asha Rao".to_string(),
            room: "101".to_string(),
            seat_position: PayloadSeat {
                row: Some(1),
                column: Some(2),
            },
            exam_name: "Physics".to_string(),
        }
    }

    #[test]
    fn test_canonical_field_names() {
        let value: serde_json::Value = serde_json::from_str(&payload().to_json().unwrap()).unwrap();
        assert_eq!(value["studentId"], "3f0c5a52-6a1e-4c3b-9d55-2f1f0c9b7e10");
        assert_eq!(value["rollNumber"], "R001");
        assert_eq!(value["seatPosition"]["row"], 1);
        assert_eq!(value["seatPosition"]["column"], 2);
        assert_eq!(value["examName"], "Physics");
    }

    #[test]
    fn test_decode_raw_json() {
        let decoded = decode(&payload().to_json().unwrap()).unwrap();
        assert_eq!(decoded, payload());
    }

    #[test]
    fn test_decode_rendered_data_url() {
        let artifact = DataUrlRenderer.render(&payload().to_json().unwrap()).unwrap();
        assert!(artifact.starts_with("data:application/json;base64,"));
        assert_eq!(decode(&artifact).unwrap(), payload());
    }

    #[test]
    fn test_decode_unassigned_seat() {
        let json = r#"{"studentId":"s1","rollNumber":"R9","name":"N","room":"Not Assigned","seatPosition":{"row":null,"column":null},"examName":"Math"}"#;
        let decoded = decode(json).unwrap();
        assert_eq!(decoded.room, UNASSIGNED_ROOM);
        assert_eq!(decoded.seat_position.row, None);
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert_eq!(decode("   "), Err(DecodeError::Empty));
        assert!(matches!(decode("not json"), Err(DecodeError::Shape(_))));
        assert!(matches!(decode(r#"{"studentId":"s1"}"#), Err(DecodeError::Shape(_))));
        assert!(matches!(
            decode("data:image/png;base64,AAAA"),
            Err(DecodeError::UnsupportedDataUrl)
        ));
        assert!(matches!(
            decode("data:application/json;base64,@@@"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_qr_renderer_produces_png() {
        let artifact = QrPngRenderer::default()
            .render(&payload().to_json().unwrap())
            .unwrap();
        let encoded = artifact.strip_prefix("data:image/png;base64,").unwrap();
        let png = general_purpose::STANDARD.decode(encoded).unwrap();

        let image = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert!(image.width() >= 256);
        assert_eq!(image.width(), image.height());
    }

    #[test]
    fn test_qr_image_is_not_a_scan() {
        let artifact = QrPngRenderer::default()
            .render(&payload().to_json().unwrap())
            .unwrap();
        assert_eq!(decode(&artifact), Err(DecodeError::UnsupportedDataUrl));
    }

    async fn seeded_pool() -> SqlitePool {
        let pool = seatgate_common::db::init_memory_database().await.unwrap();
        let now = seatgate_common::time::now();
        rooms::insert_room(
            &pool,
            "room-1",
            &rooms::NewRoom {
                room_number: "101".to_string(),
                room_name: "Hall".to_string(),
                rows: 2,
                columns: 2,
                exam_name: "Physics".to_string(),
                exam_date: "2026-11-02".to_string(),
            },
            now,
        )
        .await
        .unwrap();
        students::insert_student(
            &pool,
            "s1",
            &students::NewStudent {
                roll_number: "R001".to_string(),
                name: "Asha Rao".to_string(),
                class_name: "10A".to_string(),
                dob: "2008-01-01".to_string(),
                email: String::new(),
                phone: String::new(),
                exam_name: "Physics".to_string(),
                exam_date: "2026-11-02".to_string(),
            },
            now,
        )
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_issue_refuses_unassigned_student() {
        let pool = seeded_pool().await;
        students::set_credential(&pool, "s1", Some("stale"), seatgate_common::time::now())
            .await
            .unwrap();

        let service = CredentialService::new(pool.clone());
        let err = service.issue("s1").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let student = students::get_student(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(student.room_id, None);
        assert_eq!(student.credential, None);
    }

    #[tokio::test]
    async fn test_issue_reflects_current_assignment() {
        let pool = seeded_pool().await;
        students::assign_seat(
            &pool,
            "s1",
            "room-1",
            seatgate_common::db::SeatPosition::new(2, 1),
            seatgate_common::time::now(),
        )
        .await
        .unwrap();

        let service = CredentialService::with_renderer(pool.clone(), Arc::new(DataUrlRenderer));
        let artifact = service.issue("s1").await.unwrap();

        let stored = students::get_student(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(stored.credential.as_deref(), Some(artifact.as_str()));

        let decoded = decode(&artifact).unwrap();
        assert_eq!(decoded.room, "101");
        assert_eq!(decoded.seat_position.row, Some(2));
        assert_eq!(decoded.seat_position.column, Some(1));
    }

    #[tokio::test]
    async fn test_issue_unknown_student() {
        let pool = seeded_pool().await;
        let err = CredentialService::new(pool).issue("ghost").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_decode_rejects_extra_fields() {
        let json = r#"{"studentId":"s1","rollNumber":"R9","name":"N","room":"1","seatPosition":{"row":1,"column":1},"examName":"Math","admin":true}"#;
        assert!(matches!(decode(json), Err(DecodeError::Shape(_))));
    }

    #[test]
    fn test_decode_rejects_blank_student_id() {
        let mut p = payload();
        p.student_id = " ".to_string();
        assert!(matches!(decode(&p.to_json().unwrap()), Err(DecodeError::Shape(_))));
    }
}
