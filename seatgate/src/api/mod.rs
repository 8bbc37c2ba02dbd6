//! HTTP API handlers for seatgate

pub mod auth;
pub mod health;
pub mod rooms;
pub mod session;
pub mod sse;
pub mod students;
pub mod verification;
pub mod views;

pub use auth::{auth_middleware, require_role};
pub use health::health_routes;
pub use rooms::{allocate_seats, create_room, delete_room, get_room, list_rooms, update_room};
pub use session::{login, me, register, student_login, student_signup};
pub use sse::event_stream;
pub use students::{
    delete_student, get_student, list_students, list_unassigned, regenerate_credential,
    upload_students,
};
pub use verification::{reset_verification, verification_stats, verify_student};

/// Trimmed, non-empty request field
pub(crate) fn required(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
