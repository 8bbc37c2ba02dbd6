//! Record id helpers
//!
//! Rooms, students and users are keyed by hyphenated UUIDv4 strings.

use uuid::Uuid;

/// Fresh record id
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
