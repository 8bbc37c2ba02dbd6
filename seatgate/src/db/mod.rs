//! Database access layer for seatgate
//!
//! Plain query functions over the shared SQLite pool. Each function is a
//! single statement or a short transaction; callers coordinate anything
//! larger (see `allocator` for the per-room critical section).

pub mod rooms;
pub mod students;
pub mod users;

/// Whether `err` is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
