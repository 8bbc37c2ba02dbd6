//! Database initialization
//!
//! Creates the database on first run and brings the schema up idempotently
//! on every start. All `create_*` functions use `CREATE ... IF NOT EXISTS`
//! and are safe to call repeatedly.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Busy timeout applied to every connection, in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: i64 = 5000;

/// Open (creating if needed) the database at `db_path` and initialize the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS as u64));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema, used by tests and tooling
///
/// Limited to a single connection: every connection to `sqlite::memory:`
/// opens its own private database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool).await?;
    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    let pragma_sql = format!("PRAGMA busy_timeout = {}", DEFAULT_BUSY_TIMEOUT_MS);
    sqlx::query(&pragma_sql).execute(pool).await?;

    Ok(())
}

/// Create every table and index
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_rooms_table(pool).await?;
    create_students_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Admin and teacher accounts. Students authenticate against `students`.
pub async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('admin', 'teacher')),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_rooms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            room_number TEXT NOT NULL UNIQUE,
            room_name TEXT NOT NULL,
            grid_rows INTEGER NOT NULL CHECK (grid_rows >= 1),
            grid_columns INTEGER NOT NULL CHECK (grid_columns >= 1),
            capacity INTEGER NOT NULL CHECK (capacity = grid_rows * grid_columns),
            exam_name TEXT NOT NULL,
            exam_date TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Students table
///
/// Assignment columns (`room_id`, `seat_row`, `seat_column`) are set and
/// cleared together; verification columns likewise. The partial unique
/// index rejects two students holding the same seat in one room.
pub async fn create_students_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY,
            roll_number TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            dob TEXT NOT NULL,
            email TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            exam_name TEXT NOT NULL,
            exam_date TEXT NOT NULL,
            room_id TEXT REFERENCES rooms(id),
            seat_row INTEGER,
            seat_column INTEGER,
            credential TEXT,
            is_verified INTEGER NOT NULL DEFAULT 0,
            verified_at TEXT,
            verified_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (
                (room_id IS NULL AND seat_row IS NULL AND seat_column IS NULL)
                OR (room_id IS NOT NULL AND seat_row IS NOT NULL AND seat_column IS NOT NULL)
            ),
            CHECK (
                (is_verified = 0 AND verified_at IS NULL AND verified_by IS NULL)
                OR (is_verified = 1 AND verified_at IS NOT NULL AND verified_by IS NOT NULL)
            )
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_students_seat
        ON students (room_id, seat_row, seat_column)
        WHERE room_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_students_room ON students (room_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Ensure default settings exist
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "schema_version", "1").await?;
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // INSERT OR IGNORE: concurrent starters may both reach this point
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value", key);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            warn!("Setting '{}' was NULL, reset to default", key);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Read a setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Insert or replace a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_has_schema() {
        let pool = init_memory_database().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in ["rooms", "settings", "students", "users"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_setting_roundtrip() {
        let pool = init_memory_database().await.unwrap();

        assert_eq!(get_setting(&pool, "missing").await.unwrap(), None);

        set_setting(&pool, "jwt_secret", "abc").await.unwrap();
        assert_eq!(get_setting(&pool, "jwt_secret").await.unwrap().as_deref(), Some("abc"));

        set_setting(&pool, "jwt_secret", "def").await.unwrap();
        assert_eq!(get_setting(&pool, "jwt_secret").await.unwrap().as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn test_ensure_setting_keeps_existing_value() {
        let pool = init_memory_database().await.unwrap();

        set_setting(&pool, "k", "custom").await.unwrap();
        ensure_setting(&pool, "k", "default").await.unwrap();

        assert_eq!(get_setting(&pool, "k").await.unwrap().as_deref(), Some("custom"));
    }

    #[tokio::test]
    async fn test_capacity_check_constraint() {
        let pool = init_memory_database().await.unwrap();

        let result = sqlx::query(
            r#"
            INSERT INTO rooms (id, room_number, room_name, grid_rows, grid_columns, capacity,
                               exam_name, exam_date, created_at, updated_at)
            VALUES ('r1', '101', 'Hall', 2, 3, 5, 'Math', '2026-01-01', 'x', 'x')
            "#,
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "capacity must equal rows * columns");
    }
}
