//! Database initialization tests
//!
//! File-backed databases in temporary directories: first-run creation,
//! reopening, idempotent schema, settings and the constraint guards that
//! back the seating invariants.

use seatgate_common::db::init::{get_setting, init_database, set_setting};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("data").join("seatgate.db");

    let pool = init_database(&db_path).await;

    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing_and_keeps_data() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("seatgate.db");

    let pool = init_database(&db_path).await.unwrap();
    set_setting(&pool, "jwt_secret", "abc123").await.unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(
        get_setting(&pool, "jwt_secret").await.unwrap().as_deref(),
        Some("abc123")
    );
}

#[tokio::test]
async fn test_schema_version_setting_initialized() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("seatgate.db")).await.unwrap();

    assert_eq!(
        get_setting(&pool, "schema_version").await.unwrap().as_deref(),
        Some("1")
    );
}

#[tokio::test]
async fn test_all_tables_created() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("seatgate.db")).await.unwrap();

    for table in ["settings", "users", "rooms", "students"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_foreign_keys_enabled() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("seatgate.db")).await.unwrap();

    let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(enabled, 1);

    let result = sqlx::query(
        r#"
        INSERT INTO students (id, roll_number, name, class_name, dob, exam_name, exam_date,
                              room_id, seat_row, seat_column, created_at, updated_at)
        VALUES ('s1', 'R1', 'N', '10A', '2008-01-01', 'Physics', '2026-11-02',
                'no-such-room', 1, 1, '2026-01-01', '2026-01-01')
        "#,
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "dangling room reference must be rejected");
}

#[tokio::test]
async fn test_busy_timeout_applied() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("seatgate.db")).await.unwrap();

    let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(timeout, seatgate_common::db::init::DEFAULT_BUSY_TIMEOUT_MS);
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("seatgate.db")).await.unwrap();

    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn test_seat_collision_rejected_by_index() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("seatgate.db")).await.unwrap();

    sqlx::query(
        r#"
        INSERT INTO rooms (id, room_number, room_name, grid_rows, grid_columns, capacity,
                           exam_name, exam_date, created_at, updated_at)
        VALUES ('r1', '101', 'Hall', 2, 2, 4, 'Physics', '2026-11-02', '2026-01-01', '2026-01-01')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let insert = |id: &'static str, roll: &'static str| {
        sqlx::query(
            r#"
            INSERT INTO students (id, roll_number, name, class_name, dob, exam_name, exam_date,
                                  room_id, seat_row, seat_column, created_at, updated_at)
            VALUES (?, ?, 'N', '10A', '2008-01-01', 'Physics', '2026-11-02',
                    'r1', 1, 1, '2026-01-01', '2026-01-01')
            "#,
        )
        .bind(id)
        .bind(roll)
    };

    insert("s1", "R1").execute(&pool).await.unwrap();
    let err = insert("s2", "R2").execute(&pool).await.unwrap_err();
    match err {
        sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
        other => panic!("expected unique violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_half_assignment_rejected() {
    let temp = TempDir::new().unwrap();
    let pool = init_database(&temp.path().join("seatgate.db")).await.unwrap();

    let result = sqlx::query(
        r#"
        INSERT INTO students (id, roll_number, name, class_name, dob, exam_name, exam_date,
                              seat_row, created_at, updated_at)
        VALUES ('s1', 'R1', 'N', '10A', '2008-01-01', 'Physics', '2026-11-02',
                3, '2026-01-01', '2026-01-01')
        "#,
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "seat without room must be rejected");
}

#[tokio::test]
async fn test_idempotent_initialization() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("seatgate.db");

    for _ in 0..3 {
        let pool = init_database(&db_path).await.unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'schema_version'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_concurrent_initialization() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("seatgate.db");

    let (a, b) = tokio::join!(init_database(&db_path), init_database(&db_path));
    assert!(a.is_ok(), "first initializer failed: {:?}", a.err());
    assert!(b.is_ok(), "second initializer failed: {:?}", b.err());
}
