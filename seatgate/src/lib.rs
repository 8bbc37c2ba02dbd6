//! seatgate library - exam seating and entry verification service
//!
//! Rooms and students live in SQLite. Admins register rooms, import
//! students and allocate them to seats; every placement gets a scannable
//! credential. Teachers scan credentials at the room door, and each
//! student is admitted at most once.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use seatgate_common::api::TokenService;
use seatgate_common::events::EventBus;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod allocator;
pub mod api;
pub mod credential;
pub mod db;
pub mod error;
pub mod import;
pub mod locks;
pub mod verification;

pub use error::{ApiError, ApiResult};

use allocator::SeatAllocator;
use credential::{CredentialRenderer, CredentialService, QrPngRenderer};
use locks::KeyedLocks;
use verification::VerificationEngine;

/// Buffered events per SSE subscriber before it starts lagging
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Largest accepted request body (bulk imports included)
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub tokens: TokenService,
    pub bus: EventBus,
    /// Serializes allocate/update/delete per room
    pub room_locks: KeyedLocks,
    pub credentials: CredentialService,
    pub allocator: SeatAllocator,
    pub verification: VerificationEngine,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// State rendering credentials as QR code images
    pub fn new(db: SqlitePool, tokens: TokenService) -> Self {
        Self::with_renderer(db, tokens, Arc::new(QrPngRenderer::default()))
    }

    pub fn with_renderer(db: SqlitePool, tokens: TokenService, renderer: Arc<dyn CredentialRenderer>) -> Self {
        let bus = EventBus::new(EVENT_BUS_CAPACITY);
        let room_locks = KeyedLocks::new();
        let credentials = CredentialService::with_renderer(db.clone(), renderer);
        let allocator = SeatAllocator::new(
            db.clone(),
            room_locks.clone(),
            credentials.clone(),
            bus.clone(),
        );
        let verification = VerificationEngine::new(db.clone(), bus.clone());

        Self {
            db,
            tokens,
            bus,
            room_locks,
            credentials,
            allocator,
            verification,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// `/health` and the `/api/auth` login/signup endpoints are public; every
/// other route requires a bearer token, with role checks in the handlers.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post, put};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/auth/me", get(api::me))
        .route("/api/rooms", get(api::list_rooms).post(api::create_room))
        .route("/api/rooms/allocate", post(api::allocate_seats))
        .route(
            "/api/rooms/:id",
            get(api::get_room).put(api::update_room).delete(api::delete_room),
        )
        .route("/api/students", get(api::list_students))
        .route("/api/students/upload", post(api::upload_students))
        .route("/api/students/unassigned", get(api::list_unassigned))
        .route(
            "/api/students/:id",
            get(api::get_student).delete(api::delete_student),
        )
        .route("/api/students/:id/credential", post(api::regenerate_credential))
        .route("/api/verification/verify", post(api::verify_student))
        .route("/api/verification/stats", get(api::verification_stats))
        .route("/api/verification/reset/:student_id", put(api::reset_verification))
        .route("/api/events", get(api::event_stream))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/auth/register", post(api::register))
        .route("/api/auth/login", post(api::login))
        .route("/api/auth/student-signup", post(api::student_signup))
        .route("/api/auth/student-login", post(api::student_login))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
