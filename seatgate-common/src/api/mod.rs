//! Shared HTTP API functionality
//!
//! Provides session tokens, password hashing and the error envelope used
//! by the SeatGate service.
//! Nothing here depends on axum; the service crate wraps these in its
//! middleware and extractors.

pub mod auth;
pub mod types;

pub use auth::{
    hash_password, load_or_init_jwt_secret, verify_password, Claims, Principal, TokenService,
};
pub use types::{ErrorBody, ErrorResponse};
