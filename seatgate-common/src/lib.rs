//! # SeatGate Common Library
//!
//! Shared code for the SeatGate exam-seating service:
//! - Database schema and models
//! - Domain event types (ExamEvent) and the EventBus
//! - Session tokens, password hashing and API error envelope
//! - Configuration loading
//! - Timestamp and id helpers

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
