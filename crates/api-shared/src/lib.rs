//! # API Shared
//!
//! Shared utilities and definitions for careflow APIs.
//!
//! Contains:
//! - Request and response bodies (`dto` module)
//! - Shared services like `HealthService`
//! - Authentication helpers for the acting user and API key headers

pub mod auth;
pub mod dto;
pub mod health;

pub use dto::*;
pub use health::HealthService;
