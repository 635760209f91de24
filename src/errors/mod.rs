//! Centralized error handling for the VOD proxy
//!
//! This module provides the error types shared across all application layers.
//! The web layer maps these onto HTTP statuses in `crate::web::responses`.
//!
//! # Error Categories
//!
//! - **Store Errors**: shared-store (redis) connectivity and serialization
//! - **Limit Errors**: profile concurrency cap violations
//! - **Upstream Errors**: provider connectivity and bad upstream responses
//! - **Request Errors**: unsatisfiable ranges, unknown content, bad input

pub mod types;

pub use types::*;

/// Convenience type alias for Results using VodError
pub type VodResult<T> = Result<T, VodError>;

/// Convenience type alias for store-layer Results
pub type StoreResult<T> = Result<T, StoreError>;
