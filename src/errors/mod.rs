//! Centralized error handling for the favicon pipeline
//!
//! # Error Categories
//!
//! - **Resolve Errors**: index page fetch, non-HTML documents, malformed site URLs
//! - **Fetch Errors**: icon download, status and decode failures
//! - **HTTP Errors**: transport failures shared by both network stages
//! - **Cache Store Errors**: disk and journal problems, never surfaced past the store
//!
//! # Usage
//!
//! ```rust
//! use favicon_cache::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     // Function can return any error type that converts to AppError
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for icon lookup Results
pub type FaviconResult<T> = Result<T, FaviconError>;

/// Convenience type alias for cache store Results
pub type StoreResult<T> = Result<T, CacheStoreError>;
