//! Upstream HTTP access for Stratus.
//!
//! One client for every remote service: bearer-token propagation, bounded
//! retry with exponential backoff, and a 401 short-circuit that clears the
//! stored credential and signals the caller instead of retrying.

pub mod client;
pub mod error;
pub mod retry;
pub mod token;

pub use client::ApiClient;
pub use error::ApiError;
pub use retry::{with_retry, RetryConfig};
pub use token::TokenCell;
