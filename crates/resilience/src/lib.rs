// crates/resilience/src/lib.rs
//! Resilience patterns for remote calls
//!
//! This module provides:
//! - Retry with exponential backoff, filtered by a retryable predicate
//! - Timeout handling for async operations
//!
//! # Example
//!
//! ```rust
//! use fitsync_resilience::{RetryPolicy, Timeout};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3)
//!     .with_initial_delay(Duration::from_millis(100));
//! let timeout = Timeout::new(Duration::from_secs(10));
//! assert_eq!(policy.max_attempts(), 3);
//! assert_eq!(timeout.duration(), Duration::from_secs(10));
//! ```

mod error;
mod retry;
mod timeout;

pub use error::{ResilienceError, ResilienceResult};
pub use retry::{with_retry, RetryPolicy};
pub use timeout::{with_timeout, Timeout};
