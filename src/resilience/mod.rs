//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connection checkout for a request:
//!     → connector enforces connect / TLS handshake deadlines
//!     → On failure: retries.rs (retryable kind? back off and try again)
//!     → backoff.rs (exponential delay with jitter)
//! ```
//!
//! # Design Decisions
//! - Only the connect phase is retried; once the request has been handed to
//!   an upstream connection it is never replayed
//! - `Dns` and `Timeout` are transient; `TlsHandshake` and `Refused` fail fast
//! - Jittered backoff prevents thundering herd

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{is_retryable, RetryPolicy};
