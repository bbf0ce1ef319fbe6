//! Header layer: credential injection and secret handling.
//!
//! # Data Flow
//! ```text
//! [secrets] config
//!     → secret.rs (provider per source, resolved at compile)
//!     → injector.rs (route's ordered set/remove ops)
//!     → applied to every outbound request on that route
//!     → injected names stripped from every response
//! ```

pub mod injector;
pub mod secret;

pub use injector::{HeaderInjector, HeaderOp, InjectorError};
pub use secret::{Secret, SecretError, SecretProvider, SecretStore};
