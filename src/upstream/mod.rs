//! Upstream connectivity.
//!
//! # Data Flow
//! ```text
//! BackendConfig (url, sni, ca_file)
//!     → backend.rs (immutable BackendRef, pool key, Host header)
//!     → pool.rs (idle sender for (host, port, sni)?)
//!         hit  → readiness check → reuse
//!         miss → connector.rs (DNS → TCP → TLS/SNI → HTTP/1.1 handshake)
//!     → SendRequest handed to the forwarder
//! ```

pub mod backend;
pub mod connector;
pub mod pool;

pub use backend::{BackendRef, PoolKey, TlsPolicy};
pub use connector::{connect, ConnectError, ConnectErrorKind, ConnectPhase, ConnectTimeouts};
pub use pool::{ConnectionPool, PooledConnection};
