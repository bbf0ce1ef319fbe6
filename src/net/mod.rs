//! Network layer subsystem.
//!
//! Inbound TLS termination for the client listener. Outbound TLS to
//! backends lives in `upstream::connector`.

pub mod tls;

pub use tls::{ensure_crypto_provider, load_tls_config};
