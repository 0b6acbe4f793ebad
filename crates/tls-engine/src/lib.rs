//! An embeddable TLS 1.3 session engine.
//!
//! The engine is purely buffer-in / buffer-out: the caller feeds it
//! bytes received from the peer and transmits the bytes it produces.
//! No I/O, timers or threads live here.  Cryptography is supplied by a
//! pluggable [`backend::CryptoBackend`]; certificate policy by the
//! host's [`verify::ServerCertVerifier`] (client) and
//! [`sign::ResolvesServerCert`] (server) callbacks.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tls_engine::{Buffer, ClientConnection, RustCryptoBackend};
//! # struct HostVerifier;
//! # impl tls_engine::verify::ServerCertVerifier for HostVerifier {
//! #     fn verify_server_cert(
//! #         &self,
//! #         _: &tls_core::key::Certificate,
//! #         _: &[tls_core::key::Certificate],
//! #         _: Option<&str>,
//! #     ) -> Result<tls_engine::deferred::DeferredVerification, tls_core::Error> {
//! #         Ok(tls_engine::deferred::DeferredVerification::new(|_, _| Ok(())))
//! #     }
//! #     fn supported_verify_schemes(&self) -> Vec<tls_core::msgs::enums::SignatureScheme> {
//! #         vec![tls_core::msgs::enums::SignatureScheme::ECDSA_NISTP256_SHA256]
//! #     }
//! # }
//!
//! # fn main() -> Result<(), tls_core::Error> {
//! let mut conn = ClientConnection::new(
//!     Arc::new(RustCryptoBackend),
//!     Arc::new(HostVerifier),
//!     Some("example.com"),
//! )?;
//!
//! let mut small = [0u8; 512];
//! let mut out = Buffer::new(&mut small);
//! let outcome = conn.handshake(&mut out, &[])?;
//! // transmit out.as_ref(), read more bytes, call handshake again with
//! // them until outcome.is_complete(), then use conn.send / conn.receive.
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod check;

pub mod backend;
mod buffer;
pub mod cipher;
mod client;
mod conn;
pub mod deferred;
mod hash_hs;
mod key_schedule;
mod record_layer;
mod server;
pub mod sign;
pub mod verify;

pub use backend::{CryptoBackend, RustCryptoBackend};
pub use buffer::Buffer;
pub use client::ClientConnection;
pub use conn::{ConnectionCommon, HandshakeOutcome, HandshakeStatus};
pub use key_schedule::hkdf_expand_label;
pub use server::ServerConnection;

// The wire model this engine drives.
pub use tls_core;
pub use tls_core::Error;
