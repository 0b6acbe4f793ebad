//! Wire model shared by the TLS 1.3 session engine.
//!
//! This crate carries no cryptography: it knows how to encode and decode
//! TLS records, handshake messages and their extensions, describes the
//! supported cipher suites, and defines the error type the engine
//! reports.  The session engine crate builds on top of it.

mod error;
pub mod key;
#[macro_use]
pub mod msgs;
pub mod suites;

pub use error::{codes, Error};
