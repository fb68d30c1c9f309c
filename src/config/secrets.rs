//! Secret handling utilities.
//!
//! Re-exports secrecy types so callers don't depend on secrecy directly.

pub use secrecy::{ExposeSecret, SecretString};
