//! AWS Signature Version 4 request authentication for the `pxobj` S3 surface.
//!
//! This crate verifies `AWS4-HMAC-SHA256` over an inbound HTTP request against
//! a [`CredentialProvider`]. Verification resolves an access key to the
//! bucket it is bound to and its read-only flag, so the caller can enforce
//! per-credential bucket scoping without a second lookup.
//!
//! # Modules
//!
//! - [`canonical`] - canonical request construction per the SigV4 specification
//! - [`credentials`] - credential provider trait and in-memory implementation
//! - [`error`] - authentication error types
//! - [`sigv4`] - signature verification entry point

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod sigv4;

pub use credentials::{Credential, CredentialProvider, StaticCredentialProvider};
pub use error::AuthError;
pub use sigv4::{AuthResult, UNSIGNED_PAYLOAD, hash_payload, verify_sigv4};
