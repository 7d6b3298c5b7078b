//! Webauthn-verifier - Webauthn ceremony verification for Rust Server Applications
//!
//! Webauthn is a standard allowing communication between servers, browsers and authenticators
//! to allow strong, passwordless, cryptographic authentication to be performed. This library
//! verifies the two responses a relying party receives: the attestation produced when a
//! credential is registered, and the assertion produced each time it is used.
//!
//! Challenge generation, session state and credential storage are left to the caller. Build an
//! [AttestationExpectation] or [AssertionExpectation] describing what the relying party asked
//! for, then hand it with the client's response to [WebauthnCore].
//!
//! Seven attestation statement formats are verified: `packed`, `tpm`, `android-key`,
//! `android-safetynet`, `fido-u2f`, `apple` and `none`. Attestation trust can be anchored with
//! FIDO metadata through a [MetadataService], and certificate revocation is checked through a
//! [CrlSource].

#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod base64_data;
mod constants;
mod internals;

pub mod attestation;
pub mod chain;
pub mod core;
pub mod crypto;
pub mod error;
pub mod expectation;
pub mod interface;
pub mod metadata;
pub mod proto;

#[cfg(test)]
mod test_helpers;

pub use crate::attestation::{AttestationFormat, FormatSelector};
pub use crate::base64_data::Base64UrlSafeData;
pub use crate::chain::{CertificateChainValidator, CrlSource, StaticCrlSource};
pub use crate::core::{VerifierConfig, WebauthnCore};
pub use crate::error::{
    AssertionError, AttestationError, CeremonyError, ErrorKind, WebauthnError, WebauthnResult,
};
pub use crate::expectation::{
    AssertionExpectation, AssertionParams, AttestationExpectation, AttestationParams,
};
pub use crate::interface::{AssertionResult, AttestationResult};
pub use crate::metadata::{
    MetadataEntry, MetadataPolicy, MetadataService, StaticMetadataService, StatusPolicy,
};
