//! <https://www.w3.org/TR/webauthn-3/#sctn-apple-anonymous-attestation>

use serde_cbor_2::Value;

use super::extensions::{validate_extension, AppleAnonymousNonce};
use super::*;
use crate::crypto::compute_sha256;

const FMT: &str = "apple";

pub(crate) fn verify_apple_anonymous_attestation(
    att_stmt: &Value,
    ctx: &VerificationContext<'_>,
) -> WebauthnResult<FormatVerifyResult> {
    // 2. Concatenate authenticatorData and clientDataHash to form nonceToHash.
    let nonce_to_hash = ctx.signed_data(FMT)?;
    let credential_public_key = ctx.credential_public_key(FMT)?;

    // 1. Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
    // CBOR decoding on it to extract the contained fields.
    let att_stmt_map = statement_map(FMT, att_stmt)?;
    let x5c = stmt_x5c(FMT, &att_stmt_map)?;
    let cred_cert = &x5c[0];

    // 3. Perform SHA-256 hash of nonceToHash to produce nonce.
    let nonce = compute_sha256(&nonce_to_hash);

    // 4. Verify that nonce equals the value of the extension with OID ( 1.2.840.113635.100.8.2 )
    // in credCert.
    validate_extension::<AppleAnonymousNonce>(FMT, cred_cert, &nonce)?;

    // 5. Verify credential public key matches the Subject Public Key of credCert.
    if !subject_key_matches(cred_cert, credential_public_key)? {
        return Err(WebauthnError::format(
            FMT,
            "credentialPublicKey does not match the leaf certificate",
        ));
    }

    ctx.assert_certs_usable(FMT, &x5c)?;
    let chain_valid = ctx.validate_chain(FMT, &x5c)?;

    // 6. If successful, return implementation-specific values representing attestation type
    // Anonymous CA and attestation trust path x5c.
    Ok(FormatVerifyResult {
        format: AttestationFormat::AppleAnonymous,
        is_valid: true,
        attestation_types: vec![AttestationType::AnonCa],
        trust_path: x5c,
        certificate_chain_valid: Some(chain_valid),
        metadata: AttestationMetadata::None,
    })
}
