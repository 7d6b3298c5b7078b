//! <https://www.w3.org/TR/webauthn-3/#sctn-android-key-attestation>

use serde_cbor_2::Value;

use super::extensions::{validate_extension, AndroidKeyAttestationExtensionData};
use super::*;
use crate::crypto::verify_x509_signature;

const FMT: &str = "android-key";

pub(crate) fn verify_android_key_attestation(
    att_stmt: &Value,
    ctx: &VerificationContext<'_>,
) -> WebauthnResult<FormatVerifyResult> {
    // Concatenate authenticatorData and clientDataHash to form the data to verify.
    let data_to_verify = ctx.signed_data(FMT)?;
    let client_data_hash = ctx.client_data_hash(FMT)?;
    let credential_public_key = ctx.credential_public_key(FMT)?;

    // 1. Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
    // CBOR decoding on it to extract the contained fields.
    let att_stmt_map = statement_map(FMT, att_stmt)?;
    let alg = stmt_alg(FMT, &att_stmt_map)?;
    let sig = stmt_bytes(FMT, &att_stmt_map, "sig")?;
    let x5c = stmt_x5c(FMT, &att_stmt_map)?;
    let attestn_cert = &x5c[0];

    // 2. Verify that sig is a valid signature over the concatenation of authenticatorData and
    // clientDataHash using the public key in the first certificate in x5c with the algorithm
    // specified in alg.
    if !verify_x509_signature(alg, attestn_cert, sig, &data_to_verify)? {
        error!("signature verification failed!");
        return Err(WebauthnError::format(FMT, "sig is invalid"));
    }

    // 3. Verify that the public key in the first certificate in x5c matches the
    // credentialPublicKey in the attestedCredentialData in authenticatorData.
    if !subject_key_matches(attestn_cert, credential_public_key)? {
        return Err(WebauthnError::format(
            FMT,
            "credentialPublicKey does not match the leaf certificate",
        ));
    }

    // 4. Verify that the attestationChallenge field in the attestation certificate extension
    // data is identical to clientDataHash. The AuthorizationList.allApplications field must not
    // be present on either authorization list.
    let metadata = validate_extension::<AndroidKeyAttestationExtensionData>(
        FMT,
        attestn_cert,
        &client_data_hash.to_vec(),
    )?;
    trace!(?metadata, "android key authorizations");

    ctx.assert_certs_usable(FMT, &x5c)?;
    let chain_valid = ctx.validate_chain(FMT, &x5c)?;

    // 5. If successful, return implementation-specific values representing attestation type
    // Basic and attestation trust path x5c.
    Ok(FormatVerifyResult {
        format: AttestationFormat::AndroidKey,
        is_valid: true,
        attestation_types: vec![AttestationType::Basic],
        trust_path: x5c,
        certificate_chain_valid: Some(chain_valid),
        metadata,
    })
}
