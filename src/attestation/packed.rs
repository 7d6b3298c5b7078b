//! <https://w3c.github.io/webauthn/#sctn-packed-attestation>

use serde_cbor_2::Value;
use uuid::Uuid;

use super::extensions::{validate_extension, FidoGenCeAaguid};
use super::*;
use crate::crypto::{assert_packed_attest_req, verify_signature, verify_x509_signature};

const FMT: &str = "packed";

// Perform the Verification procedure for 8.2. Packed Attestation Statement Format
pub(crate) fn verify_packed_attestation(
    att_stmt: &Value,
    ctx: &VerificationContext<'_>,
) -> WebauthnResult<FormatVerifyResult> {
    let verification_data = ctx.signed_data(FMT)?;
    let acd = ctx.acd(FMT)?;
    let credential_public_key = ctx.credential_public_key(FMT)?;

    // Verify that attStmt is valid CBOR conforming to the syntax defined above and perform CBOR
    // decoding on it to extract the contained fields.
    let att_stmt_map = statement_map(FMT, att_stmt)?;
    let alg = stmt_alg(FMT, &att_stmt_map)?;
    let sig = stmt_bytes(FMT, &att_stmt_map, "sig")?;

    match (att_stmt_map.get("x5c"), att_stmt_map.get("ecdaaKeyId")) {
        (Some(_), _) => {
            // If x5c is present, this indicates that the attestation type is not ECDAA.
            // x5c: [ attestnCert: bytes, * (caCert: bytes) ]
            let x5c = stmt_x5c(FMT, &att_stmt_map)?;
            let attestn_cert = &x5c[0];

            // Verify that sig is a valid signature over the concatenation of authenticatorData
            // and clientDataHash using the attestation public key in attestnCert with the
            // algorithm specified in alg.
            if !verify_x509_signature(alg, attestn_cert, sig, &verification_data)? {
                trace!("packed x509 signature invalid");
                return Err(WebauthnError::format(FMT, "sig is invalid"));
            }

            // Verify that attestnCert meets the requirements in § 8.2.1 Packed Attestation
            // Statement Certificate Requirements.
            assert_packed_attest_req(attestn_cert)?;

            // If attestnCert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
            // (id-fido-gen-ce-aaguid) verify that the value of this extension matches the aaguid
            // in authenticatorData.
            validate_extension::<FidoGenCeAaguid>(FMT, attestn_cert, &acd.aaguid)?;

            ctx.assert_certs_usable(FMT, &x5c)?;
            let chain_valid = ctx.validate_chain(FMT, &x5c)?;

            Ok(FormatVerifyResult {
                format: AttestationFormat::Packed,
                is_valid: true,
                attestation_types: vec![AttestationType::Basic, AttestationType::AttCa],
                trust_path: x5c,
                certificate_chain_valid: Some(chain_valid),
                metadata: AttestationMetadata::Packed {
                    aaguid: Uuid::from_bytes(acd.aaguid),
                },
            })
        }
        (None, Some(_ecdaa_key_id)) => {
            debug!("ecdaaKeyId present");
            Err(WebauthnError::format(FMT, "ecdaa is not supported"))
        }
        (None, None) => {
            // If neither x5c nor ecdaaKeyId is present, self attestation is in use.

            // Validate that alg matches the algorithm of the credentialPublicKey in authenticatorData.
            if alg != credential_public_key.alg {
                return Err(WebauthnError::format(
                    FMT,
                    format!(
                        "alg({}) does not match the credential alg({})",
                        alg, credential_public_key.alg
                    ),
                ));
            }

            // Verify that sig is a valid signature over the concatenation of authenticatorData
            // and clientDataHash using the credential public key with alg.
            let pkey = credential_public_key.to_pkey()?;
            if !verify_signature(alg, &pkey, sig, &verification_data)? {
                trace!("Invalid Self Attestation Signature");
                return Err(WebauthnError::format(FMT, "sig is invalid"));
            }

            Ok(FormatVerifyResult {
                format: AttestationFormat::Packed,
                is_valid: true,
                attestation_types: vec![AttestationType::Self_],
                trust_path: Vec::new(),
                certificate_chain_valid: None,
                metadata: AttestationMetadata::None,
            })
        }
    }
}
