//! <https://w3c.github.io/webauthn/#sctn-fido-u2f-attestation>

use serde_cbor_2::Value;

use super::*;
use crate::crypto::{is_secp256r1, verify_x509_signature};
use crate::interface::{COSEEC2Key, COSEKeyType, ECDSACurve};

const FMT: &str = "fido-u2f";

pub(crate) fn verify_fidou2f_attestation(
    att_stmt: &Value,
    ctx: &VerificationContext<'_>,
) -> WebauthnResult<FormatVerifyResult> {
    let auth_data = ctx.auth_data(FMT)?;
    let acd = ctx.acd(FMT)?;
    let client_data_hash = ctx.client_data_hash(FMT)?;
    let credential_public_key = ctx.credential_public_key(FMT)?;

    // Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
    // CBOR decoding on it to extract the contained fields.
    let att_stmt_map = statement_map(FMT, att_stmt)?;
    let sig = stmt_bytes(FMT, &att_stmt_map, "sig")?;

    // Check that x5c has exactly one element and let att_cert be that element.
    let x5c = stmt_x5c(FMT, &att_stmt_map)?;
    if x5c.len() != 1 {
        debug!(len = x5c.len(), "fido-u2f x5c length");
        return Err(WebauthnError::format(FMT, "x5c must contain exactly one certificate"));
    }
    let att_cert = &x5c[0];

    // If certificate public key is not an Elliptic Curve (EC) public key over the P-256 curve,
    // terminate this algorithm and return an appropriate error.
    if !is_secp256r1(att_cert)? {
        return Err(WebauthnError::format(
            FMT,
            "certificate public key is not an EC P-256 key",
        ));
    }

    // Convert the COSE_KEY formatted credentialPublicKey to Raw ANSI X9.62 public key format
    // (ALG_KEY_ECC_X962_RAW). The x and y coordinates must each be 32 bytes.
    let public_key_u2f = match &credential_public_key.cose.key {
        COSEKeyType::EC_EC2(COSEEC2Key {
            curve: ECDSACurve::SECP256R1,
            x,
            y,
        }) if x.len() == 32 && y.len() == 32 => {
            credential_public_key.cose.get_alg_key_ecc_x962_raw()?
        }
        _ => {
            return Err(WebauthnError::format(
                FMT,
                "credentialPublicKey is not an EC P-256 key",
            ))
        }
    };

    // Let verificationData be the concatenation of
    // (0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F).
    let r: [u8; 1] = [0x00];
    let verification_data: Vec<u8> = r
        .iter()
        .chain(auth_data.rp_id_hash.iter())
        .chain(client_data_hash.iter())
        .chain(acd.credential_id.iter())
        .chain(public_key_u2f.iter())
        .copied()
        .collect();

    // Verify the sig using verificationData and certificate public key per [SEC1].
    if !verify_x509_signature(COSEAlgorithm::ES256, att_cert, sig, &verification_data)? {
        error!("signature verification failed!");
        return Err(WebauthnError::format(FMT, "sig is invalid"));
    }

    ctx.assert_certs_usable(FMT, &x5c)?;
    let chain_valid = ctx.validate_chain(FMT, &x5c)?;

    // Optionally, inspect x5c and consult externally provided knowledge to determine whether
    // attStmt conveys a Basic or AttCA attestation. Metadata narrows this later.
    Ok(FormatVerifyResult {
        format: AttestationFormat::FIDOU2F,
        is_valid: true,
        attestation_types: vec![AttestationType::Basic, AttestationType::AttCa],
        trust_path: x5c,
        certificate_chain_valid: Some(chain_valid),
        metadata: AttestationMetadata::None,
    })
}
