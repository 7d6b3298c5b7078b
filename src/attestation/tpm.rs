//! <https://w3c.github.io/webauthn/#sctn-tpm-attestation>

use std::convert::TryFrom;

use openssl::hash::{hash, MessageDigest};
use serde_cbor_2::Value;
use uuid::Uuid;

use super::extensions::{validate_extension, FidoGenCeAaguid};
use super::*;
use crate::constants::{TPM_ALG_SHA1, TPM_ALG_SHA256, TPM_ALG_SHA384, TPM_ALG_SHA512};
use crate::crypto::{assert_tpm_attest_req, only_hash_from_type, verify_x509_signature};
use crate::interface::{COSEEC2Key, COSEKeyType, ECDSACurve};
use crate::internals::{
    Tpm2bName, TpmAlgId, TpmSt, TpmiEccCurve, TpmsAttest, TpmtPublic, TpmuAttest,
    TpmuPublicId, TpmuPublicParms,
};

const FMT: &str = "tpm";

/// The TPM name of an object: nameAlg (2 bytes BE) followed by the digest of
/// the public area under nameAlg.
fn tpm_name(name_alg: TpmAlgId, pubarea_bytes: &[u8]) -> WebauthnResult<Vec<u8>> {
    let (alg_id, md) = match name_alg {
        TpmAlgId::Sha1 => (TPM_ALG_SHA1, MessageDigest::sha1()),
        TpmAlgId::Sha256 => (TPM_ALG_SHA256, MessageDigest::sha256()),
        TpmAlgId::Sha384 => (TPM_ALG_SHA384, MessageDigest::sha384()),
        TpmAlgId::Sha512 => (TPM_ALG_SHA512, MessageDigest::sha512()),
        other => {
            debug!(?other, "unsupported nameAlg");
            return Err(WebauthnError::format(FMT, "pubArea.nameAlg is not supported"));
        }
    };
    let mut name = alg_id.to_be_bytes().to_vec();
    name.extend_from_slice(&hash(md, pubarea_bytes)?);
    Ok(name)
}

fn assert_pubarea_matches(
    pubarea: &TpmtPublic,
    credential_public_key: &CredentialPublicKey,
) -> WebauthnResult<()> {
    match (
        &credential_public_key.cose.key,
        &pubarea.parameters,
        &pubarea.unique,
    ) {
        (COSEKeyType::RSA(cose_rsa), TpmuPublicParms::Rsa(_), TpmuPublicId::Rsa(modulus)) => {
            if cose_rsa.n.as_ref() != modulus.as_slice() {
                debug!("pubArea modulus differs from credentialPublicKey");
                return Err(WebauthnError::format(
                    FMT,
                    "pubArea.unique does not match credentialPublicKey",
                ));
            }
        }
        (
            COSEKeyType::EC_EC2(COSEEC2Key { curve, x, y }),
            TpmuPublicParms::Ecc(ecc_parms),
            TpmuPublicId::Ecc(point),
        ) => {
            match (curve, ecc_parms.curve_id) {
                (ECDSACurve::SECP256R1, TpmiEccCurve::NistP256)
                | (ECDSACurve::SECP384R1, TpmiEccCurve::NistP384)
                | (ECDSACurve::SECP521R1, TpmiEccCurve::NistP521) => {}
                c_mismatch => {
                    debug!(?c_mismatch, "TpmiEccCurve ID mismatch");
                    return Err(WebauthnError::format(
                        FMT,
                        "pubArea.parameters.curveId does not match credentialPublicKey",
                    ));
                }
            }

            if x.as_ref() != point.x.as_slice() || y.as_ref() != point.y.as_slice() {
                debug!("Invalid X or Y coords in TpmuPublicId");
                return Err(WebauthnError::format(
                    FMT,
                    "pubArea.unique does not match credentialPublicKey",
                ));
            }
        }
        ex => {
            debug!(?ex, "Unrecognised combination");
            return Err(WebauthnError::format(
                FMT,
                "pubArea.type does not match credentialPublicKey",
            ));
        }
    }
    Ok(())
}

pub(crate) fn verify_tpm_attestation(
    att_stmt: &Value,
    ctx: &VerificationContext<'_>,
) -> WebauthnResult<FormatVerifyResult> {
    debug!("begin verify_tpm_attest");

    // Concatenate authenticatorData and clientDataHash to form attToBeSigned.
    let verification_data = ctx.signed_data(FMT)?;
    let acd = ctx.acd(FMT)?;
    let credential_public_key = ctx.credential_public_key(FMT)?;

    let att_stmt_map = statement_map(FMT, att_stmt)?;

    // The version of the TPM specification to which the signature conforms.
    match stmt_field(FMT, &att_stmt_map, "ver")? {
        Value::Text(ver) if ver == "2.0" => {}
        Value::Text(ver) => {
            debug!(%ver, "tpm version");
            return Err(WebauthnError::format(FMT, "ver is not supported"));
        }
        _ => return Err(WebauthnError::format(FMT, "ver is invalid")),
    }

    // A COSEAlgorithmIdentifier containing the identifier of the algorithm used to generate
    // the attestation signature.
    let alg = stmt_alg(FMT, &att_stmt_map)?;

    // The TPMS_ATTEST structure over which the above signature was computed.
    let certinfo_bytes = stmt_bytes(FMT, &att_stmt_map, "certInfo")?;
    let certinfo = TpmsAttest::try_from(certinfo_bytes)?;

    // The TPMT_PUBLIC structure used by the TPM to represent the credential public key.
    let pubarea_bytes = stmt_bytes(FMT, &att_stmt_map, "pubArea")?;
    let pubarea = TpmtPublic::try_from(pubarea_bytes)?;
    trace!(?certinfo, ?pubarea);

    // The attestation signature, in the form of a TPMT_SIGNATURE structure.
    let sig = stmt_bytes(FMT, &att_stmt_map, "sig")?;

    // aik_cert followed by its certificate chain, in X.509 encoding.
    let x5c = stmt_x5c(FMT, &att_stmt_map)?;
    let aik_cert = &x5c[0];

    // Verify that the public key specified by the parameters and unique fields of pubArea is
    // identical to the credentialPublicKey in the attestedCredentialData in authenticatorData.
    assert_pubarea_matches(&pubarea, credential_public_key)?;

    // Validate that certInfo is valid:
    // Verify that magic is set to TPM_GENERATED_VALUE. Done in parsing.

    // Verify that type is set to TPM_ST_ATTEST_CERTIFY.
    if certinfo.type_ != TpmSt::AttestCertify {
        return Err(WebauthnError::format(
            FMT,
            "certInfo.type is not TPM_ST_ATTEST_CERTIFY",
        ));
    }

    // Verify that extraData is set to the hash of attToBeSigned using the hash algorithm
    // employed in "alg".
    let extra_data = certinfo
        .extra_data
        .as_ref()
        .ok_or_else(|| WebauthnError::format(FMT, "certInfo.extraData is missing"))?;

    let hash_verification_data = only_hash_from_type(alg, &verification_data)?;
    if &hash_verification_data != extra_data {
        return Err(WebauthnError::format(
            FMT,
            "certInfo.extraData does not match the hash of attToBeSigned",
        ));
    }

    // Verify that attested contains a TPMS_CERTIFY_INFO structure whose name field contains
    // a valid Name for pubArea, as computed using the algorithm in the nameAlg field of pubArea.
    match &certinfo.typeattested {
        TpmuAttest::AttestCertify(Tpm2bName::Digest(name), _qname) => {
            let expected = tpm_name(pubarea.name_alg, pubarea_bytes)?;
            if &expected != name {
                return Err(WebauthnError::format(
                    FMT,
                    "certInfo.attested.name does not match pubArea",
                ));
            }
        }
        TpmuAttest::AttestCertify(_, _) => {
            return Err(WebauthnError::format(
                FMT,
                "certInfo.attested.name is not a digest",
            ))
        }
        TpmuAttest::Invalid => {
            return Err(WebauthnError::format(FMT, "certInfo.attested is invalid"))
        }
    }

    // qualifiedSigner, clockInfo and firmwareVersion are not verified. The firmware
    // version is surfaced in the metadata.

    // Verify the sig is a valid signature over certInfo using the attestation public key in
    // aik_cert with the algorithm specified in alg.
    if !verify_x509_signature(alg, aik_cert, sig, certinfo_bytes)? {
        trace!("tpm aik signature invalid");
        return Err(WebauthnError::format(FMT, "sig is invalid"));
    }

    // Verify that aik_cert meets the requirements in § 8.3.1 TPM Attestation Statement
    // Certificate Requirements.
    assert_tpm_attest_req(aik_cert)?;

    // If aik_cert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4 (id-fido-gen-ce-aaguid)
    // verify that the value of this extension matches the aaguid in authenticatorData.
    validate_extension::<FidoGenCeAaguid>(FMT, aik_cert, &acd.aaguid)?;

    ctx.assert_certs_usable(FMT, &x5c)?;
    let chain_valid = ctx.validate_chain(FMT, &x5c)?;

    // If successful, return implementation-specific values representing attestation type AttCA
    // and attestation trust path x5c.
    Ok(FormatVerifyResult {
        format: AttestationFormat::Tpm,
        is_valid: true,
        attestation_types: vec![AttestationType::AttCa],
        trust_path: x5c,
        certificate_chain_valid: Some(chain_valid),
        metadata: AttestationMetadata::Tpm {
            aaguid: Uuid::from_bytes(acd.aaguid),
            firmware_version: certinfo.firmware_version,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{self, CertAuthority, Fixture, TpmFixture};

    fn rsa_fixture() -> (CertAuthority, Fixture, TpmFixture) {
        let ca = CertAuthority::new();
        let f = Fixture::new(test_helpers::rsa_key(), COSEAlgorithm::RS256);
        let t = TpmFixture::new(&ca, &f, TPM_ALG_SHA256);
        (ca, f, t)
    }

    #[test]
    fn tpm_rsa_attestation() {
        let (ca, f, t) = rsa_fixture();
        let stmt = t.statement(&f);
        let roots = [ca.cert.clone()];
        let r = verify_tpm_attestation(&stmt, &f.context(&roots)).unwrap();
        assert_eq!(r.attestation_types, vec![AttestationType::AttCa]);
        assert_eq!(r.certificate_chain_valid, Some(true));
        assert_eq!(
            r.metadata,
            AttestationMetadata::Tpm {
                aaguid: Uuid::from_bytes(f.aaguid),
                firmware_version: test_helpers::TPM_FIRMWARE_VERSION,
            }
        );

        let bad = test_helpers::corrupt_sig(&stmt);
        let err = verify_tpm_attestation(&bad, &f.context(&roots)).unwrap_err();
        assert_eq!(err.to_string(), "tpm:sig is invalid");
    }

    #[test]
    fn tpm_ecc_attestation_with_sha1_name() {
        let ca = CertAuthority::new();
        let f = Fixture::new(test_helpers::ec_key(), COSEAlgorithm::ES256);
        let t = TpmFixture::new(&ca, &f, TPM_ALG_SHA1);
        assert!(verify_tpm_attestation(&t.statement(&f), &f.context(&[])).is_ok());
    }

    #[test]
    fn tpm_rejects_bad_version_and_mismatches() {
        let (_ca, f, t) = rsa_fixture();

        let stmt = test_helpers::with_field(&t.statement(&f), "ver", Value::Text("1.2".into()));
        let err = verify_tpm_attestation(&stmt, &f.context(&[])).unwrap_err();
        assert_eq!(err.to_string(), "tpm:ver is not supported");

        // A pubArea for another key.
        let other = Fixture::new(test_helpers::rsa_key(), COSEAlgorithm::RS256);
        let stmt = test_helpers::with_field(
            &t.statement(&f),
            "pubArea",
            Value::Bytes(test_helpers::tpm_pub_area(&other.cpk, TPM_ALG_SHA256)),
        );
        let err = verify_tpm_attestation(&stmt, &f.context(&[])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tpm:pubArea.unique does not match credentialPublicKey"
        );

        // extraData bound to different client data.
        let other_cdh = [0x55u8; 32];
        let stmt = t.statement_with_extra_data(&f, &only_hash_from_type(
            COSEAlgorithm::RS256,
            &[f.auth_data_bytes.as_slice(), &other_cdh].concat(),
        )
        .unwrap());
        let err = verify_tpm_attestation(&stmt, &f.context(&[])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tpm:certInfo.extraData does not match the hash of attToBeSigned"
        );
    }

    #[test]
    fn tpm_name_prefixes_alg() {
        let name = tpm_name(TpmAlgId::Sha256, b"pubarea").unwrap();
        assert_eq!(&name[..2], &[0x00, 0x0b]);
        assert_eq!(name.len(), 34);
        assert!(tpm_name(TpmAlgId::Null, b"pubarea").is_err());
    }
}
