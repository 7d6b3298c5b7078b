//! <https://www.w3.org/TR/webauthn/#sctn-android-safetynet-attestation>

use std::time::{SystemTime, UNIX_EPOCH};

use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use serde::Deserialize;
use serde_cbor_2::Value;

use super::*;
use crate::base64_data::Base64UrlSafeData;
use crate::constants::{SAFETYNET_HOSTNAME, SAFETYNET_MAX_AGE_MS};
use crate::crypto::{compute_sha256, verify_x509_signature};

const FMT: &str = "android-safetynet";

#[derive(Debug, Deserialize)]
struct JwsHeader {
    alg: String,
    #[serde(default)]
    x5c: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetAttestResponse {
    timestamp_ms: u64,
    nonce: Base64UrlSafeData,
    #[serde(default)]
    apk_package_name: String,
    #[serde(default)]
    apk_certificate_digest_sha256: Vec<String>,
    cts_profile_match: bool,
    basic_integrity: bool,
    evaluation_type: Option<String>,
}

fn invalid_response() -> WebauthnError {
    WebauthnError::format(FMT, "response is invalid")
}

/// A compact JWS, split and decoded but not yet verified.
struct CompactJws<'a> {
    header: JwsHeader,
    payload: Vec<u8>,
    signature: Vec<u8>,
    signing_input: &'a str,
}

impl<'a> CompactJws<'a> {
    fn parse(token: &'a str) -> WebauthnResult<Self> {
        let (signing_input, signature) = token.rsplit_once('.').ok_or_else(invalid_response)?;
        let (header, payload) = signing_input
            .split_once('.')
            .ok_or_else(invalid_response)?;

        let decode = |part: &str| {
            base64::decode_config(part, base64::URL_SAFE_NO_PAD).map_err(|e| {
                debug!(?e, "jws segment is not base64url");
                invalid_response()
            })
        };

        let header: JwsHeader = serde_json::from_slice(&decode(header)?).map_err(|e| {
            debug!(?e, "jws header");
            invalid_response()
        })?;

        Ok(CompactJws {
            header,
            payload: decode(payload)?,
            signature: decode(signature)?,
            signing_input,
        })
    }

    fn certificates(&self) -> WebauthnResult<Vec<x509::X509>> {
        let certs = self
            .header
            .x5c
            .iter()
            .map(|c| {
                base64::decode(c)
                    .map_err(|_| invalid_response())
                    .and_then(|der| {
                        x509::X509::from_der(&der)
                            .map_err(|_| WebauthnError::format(FMT, "x5c certificate is malformed"))
                    })
            })
            .collect::<WebauthnResult<Vec<_>>>()?;

        if certs.is_empty() {
            return Err(WebauthnError::format(FMT, "x5c is empty"));
        }
        Ok(certs)
    }

    /// Map the JWS algorithm onto COSE, and the JWS signature onto the encoding
    /// openssl verifies. ECDSA signatures are raw r || s in a JWS.
    fn cose_signature(&self) -> WebauthnResult<(COSEAlgorithm, Vec<u8>)> {
        match self.header.alg.as_str() {
            "RS256" => Ok((COSEAlgorithm::RS256, self.signature.clone())),
            "ES256" => {
                if self.signature.len() != 64 {
                    return Err(WebauthnError::format(FMT, "sig is invalid"));
                }
                let (r, s) = self.signature.split_at(32);
                let sig = EcdsaSig::from_private_components(
                    BigNum::from_slice(r)?,
                    BigNum::from_slice(s)?,
                )?;
                Ok((COSEAlgorithm::ES256, sig.to_der()?))
            }
            alg => {
                debug!(%alg, "jws alg");
                Err(WebauthnError::format(FMT, "alg is not supported"))
            }
        }
    }
}

fn now_ms() -> WebauthnResult<u128> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .map_err(|_| WebauthnError::Validation("system time is before the unix epoch".to_string()))
}

pub(crate) fn verify_android_safetynet_attestation(
    att_stmt: &Value,
    ctx: &VerificationContext<'_>,
) -> WebauthnResult<FormatVerifyResult> {
    // Concatenate authenticatorData and clientDataHash to form the data to verify.
    let data_to_verify = compute_sha256(&ctx.signed_data(FMT)?);

    // 1. Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
    // CBOR decoding on it to extract the contained fields.
    let att_stmt_map = statement_map(FMT, att_stmt)?;

    // there's only 1 version now
    match stmt_field(FMT, &att_stmt_map, "ver")? {
        Value::Text(ver) => trace!(%ver, "safetynet version"),
        _ => return Err(WebauthnError::format(FMT, "ver is invalid")),
    }

    let response = stmt_bytes(FMT, &att_stmt_map, "response")?;
    let token = std::str::from_utf8(response).map_err(|_| invalid_response())?;
    trace!(?token);

    // 2. Verify that response is a valid SafetyNet response of version ver.
    let jws = CompactJws::parse(token)?;
    let x5c = jws.certificates()?;
    let leaf_cert = &x5c[0];

    let (alg, signature) = jws.cose_signature()?;
    if !verify_x509_signature(alg, leaf_cert, &signature, jws.signing_input.as_bytes())? {
        error!("safetynet jws signature verification failed!");
        return Err(WebauthnError::format(FMT, "sig is invalid"));
    }

    let claims: SafetyNetAttestResponse = serde_json::from_slice(&jws.payload).map_err(|e| {
        debug!(?e, "safetynet payload");
        invalid_response()
    })?;

    // 3. Verify that the nonce attribute in the payload of response is identical to the Base64
    // encoding of the SHA-256 hash of the concatenation of authenticatorData and clientDataHash.
    if claims.nonce.as_ref() != data_to_verify.as_slice() {
        return Err(WebauthnError::format(FMT, "nonce does not match"));
    }

    // 4. Verify that attestationCert is issued to the hostname "attest.android.com".
    let common_name = leaf_cert
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string());

    if common_name.as_deref() != Some(SAFETYNET_HOSTNAME) {
        debug!(?common_name, "safetynet leaf hostname");
        return Err(WebauthnError::format(
            FMT,
            "attestationCert is not issued to attest.android.com",
        ));
    }

    // 5. Verify that the ctsProfileMatch and basicIntegrity attributes in the payload of
    // response are true.
    if !claims.cts_profile_match {
        return Err(WebauthnError::format(FMT, "ctsProfileMatch is false"));
    }
    if !claims.basic_integrity {
        return Err(WebauthnError::format(FMT, "basicIntegrity is false"));
    }

    // Verify sanity of timestamp in the payload
    let now = now_ms()?;
    let timestamp = u128::from(claims.timestamp_ms);
    if now.abs_diff(timestamp) > SAFETYNET_MAX_AGE_MS {
        debug!(%now, %timestamp, "safetynet timestamp");
        return Err(WebauthnError::format(FMT, "timestampMs is out of range"));
    }

    ctx.assert_certs_usable(FMT, &x5c)?;
    let chain_valid = ctx.validate_chain(FMT, &x5c)?;

    let SafetyNetAttestResponse {
        timestamp_ms: _,
        nonce: _,
        apk_package_name,
        apk_certificate_digest_sha256,
        cts_profile_match,
        basic_integrity,
        evaluation_type,
    } = claims;

    // 6. If successful, return implementation-specific values representing attestation type
    // Basic and attestation trust path x5c.
    Ok(FormatVerifyResult {
        format: AttestationFormat::AndroidSafetyNet,
        is_valid: true,
        attestation_types: vec![AttestationType::Basic],
        trust_path: x5c,
        certificate_chain_valid: Some(chain_valid),
        metadata: AttestationMetadata::AndroidSafetyNet {
            apk_package_name,
            apk_certificate_digest_sha256,
            cts_profile_match,
            basic_integrity,
            evaluation_type,
        },
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use crate::test_helpers::{self, CertAuthority, Fixture, SafetyNetClaims};
    use openssl::pkey::{PKey, Private};

    struct Setup {
        ca: CertAuthority,
        int_cert: x509::X509,
        jws_key: PKey<Private>,
        leaf: x509::X509,
        f: Fixture,
    }

    fn setup() -> Setup {
        let ca = CertAuthority::new();
        let (int_key, int_cert) = ca.issue_intermediate();
        let jws_key = test_helpers::rsa_key();
        let leaf = test_helpers::issue_leaf_from(
            &int_key,
            &int_cert,
            &jws_key,
            &[("CN", SAFETYNET_HOSTNAME)],
            Vec::new(),
        );
        let f = Fixture::new(test_helpers::ec_key(), COSEAlgorithm::ES256);
        Setup {
            ca,
            int_cert,
            jws_key,
            leaf,
            f,
        }
    }

    #[test]
    fn safetynet_rs256() {
        let Setup {
            ca,
            int_cert,
            jws_key,
            leaf,
            f,
        } = setup();
        let claims = SafetyNetClaims::valid(&f);
        let stmt =
            test_helpers::safetynet_statement("RS256", &jws_key, &[&leaf, &int_cert], &claims);

        let roots = [ca.cert.clone()];
        let r = verify_android_safetynet_attestation(&stmt, &f.context(&roots)).unwrap();
        assert_eq!(r.attestation_types, vec![AttestationType::Basic]);
        assert_eq!(r.trust_path.len(), 2);
        match r.metadata {
            AttestationMetadata::AndroidSafetyNet {
                apk_package_name,
                cts_profile_match,
                ..
            } => {
                assert_eq!(apk_package_name, "com.google.android.gms");
                assert!(cts_profile_match);
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn safetynet_es256_raw_signature() {
        let ca = CertAuthority::new();
        let jws_key = test_helpers::ec_key();
        let leaf = ca.issue_leaf(&jws_key, &[("CN", SAFETYNET_HOSTNAME)], Vec::new());
        let f = Fixture::new(test_helpers::ec_key(), COSEAlgorithm::ES256);
        let claims = SafetyNetClaims::valid(&f);
        let stmt = test_helpers::safetynet_statement("ES256", &jws_key, &[&leaf], &claims);

        let roots = [ca.cert.clone()];
        assert!(verify_android_safetynet_attestation(&stmt, &f.context(&roots)).is_ok());
    }

    #[test]
    fn safetynet_rejections() {
        let Setup {
            jws_key, leaf, f, ..
        } = setup();

        let mut claims = SafetyNetClaims::valid(&f);
        claims.cts_profile_match = false;
        let stmt = test_helpers::safetynet_statement("RS256", &jws_key, &[&leaf], &claims);
        let err = verify_android_safetynet_attestation(&stmt, &f.context(&[])).unwrap_err();
        assert_eq!(err.to_string(), "android-safetynet:ctsProfileMatch is false");

        let mut claims = SafetyNetClaims::valid(&f);
        claims.timestamp_ms -= 120_000;
        let stmt = test_helpers::safetynet_statement("RS256", &jws_key, &[&leaf], &claims);
        let err = verify_android_safetynet_attestation(&stmt, &f.context(&[])).unwrap_err();
        assert_eq!(err.to_string(), "android-safetynet:timestampMs is out of range");

        let mut claims = SafetyNetClaims::valid(&f);
        claims.nonce = base64::encode([0u8; 32]);
        let stmt = test_helpers::safetynet_statement("RS256", &jws_key, &[&leaf], &claims);
        let err = verify_android_safetynet_attestation(&stmt, &f.context(&[])).unwrap_err();
        assert_eq!(err.to_string(), "android-safetynet:nonce does not match");

        let claims = SafetyNetClaims::valid(&f);
        let other_key = test_helpers::rsa_key();
        let stmt = test_helpers::safetynet_statement("RS256", &other_key, &[&leaf], &claims);
        let err = verify_android_safetynet_attestation(&stmt, &f.context(&[])).unwrap_err();
        assert_eq!(err.to_string(), "android-safetynet:sig is invalid");
    }

    #[test]
    fn safetynet_wrong_hostname() {
        let ca = CertAuthority::new();
        let jws_key = test_helpers::rsa_key();
        let leaf = ca.issue_leaf(&jws_key, &[("CN", "attest.example.com")], Vec::new());
        let f = Fixture::new(test_helpers::ec_key(), COSEAlgorithm::ES256);
        let stmt = test_helpers::safetynet_statement(
            "RS256",
            &jws_key,
            &[&leaf],
            &SafetyNetClaims::valid(&f),
        );
        let err = verify_android_safetynet_attestation(&stmt, &f.context(&[])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "android-safetynet:attestationCert is not issued to attest.android.com"
        );
    }
}
