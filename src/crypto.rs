//! Cryptographic operation wrapper for Webauthn. This module exists to
//! allow ease of auditing, safe operation wrappers for the webauthn library,
//! and cryptographic provider abstraction. This module currently uses OpenSSL
//! as the cryptographic primitive provider.
//!
//! It also contains the key codec, which renders a COSE credential key as a JWK
//! and as a PEM encoded public key.

#![allow(non_camel_case_types)]

use std::convert::TryFrom;

use openssl::{bn, ec, hash, nid, pkey, rsa, sha, sign, x509};

use crate::constants::*;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;

// Why OpenSSL over another rust crate?
// - Well, the openssl crate allows us to reconstruct a public key from the
//   x/y group coords, where most others want a pkcs formatted structure. As
//   a result, it's easiest to use openssl as it gives us exactly what we need
//   for these operations.

fn cose_err(msg: &str) -> WebauthnError {
    WebauthnError::Parse(format!("credentialPublicKey: {}", msg))
}

impl ECDSACurve {
    pub(crate) fn to_openssl_nid(self) -> nid::Nid {
        match self {
            ECDSACurve::SECP256R1 => nid::Nid::X9_62_PRIME256V1,
            ECDSACurve::SECP384R1 => nid::Nid::SECP384R1,
            ECDSACurve::SECP521R1 => nid::Nid::SECP521R1,
        }
    }

    fn from_jwk_name(crv: &str) -> Option<Self> {
        match crv {
            "P-256" => Some(ECDSACurve::SECP256R1),
            "P-384" => Some(ECDSACurve::SECP384R1),
            "P-521" => Some(ECDSACurve::SECP521R1),
            _ => None,
        }
    }
}

impl EDDSACurve {
    fn to_openssl_id(self) -> pkey::Id {
        match self {
            EDDSACurve::ED25519 => pkey::Id::ED25519,
            EDDSACurve::ED448 => pkey::Id::ED448,
        }
    }

    fn from_jwk_name(crv: &str) -> Option<Self> {
        match crv {
            "Ed25519" => Some(EDDSACurve::ED25519),
            "Ed448" => Some(EDDSACurve::ED448),
            _ => None,
        }
    }
}

impl TryFrom<&serde_cbor_2::Value> for COSEKey {
    type Error = WebauthnError;

    fn try_from(d: &serde_cbor_2::Value) -> Result<COSEKey, Self::Error> {
        let m = cbor_try_map!(d)?;

        // See also https://tools.ietf.org/html/rfc8152#section-3.1
        // These values look like:
        // Object({
        //     // negative (-) values are per-algo specific
        //     Integer(-3): Bytes([48, 185, 178, 204, 113, 186, 105, 138, 190, 33, 160, 46, 131, 253, 100, 177, 91, 243, 126, 128, 245, 119, 209, 59, 186, 41, 215, 196, 24, 222, 46, 102]),
        //     Integer(-2): Bytes([158, 212, 171, 234, 165, 197, 86, 55, 141, 122, 253, 6, 92, 242, 242, 114, 158, 221, 238, 163, 127, 214, 120, 157, 145, 226, 232, 250, 144, 150, 218, 138]),
        //     Integer(-1): U64(1),
        //     Integer(1): U64(2), // key type
        //     Integer(3): I64(-7) // algorithm, -7 being ES256 + SHA256
        // })
        let get = |k: i128| {
            m.get(&serde_cbor_2::Value::Integer(k))
                .ok_or_else(|| cose_err(&format!("missing label {}", k)))
        };

        let key_type = cbor_try_i128!(get(1)?)?;
        let content_type = cbor_try_i128!(get(3)?)?;
        let type_ = COSEAlgorithm::try_from(content_type)?;

        let cose_key = if key_type == (COSEKeyTypeId::EC_EC2 as i128)
            && matches!(
                type_,
                COSEAlgorithm::ES256 | COSEAlgorithm::ES384 | COSEAlgorithm::ES512
            ) {
            // crv (-1), x (-2) and y (-3)
            let curve = ECDSACurve::try_from(cbor_try_i128!(get(-1)?)?)?;
            let x = cbor_try_bytes!(get(-2)?)?;
            let y = cbor_try_bytes!(get(-3)?)?;

            let coord_len = curve.coordinate_size();
            if x.len() != coord_len || y.len() != coord_len {
                return Err(cose_err("EC2 coordinates have an invalid length"));
            }

            COSEKey {
                type_,
                key: COSEKeyType::EC_EC2(COSEEC2Key {
                    curve,
                    x: x.clone().into(),
                    y: y.clone().into(),
                }),
            }
        } else if key_type == (COSEKeyTypeId::EC_RSA as i128)
            && matches!(
                type_,
                COSEAlgorithm::RS256
                    | COSEAlgorithm::RS384
                    | COSEAlgorithm::RS512
                    | COSEAlgorithm::PS256
                    | COSEAlgorithm::PS384
                    | COSEAlgorithm::PS512
                    | COSEAlgorithm::INSECURE_RS1
            )
        {
            // n (-1), e (-2)
            let n = cbor_try_bytes!(get(-1)?)?;
            let e = cbor_try_bytes!(get(-2)?)?;

            if n.is_empty() || e.is_empty() {
                return Err(cose_err("RSA n or e is empty"));
            }

            COSEKey {
                type_,
                key: COSEKeyType::RSA(COSERSAKey {
                    n: n.clone().into(),
                    e: e.clone().into(),
                }),
            }
        } else if key_type == (COSEKeyTypeId::EC_OKP as i128) && type_ == COSEAlgorithm::EDDSA {
            // https://datatracker.ietf.org/doc/html/rfc8152#section-13.2
            let curve = EDDSACurve::try_from(cbor_try_i128!(get(-1)?)?)?;
            let x = cbor_try_bytes!(get(-2)?)?;

            if x.len() != curve.coordinate_size() {
                return Err(cose_err("OKP x has an invalid length"));
            }

            COSEKey {
                type_,
                key: COSEKeyType::EC_OKP(COSEOKPKey {
                    curve,
                    x: x.clone().into(),
                }),
            }
        } else {
            debug!(?key_type, ?type_, "unsupported cose key type");
            return Err(cose_err("unsupported key type and algorithm combination"));
        };

        // The rfc additionally states:
        //   "   Applications MUST check that the curve and the key type are
        //     consistent and reject a key if they are not."
        // this means feeding the values to openssl to validate them for us!
        cose_key.validate()?;
        Ok(cose_key)
    }
}

impl COSEKey {
    /// The concatenation 0x04 || x || y, the uncompressed X9.62 point.
    pub(crate) fn get_alg_key_ecc_x962_raw(&self) -> WebauthnResult<Vec<u8>> {
        match &self.key {
            COSEKeyType::EC_EC2(ecpk) => {
                let r: [u8; 1] = [0x04];
                Ok(r.iter()
                    .chain(ecpk.x.iter())
                    .chain(ecpk.y.iter())
                    .copied()
                    .collect())
            }
            _ => Err(cose_err("key is not an EC2 key")),
        }
    }

    pub(crate) fn validate(&self) -> WebauthnResult<()> {
        self.get_openssl_pkey().map(|_| ())
    }

    /// Reconstruct this key as an OpenSSL public key.
    pub fn get_openssl_pkey(&self) -> WebauthnResult<pkey::PKey<pkey::Public>> {
        jwk_to_pkey(&cose_to_jwk(self))
    }

    /// Verify a signature made by this key with its declared algorithm.
    pub fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> WebauthnResult<bool> {
        let pkey = self.get_openssl_pkey()?;
        verify_signature(self.type_, &pkey, signature, verification_data)
    }
}

/// Render a COSE key as a JWK.
pub fn cose_to_jwk(key: &COSEKey) -> Jwk {
    let alg = Some(key.type_.jwa_name().to_string());
    match &key.key {
        COSEKeyType::EC_EC2(ec2k) => Jwk::EC {
            crv: ec2k.curve.jwk_name().to_string(),
            x: ec2k.x.clone(),
            y: ec2k.y.clone(),
            alg,
        },
        COSEKeyType::RSA(rsak) => Jwk::RSA {
            n: rsak.n.clone(),
            e: rsak.e.clone(),
            alg,
        },
        COSEKeyType::EC_OKP(okpk) => Jwk::OKP {
            crv: okpk.curve.jwk_name().to_string(),
            x: okpk.x.clone(),
            alg,
        },
    }
}

/// Reconstruct an OpenSSL public key from a JWK, validating that EC points lie on
/// the declared curve.
pub fn jwk_to_pkey(jwk: &Jwk) -> WebauthnResult<pkey::PKey<pkey::Public>> {
    match jwk {
        Jwk::EC { crv, x, y, .. } => {
            let curve = ECDSACurve::from_jwk_name(crv)
                .ok_or_else(|| cose_err(&format!("unsupported EC curve {}", crv)))?;
            let ec_group = ec::EcGroup::from_curve_name(curve.to_openssl_nid())?;
            let xbn = bn::BigNum::from_slice(x)?;
            let ybn = bn::BigNum::from_slice(y)?;

            let ec_key = ec::EcKey::from_public_key_affine_coordinates(&ec_group, &xbn, &ybn)?;
            // Validate the key is sound. This checks the point is on the curve.
            ec_key.check_key()?;
            pkey::PKey::from_ec_key(ec_key).map_err(WebauthnError::OpenSSLError)
        }
        Jwk::RSA { n, e, .. } => {
            let nbn = bn::BigNum::from_slice(n)?;
            let ebn = bn::BigNum::from_slice(e)?;
            let rsa_key = rsa::Rsa::from_public_components(nbn, ebn)?;
            pkey::PKey::from_rsa(rsa_key).map_err(WebauthnError::OpenSSLError)
        }
        Jwk::OKP { crv, x, .. } => {
            let curve = EDDSACurve::from_jwk_name(crv)
                .ok_or_else(|| cose_err(&format!("unsupported OKP curve {}", crv)))?;
            pkey::PKey::public_key_from_raw_bytes(x, curve.to_openssl_id())
                .map_err(WebauthnError::OpenSSLError)
        }
    }
}

/// Render a JWK as a PEM encoded SubjectPublicKeyInfo.
pub fn jwk_to_pem(jwk: &Jwk) -> WebauthnResult<String> {
    let pkey = jwk_to_pkey(jwk)?;
    let pem = pkey.public_key_to_pem()?;
    String::from_utf8(pem).map_err(|_| cose_err("pem is not utf8"))
}

/// Render a COSE key as a PEM encoded SubjectPublicKeyInfo.
pub fn cose_to_pem(key: &COSEKey) -> WebauthnResult<String> {
    jwk_to_pem(&cose_to_jwk(key))
}

impl TryFrom<&serde_cbor_2::Value> for CredentialPublicKey {
    type Error = WebauthnError;

    fn try_from(value: &serde_cbor_2::Value) -> Result<Self, Self::Error> {
        let cose = COSEKey::try_from(value)?;
        let jwk = cose_to_jwk(&cose);
        let pem = jwk_to_pem(&jwk)?;
        Ok(CredentialPublicKey {
            alg: cose.type_,
            cose,
            jwk,
            pem,
        })
    }
}

impl CredentialPublicKey {
    /// The key as an OpenSSL public key.
    pub fn to_pkey(&self) -> WebauthnResult<pkey::PKey<pkey::Public>> {
        pkey::PKey::public_key_from_pem(self.pem.as_bytes()).map_err(WebauthnError::OpenSSLError)
    }
}

fn digest_for(alg: COSEAlgorithm) -> Option<hash::MessageDigest> {
    match alg {
        COSEAlgorithm::ES256 | COSEAlgorithm::RS256 | COSEAlgorithm::PS256 => {
            Some(hash::MessageDigest::sha256())
        }
        COSEAlgorithm::ES384 | COSEAlgorithm::RS384 | COSEAlgorithm::PS384 => {
            Some(hash::MessageDigest::sha384())
        }
        COSEAlgorithm::ES512 | COSEAlgorithm::RS512 | COSEAlgorithm::PS512 => {
            Some(hash::MessageDigest::sha512())
        }
        COSEAlgorithm::INSECURE_RS1 => {
            warn!("INSECURE SHA1 USAGE DETECTED");
            Some(hash::MessageDigest::sha1())
        }
        COSEAlgorithm::EDDSA => None,
    }
}

/// Verify `signature` over `verification_data` with `pkey` under `alg`. An
/// unparseable signature is reported as invalid rather than as an error.
pub fn verify_signature(
    alg: COSEAlgorithm,
    pkey: &pkey::PKeyRef<pkey::Public>,
    signature: &[u8],
    verification_data: &[u8],
) -> WebauthnResult<bool> {
    let res = match digest_for(alg) {
        None => {
            let mut verifier = sign::Verifier::new_without_digest(pkey)?;
            verifier.verify_oneshot(signature, verification_data)
        }
        Some(md) => {
            let mut verifier = sign::Verifier::new(md, pkey)?;
            if matches!(
                alg,
                COSEAlgorithm::PS256 | COSEAlgorithm::PS384 | COSEAlgorithm::PS512
            ) {
                verifier.set_rsa_padding(rsa::Padding::PKCS1_PSS)?;
                verifier.set_rsa_pss_saltlen(sign::RsaPssSaltlen::DIGEST_LENGTH)?;
                verifier.set_rsa_mgf1_md(md)?;
            }
            verifier.update(verification_data)?;
            verifier.verify(signature)
        }
    };

    Ok(res.unwrap_or_else(|e| {
        debug!(?e, ?alg, "signature verification error");
        false
    }))
}

/// Verify a signature with the public key of an x509 certificate.
pub(crate) fn verify_x509_signature(
    alg: COSEAlgorithm,
    cert: &x509::X509Ref,
    signature: &[u8],
    verification_data: &[u8],
) -> WebauthnResult<bool> {
    let pkey = cert.public_key()?;
    verify_signature(alg, &pkey, signature, verification_data)
}

/// Hash `input` with the digest implied by `alg`.
pub(crate) fn only_hash_from_type(alg: COSEAlgorithm, input: &[u8]) -> WebauthnResult<Vec<u8>> {
    match digest_for(alg) {
        Some(md) => Ok(hash::hash(md, input)?.to_vec()),
        None => {
            debug!(?alg, "algorithm has no standalone digest");
            Err(WebauthnError::Validation(format!(
                "{} does not imply a hash algorithm",
                alg
            )))
        }
    }
}

/// Infer the COSE algorithm a stored public key signs with.
pub(crate) fn infer_alg(pkey: &pkey::PKeyRef<pkey::Public>) -> WebauthnResult<COSEAlgorithm> {
    match pkey.id() {
        pkey::Id::EC => {
            let ec_key = pkey.ec_key()?;
            match ec_key.group().curve_name() {
                Some(nid::Nid::X9_62_PRIME256V1) => Ok(COSEAlgorithm::ES256),
                Some(nid::Nid::SECP384R1) => Ok(COSEAlgorithm::ES384),
                Some(nid::Nid::SECP521R1) => Ok(COSEAlgorithm::ES512),
                c => Err(WebauthnError::Parse(format!("unsupported EC curve {:?}", c))),
            }
        }
        pkey::Id::RSA => Ok(COSEAlgorithm::RS256),
        pkey::Id::ED25519 | pkey::Id::ED448 => Ok(COSEAlgorithm::EDDSA),
        id => Err(WebauthnError::Parse(format!("unsupported key type {:?}", id))),
    }
}

/// Compute the sha256 of a slice of data.
pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
    sha::sha256(data)
}

pub(crate) fn is_secp256r1(cert: &x509::X509Ref) -> WebauthnResult<bool> {
    let pk = cert.public_key()?;
    if pk.id() != pkey::Id::EC {
        return Ok(false);
    }
    let ec_key = pk.ec_key()?;
    ec_key.check_key()?;
    Ok(ec_key.group().curve_name() == Some(nid::Nid::X9_62_PRIME256V1))
}

/// A certificate that is issued by, and signed by, itself.
pub(crate) fn is_self_signed(cert: &x509::X509Ref) -> bool {
    cert.issued(cert) == x509::X509VerifyResult::OK
        && cert
            .public_key()
            .and_then(|pk| cert.verify(&pk))
            .unwrap_or(false)
}

/// Attestation and intermediate certificates must never be trust anchors.
pub(crate) fn assert_not_root(format: &str, cert: &x509::X509Ref) -> WebauthnResult<()> {
    if is_self_signed(cert) {
        Err(WebauthnError::format(
            format,
            "x5c must not contain a root certificate",
        ))
    } else {
        Ok(())
    }
}

fn first_entry_utf8(name: &x509::X509NameRef, n: nid::Nid) -> Option<String> {
    name.entries_by_nid(n)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string())
}

fn with_parsed_cert<T>(
    format: &str,
    cert: &x509::X509Ref,
    f: impl FnOnce(&x509_parser::certificate::X509Certificate<'_>) -> WebauthnResult<T>,
) -> WebauthnResult<T> {
    let der = cert.to_der()?;
    let (_, parsed) = x509_parser::parse_x509_certificate(&der)
        .map_err(|_| WebauthnError::format(format, "certificate is malformed"))?;
    f(&parsed)
}

fn assert_not_ca(
    format: &str,
    cert: &x509_parser::certificate::X509Certificate<'_>,
) -> WebauthnResult<()> {
    match cert.basic_constraints() {
        Ok(Some(bc)) if bc.value.ca => Err(WebauthnError::format(
            format,
            "Basic Constraints CA must be false",
        )),
        Ok(_) => Ok(()),
        Err(_) => Err(WebauthnError::format(
            format,
            "Basic Constraints extension is malformed",
        )),
    }
}

/// Packed attestation statement certificate requirements.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation-cert-requirements>
pub(crate) fn assert_packed_attest_req(cert: &x509::X509Ref) -> WebauthnResult<()> {
    const FMT: &str = "packed";

    // Version MUST be set to 3 (which is indicated by an ASN.1 INTEGER with value 2).
    if cert.version() != 2 {
        return Err(WebauthnError::format(FMT, "certificate version must be 3"));
    }

    let subject = cert.subject_name();

    // Subject-C: ISO 3166 code specifying the country where the vendor is incorporated
    match first_entry_utf8(subject, nid::Nid::COUNTRYNAME) {
        Some(c) if c.len() == 2 => {}
        _ => return Err(WebauthnError::format(FMT, "subject C is invalid")),
    }

    // Subject-O: legal name of the Authenticator vendor
    match first_entry_utf8(subject, nid::Nid::ORGANIZATIONNAME) {
        Some(o) if !o.is_empty() => {}
        _ => return Err(WebauthnError::format(FMT, "subject O is invalid")),
    }

    // Subject-OU: literal string "Authenticator Attestation"
    match first_entry_utf8(subject, nid::Nid::ORGANIZATIONALUNITNAME) {
        Some(ou) if ou == PACKED_SUBJECT_OU => {}
        _ => return Err(WebauthnError::format(FMT, "subject OU is invalid")),
    }

    // Subject-CN: a string of the vendor's choosing
    match first_entry_utf8(subject, nid::Nid::COMMONNAME) {
        Some(cn) if !cn.is_empty() => {}
        _ => return Err(WebauthnError::format(FMT, "subject CN is invalid")),
    }

    // The Basic Constraints extension MUST have the CA component set to false.
    with_parsed_cert(FMT, cert, |c| assert_not_ca(FMT, c))
}

/// TPM attestation statement certificate requirements.
/// <https://w3c.github.io/webauthn/#sctn-tpm-cert-requirements>
pub(crate) fn assert_tpm_attest_req(cert: &x509::X509Ref) -> WebauthnResult<()> {
    use x509_parser::extensions::GeneralName;

    const FMT: &str = "tpm";

    // Version MUST be set to 3.
    if cert.version() != 2 {
        return Err(WebauthnError::format(FMT, "aik certificate version must be 3"));
    }

    // Subject field MUST be set to empty.
    if cert.subject_name().entries().next().is_some() {
        return Err(WebauthnError::format(FMT, "aik certificate subject must be empty"));
    }

    with_parsed_cert(FMT, cert, |c| {
        // The Subject Alternative Name extension MUST be set as defined in
        // [TPMv2-EK-Profile] section 3.2.9, and be critical.
        let san = c
            .subject_alternative_name()
            .map_err(|_| WebauthnError::format(FMT, "SubjectAltName is malformed"))?
            .ok_or_else(|| WebauthnError::format(FMT, "SubjectAltName is missing"))?;

        if !san.critical {
            return Err(WebauthnError::format(FMT, "SubjectAltName must be critical"));
        }

        let mut manufacturer = false;
        let mut model = false;
        let mut version = false;
        for gn in san.value.general_names.iter() {
            if let GeneralName::DirectoryName(dn) = gn {
                for attr in dn.iter_attributes() {
                    match attr.attr_type().to_id_string().as_str() {
                        TCG_AT_TPM_MANUFACTURER => manufacturer = true,
                        TCG_AT_TPM_MODEL => model = true,
                        TCG_AT_TPM_VERSION => version = true,
                        _ => {}
                    }
                }
            }
        }
        trace!(?manufacturer, ?model, ?version, "tpm san");
        if !(manufacturer && model && version) {
            return Err(WebauthnError::format(
                FMT,
                "SubjectAltName lacks the tpm manufacturer, model or version",
            ));
        }

        // The Extended Key Usage extension MUST contain the OID 2.23.133.8.3
        let eku = c
            .extended_key_usage()
            .map_err(|_| WebauthnError::format(FMT, "ExtendedKeyUsage is malformed"))?
            .ok_or_else(|| WebauthnError::format(FMT, "ExtendedKeyUsage is missing"))?;

        if !eku
            .value
            .other
            .iter()
            .any(|oid| oid.to_id_string() == TCG_KP_AIK_CERTIFICATE)
        {
            return Err(WebauthnError::format(
                FMT,
                "ExtendedKeyUsage lacks tcg-kp-AIKCertificate",
            ));
        }

        // The Basic Constraints extension MUST have the CA component set to false.
        assert_not_ca(FMT, c)
    })
}
