//! Decoded protocol structures, derived key forms and ceremony results. These types
//! are what a caller inspects after (or during, via a failed ceremony's partial
//! result) verification.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use openssl::x509;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attestation::AttestationFormat;
use crate::base64_data::Base64UrlSafeData;
use crate::constants::*;
use crate::error::WebauthnError;
use crate::metadata::MetadataEntry;
use crate::proto::{AuthenticatorTransport, CollectedClientData};

/// Representation of an AAGUID
/// <https://www.w3.org/TR/webauthn/#aaguid>
pub type Aaguid = [u8; 16];

/// A credential ID type. At the moment this is a vector of bytes.
pub type CredentialID = Base64UrlSafeData;

/// A COSE algorithm identifier. These values are registered by IANA.
/// <https://www.iana.org/assignments/cose/cose.xhtml#algorithms>
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum COSEAlgorithm {
    /// Identifies this key as ECDSA (recommended SECP256R1) with SHA256 hashing
    ES256 = -7,
    /// Identifies this key as ECDSA (recommended SECP384R1) with SHA384 hashing
    ES384 = -35,
    /// Identifies this key as ECDSA (recommended SECP521R1) with SHA512 hashing
    ES512 = -36,
    /// Identifies this key as RS256 aka RSASSA-PKCS1-v1_5 w/ SHA-256
    RS256 = -257,
    /// Identifies this key as RS384 aka RSASSA-PKCS1-v1_5 w/ SHA-384
    RS384 = -258,
    /// Identifies this key as RS512 aka RSASSA-PKCS1-v1_5 w/ SHA-512
    RS512 = -259,
    /// Identifies this key as PS256 aka RSASSA-PSS w/ SHA-256
    PS256 = -37,
    /// Identifies this key as PS384 aka RSASSA-PSS w/ SHA-384
    PS384 = -38,
    /// Identifies this key as PS512 aka RSASSA-PSS w/ SHA-512
    PS512 = -39,
    /// Identifies this as an EdDSA (likely curve ed25519)
    EDDSA = -8,
    /// Identifies this as an INSECURE RS1 aka RSASSA-PKCS1-v1_5 using SHA-1. This is not
    /// used by validators, but can exist in some windows hello tpm's
    INSECURE_RS1 = -65535,
}

impl COSEAlgorithm {
    /// The algorithms accepted for new credentials when an expectation does not
    /// declare its own list.
    pub fn secure_algs() -> Vec<Self> {
        vec![COSEAlgorithm::ES256, COSEAlgorithm::RS256]
    }

    /// The JOSE (JWA) name of this algorithm.
    pub fn jwa_name(self) -> &'static str {
        match self {
            COSEAlgorithm::ES256 => "ES256",
            COSEAlgorithm::ES384 => "ES384",
            COSEAlgorithm::ES512 => "ES512",
            COSEAlgorithm::RS256 => "RS256",
            COSEAlgorithm::RS384 => "RS384",
            COSEAlgorithm::RS512 => "RS512",
            COSEAlgorithm::PS256 => "PS256",
            COSEAlgorithm::PS384 => "PS384",
            COSEAlgorithm::PS512 => "PS512",
            COSEAlgorithm::EDDSA => "EdDSA",
            COSEAlgorithm::INSECURE_RS1 => "RS1",
        }
    }

    /// Map a JOSE (JWA) name back to the algorithm.
    pub fn from_jwa_name(name: &str) -> Option<Self> {
        match name {
            "ES256" => Some(COSEAlgorithm::ES256),
            "ES384" => Some(COSEAlgorithm::ES384),
            "ES512" => Some(COSEAlgorithm::ES512),
            "RS256" => Some(COSEAlgorithm::RS256),
            "RS384" => Some(COSEAlgorithm::RS384),
            "RS512" => Some(COSEAlgorithm::RS512),
            "PS256" => Some(COSEAlgorithm::PS256),
            "PS384" => Some(COSEAlgorithm::PS384),
            "PS512" => Some(COSEAlgorithm::PS512),
            "EdDSA" => Some(COSEAlgorithm::EDDSA),
            "RS1" => Some(COSEAlgorithm::INSECURE_RS1),
            _ => None,
        }
    }
}

impl fmt::Display for COSEAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.jwa_name(), *self as i32)
    }
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = WebauthnError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            -257 => Ok(COSEAlgorithm::RS256),
            -258 => Ok(COSEAlgorithm::RS384),
            -259 => Ok(COSEAlgorithm::RS512),
            -37 => Ok(COSEAlgorithm::PS256),
            -38 => Ok(COSEAlgorithm::PS384),
            -39 => Ok(COSEAlgorithm::PS512),
            -8 => Ok(COSEAlgorithm::EDDSA),
            -65535 => Ok(COSEAlgorithm::INSECURE_RS1),
            _ => Err(WebauthnError::Parse(format!(
                "unsupported COSE algorithm {}",
                i
            ))),
        }
    }
}

impl From<COSEAlgorithm> for i64 {
    fn from(a: COSEAlgorithm) -> i64 {
        a as i32 as i64
    }
}

/// An ECDSACurve identifier. You probably will never need to alter
/// or use this value, as it is set inside the Credential for you.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ECDSACurve {
    // +---------+-------+----------+------------------------------------+
    // | Name    | Value | Key Type | Description                        |
    // +---------+-------+----------+------------------------------------+
    // | P-256   | 1     | EC2      | NIST P-256 also known as secp256r1 |
    // | P-384   | 2     | EC2      | NIST P-384 also known as secp384r1 |
    // | P-521   | 3     | EC2      | NIST P-521 also known as secp521r1 |
    // +---------+-------+----------+------------------------------------+
    /// Identifies this curve as SECP256R1 (X9_62_PRIME256V1 in OpenSSL)
    SECP256R1 = 1,
    /// Identifies this curve as SECP384R1
    SECP384R1 = 2,
    /// Identifies this curve as SECP521R1
    SECP521R1 = 3,
}

impl ECDSACurve {
    /// The size in bytes of a single affine coordinate on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }

    /// The JWK `crv` name of this curve.
    pub fn jwk_name(self) -> &'static str {
        match self {
            ECDSACurve::SECP256R1 => "P-256",
            ECDSACurve::SECP384R1 => "P-384",
            ECDSACurve::SECP521R1 => "P-521",
        }
    }
}

impl TryFrom<i128> for ECDSACurve {
    type Error = WebauthnError;

    fn try_from(u: i128) -> Result<Self, Self::Error> {
        match u {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(WebauthnError::Parse(format!("unsupported ECDSA curve {}", u))),
        }
    }
}

/// An EDDSACurve identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EDDSACurve {
    /// Identifies this OKP as ED25519
    ED25519 = 6,
    /// Identifies this OKP as ED448
    ED448 = 7,
}

impl EDDSACurve {
    /// The size in bytes of the public key on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            EDDSACurve::ED25519 => 32,
            EDDSACurve::ED448 => 57,
        }
    }

    /// The JWK `crv` name of this curve.
    pub fn jwk_name(self) -> &'static str {
        match self {
            EDDSACurve::ED25519 => "Ed25519",
            EDDSACurve::ED448 => "Ed448",
        }
    }
}

impl TryFrom<i128> for EDDSACurve {
    type Error = WebauthnError;

    fn try_from(u: i128) -> Result<Self, Self::Error> {
        match u {
            6 => Ok(EDDSACurve::ED25519),
            7 => Ok(EDDSACurve::ED448),
            _ => Err(WebauthnError::Parse(format!("unsupported EdDSA curve {}", u))),
        }
    }
}

/// A COSE Elliptic Curve Public Key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEEC2Key {
    /// The curve that this key references.
    pub curve: ECDSACurve,
    /// The key's public X coordinate.
    pub x: Base64UrlSafeData,
    /// The key's public Y coordinate.
    pub y: Base64UrlSafeData,
}

/// A COSE Octet Key Pair public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEOKPKey {
    /// The curve that this key references.
    pub curve: EDDSACurve,
    /// The public key.
    pub x: Base64UrlSafeData,
}

/// A COSE RSA PublicKey.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSERSAKey {
    /// An RSA modulus
    pub n: Base64UrlSafeData,
    /// An RSA exponent
    pub e: Base64UrlSafeData,
}

/// The type of Key contained within a COSE value. You should never need
/// to alter or change this type.
#[allow(non_camel_case_types)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEKeyType {
    /// Identifies this as an Elliptic Curve octet key pair
    EC_OKP(COSEOKPKey),
    /// Identifies this as an Elliptic Curve EC2 key
    EC_EC2(COSEEC2Key),
    /// Identifies this as an RSA key
    RSA(COSERSAKey),
}

/// The numeric id of the COSEKeyType used in the CBOR fields.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum COSEKeyTypeId {
    /// Reserved
    EC_Reserved = 0,
    /// Octet Key Pair
    EC_OKP = 1,
    /// Elliptic Curve Keys w/ x- and y-coordinate
    EC_EC2 = 2,
    /// RSA
    EC_RSA = 3,
    /// Symmetric
    EC_Symmetric = 4,
}

/// A COSE Key as provided by the Authenticator. You should never need
/// to alter or change these values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEKey {
    /// The type of key that this contains
    pub type_: COSEAlgorithm,
    /// The public key
    pub key: COSEKeyType,
}

/// A JSON Web Key (RFC 7517) rendering of a credential public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum Jwk {
    /// An elliptic curve key.
    EC {
        /// Curve name, ie `P-256`.
        crv: String,
        /// X coordinate.
        x: Base64UrlSafeData,
        /// Y coordinate.
        y: Base64UrlSafeData,
        /// The JWA algorithm name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alg: Option<String>,
    },
    /// An RSA key.
    RSA {
        /// Modulus.
        n: Base64UrlSafeData,
        /// Public exponent.
        e: Base64UrlSafeData,
        /// The JWA algorithm name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alg: Option<String>,
    },
    /// An octet key pair, ie Ed25519.
    OKP {
        /// Curve name, ie `Ed25519`.
        crv: String,
        /// The public key.
        x: Base64UrlSafeData,
        /// The JWA algorithm name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alg: Option<String>,
    },
}

/// Every usable form of a credential's public key, derived from the COSE key an
/// authenticator returned during registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPublicKey {
    /// The key as the authenticator encoded it.
    pub cose: COSEKey,
    /// The key as a JWK.
    pub jwk: Jwk,
    /// The key as a PEM encoded SubjectPublicKeyInfo. Persist this to verify future
    /// assertions.
    pub pem: String,
    /// The algorithm this key signs with.
    pub alg: COSEAlgorithm,
}

/// A single authenticator data flag, used to declare flags that an expectation
/// requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuthenticatorFlag {
    /// UP
    UserPresent,
    /// UV
    UserVerified,
    /// AT
    AttestedCredentialData,
    /// ED
    ExtensionData,
}

impl fmt::Display for AuthenticatorFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthenticatorFlag::UserPresent => "userPresent",
            AuthenticatorFlag::UserVerified => "userVerified",
            AuthenticatorFlag::AttestedCredentialData => "attestedCredentialData",
            AuthenticatorFlag::ExtensionData => "extensionData",
        };
        f.write_str(name)
    }
}

/// The decoded authenticator data flags byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthenticatorFlags {
    /// The raw flags byte.
    pub raw: u8,
    /// Bit 0, the user was present.
    pub user_present: bool,
    /// Bit 1, reserved.
    pub rfu1: bool,
    /// Bit 2, the user was verified by the authenticator. Implies presence.
    pub user_verified: bool,
    /// Bits 3 to 5, reserved.
    pub rfu2: u8,
    /// Bit 6, attested credential data follows the counter.
    pub attested_credential_data: bool,
    /// Bit 7, an extensions map is present.
    pub extension_data: bool,
}

impl From<u8> for AuthenticatorFlags {
    fn from(flags: u8) -> Self {
        // From RFC:
        // flags:   [ Exten | Auth | 0 | 0 | 0 | UVer | 0 | UPres ]
        //        7                                                 0
        AuthenticatorFlags {
            raw: flags,
            user_present: (flags & FLAG_USER_PRESENT) != 0,
            rfu1: (flags & (1 << 1)) != 0,
            user_verified: (flags & FLAG_USER_VERIFIED) != 0,
            rfu2: (flags >> 3) & 0b111,
            attested_credential_data: (flags & FLAG_ATTESTED_CREDENTIAL_DATA) != 0,
            extension_data: (flags & FLAG_EXTENSION_DATA) != 0,
        }
    }
}

impl AuthenticatorFlags {
    /// Is this flag set?
    pub fn contains(&self, flag: AuthenticatorFlag) -> bool {
        match flag {
            AuthenticatorFlag::UserPresent => self.user_present,
            AuthenticatorFlag::UserVerified => self.user_verified,
            AuthenticatorFlag::AttestedCredentialData => self.attested_credential_data,
            AuthenticatorFlag::ExtensionData => self.extension_data,
        }
    }
}

/// Attested Credential Data
#[derive(Debug, Clone, PartialEq)]
pub struct AttestedCredentialData {
    /// The guid of the authenticator. May indicate manufacturer.
    pub aaguid: Aaguid,
    /// The credential ID.
    pub credential_id: CredentialID,
    /// The credentials public Key.
    pub credential_pk: serde_cbor_2::Value,
}

/// Data returned by the authenticator in both ceremonies.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    /// Hash of the relying party id.
    pub rp_id_hash: Vec<u8>,
    /// The decoded flags.
    pub flags: AuthenticatorFlags,
    /// The counter of this credentials activations.
    pub counter: u32,
    /// The optional attested credential data.
    pub acd: Option<AttestedCredentialData>,
    /// The raw extensions map supplied by the device.
    pub extensions: Option<serde_cbor_2::Value>,
}

/// The `credProtect` policy an authenticator applied to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CredentialProtectionPolicy {
    /// The credential may be used without user verification.
    UserVerificationOptional = 0x1,
    /// The credential may be used without user verification when its id is supplied.
    UserVerificationOptionalWithCredentialIDList = 0x2,
    /// The credential always requires user verification.
    UserVerificationRequired = 0x3,
}

impl TryFrom<i128> for CredentialProtectionPolicy {
    type Error = WebauthnError;

    fn try_from(v: i128) -> Result<Self, Self::Error> {
        match v {
            0x1 => Ok(CredentialProtectionPolicy::UserVerificationOptional),
            0x2 => Ok(CredentialProtectionPolicy::UserVerificationOptionalWithCredentialIDList),
            0x3 => Ok(CredentialProtectionPolicy::UserVerificationRequired),
            _ => Err(WebauthnError::Parse(format!(
                "authenticatorData.extensions.credProtect {} is invalid",
                v
            ))),
        }
    }
}

/// The `credBlob` extension output. Registration reports whether the blob was
/// stored, authentication returns the blob itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredBlob {
    /// Registration: was the blob stored.
    Stored(bool),
    /// Authentication: the stored blob.
    Data(Vec<u8>),
}

/// Authenticator extension outputs decoded from authenticator data. Known
/// extensions are typed, everything else is kept as it was encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthenticatorExtensions {
    /// `credProtect`
    pub cred_protect: Option<CredentialProtectionPolicy>,
    /// `credBlob`
    pub cred_blob: Option<CredBlob>,
    /// `hmac-secret`
    pub hmac_secret: Option<bool>,
    /// `minPinLength`
    pub min_pin_length: Option<u32>,
    /// Extensions without an interpreter.
    pub unknown: BTreeMap<String, serde_cbor_2::Value>,
}

/// The trust class an attestation statement conveys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationType {
    /// No attestation.
    None,
    /// Attested by a vendor certificate.
    Basic,
    /// Signed by the credential key itself.
    #[serde(rename = "Self")]
    Self_,
    /// Attested by an attestation CA (ie a TPM AIK).
    #[serde(rename = "AttCA")]
    AttCa,
    /// Attested by an anonymisation CA.
    #[serde(rename = "AnonCA")]
    AnonCa,
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttestationType::None => "None",
            AttestationType::Basic => "Basic",
            AttestationType::Self_ => "Self",
            AttestationType::AttCa => "AttCA",
            AttestationType::AnonCa => "AnonCA",
        };
        f.write_str(name)
    }
}

/// Authorisation fields of an android key attestation list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidAuthorizations {
    /// KM_TAG_ORIGIN
    pub origin: Option<u32>,
    /// KM_TAG_PURPOSE
    pub purpose: Option<u32>,
}

/// Format specific details surfaced by an attestation statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationMetadata {
    /// No additional metadata available
    None,
    /// Additional metadata on Packed attestations
    Packed {
        /// The aaguid of the authenticator
        aaguid: Uuid,
    },
    /// Additional metadata on TPM attestations
    Tpm {
        /// The aaguid of the authenticator
        aaguid: Uuid,
        /// The firmware version of the TPM
        firmware_version: u64,
    },
    /// Additional metadata on android key attestations
    AndroidKey {
        /// Is the key master running in a Trusted Execution Environment
        is_km_tee: bool,
        /// Did the attestation come from a Trusted Execution Environment
        is_attest_tee: bool,
        /// The software enforced authorisations
        software_enforced: AndroidAuthorizations,
        /// The TEE enforced authorisations
        tee_enforced: AndroidAuthorizations,
    },
    /// Additional metadata on SafetyNet attestations
    AndroidSafetyNet {
        /// The name of the android package that requested the attestation
        apk_package_name: String,
        /// The certificate digests of the requesting package
        apk_certificate_digest_sha256: Vec<String>,
        /// The device passed the compatibility test suite profile
        cts_profile_match: bool,
        /// The device passed basic integrity checks
        basic_integrity: bool,
        /// How the evaluation was performed
        evaluation_type: Option<String>,
    },
}

/// The outcome of a single attestation statement verification.
#[derive(Debug, Clone)]
pub struct FormatVerifyResult {
    /// The statement format.
    pub format: AttestationFormat,
    /// Always `true` when returned; failures are errors.
    pub is_valid: bool,
    /// The trust classes this statement may convey. Metadata may narrow these.
    pub attestation_types: Vec<AttestationType>,
    /// The x5c certificates, leaf first.
    pub trust_path: Vec<x509::X509>,
    /// Set when a certificate chain was evaluated.
    pub certificate_chain_valid: Option<bool>,
    /// Format specific details.
    pub metadata: AttestationMetadata,
}

/// The result of an attestation (registration) ceremony. On failure the partially
/// populated value is attached to the returned error.
#[derive(Debug, Clone, Default)]
pub struct AttestationResult {
    /// True only once every step has passed.
    pub verification: bool,
    /// Non fatal findings.
    pub messages: Vec<String>,
    /// The decoded client data.
    pub client_data: Option<CollectedClientData>,
    /// SHA-256 of the raw client data JSON.
    pub client_data_hash: Option<Vec<u8>>,
    /// The attestation statement format.
    pub fmt: Option<AttestationFormat>,
    /// The decoded authenticator data.
    pub authenticator_data: Option<AuthenticatorData>,
    /// The decoded flags.
    pub flags: Option<AuthenticatorFlags>,
    /// The signature counter at registration.
    pub sign_count: Option<u32>,
    /// The authenticator model.
    pub aaguid: Option<Uuid>,
    /// The new credential's id.
    pub credential_id: Option<CredentialID>,
    /// The new credential's public key.
    pub credential_public_key: Option<CredentialPublicKey>,
    /// Decoded authenticator extension outputs.
    pub extensions: Option<AuthenticatorExtensions>,
    /// Transports the client reported.
    pub transports: Option<Vec<AuthenticatorTransport>>,
    /// The metadata entry consulted, if any.
    pub metadata_entry: Option<MetadataEntry>,
    /// The attestation statement outcome.
    pub format_result: Option<FormatVerifyResult>,
    /// The final attestation type after metadata narrowing.
    pub attestation_type: Option<AttestationType>,
}

/// The result of an assertion (authentication) ceremony. On failure the partially
/// populated value is attached to the returned error.
#[derive(Debug, Clone, Default)]
pub struct AssertionResult {
    /// True only once every step has passed.
    pub verification: bool,
    /// Non fatal findings, ie the clone warning when the sign count is not strict.
    pub messages: Vec<String>,
    /// The decoded client data.
    pub client_data: Option<CollectedClientData>,
    /// SHA-256 of the raw client data JSON.
    pub client_data_hash: Option<Vec<u8>>,
    /// The decoded authenticator data.
    pub authenticator_data: Option<AuthenticatorData>,
    /// The decoded flags.
    pub flags: Option<AuthenticatorFlags>,
    /// The signature counter reported by the authenticator. Persist this.
    pub sign_count: Option<u32>,
    /// `None` when both counters were zero and the check was skipped.
    pub greater_than_stored_sign_count: Option<bool>,
    /// The user handle the authenticator returned.
    pub user_handle: Option<Vec<u8>>,
    /// The credential id used.
    pub credential_id: Option<CredentialID>,
    /// Decoded authenticator extension outputs.
    pub extensions: Option<AuthenticatorExtensions>,
    /// The rpIdHash matched the AppID rather than the rpId.
    pub appid_used: bool,
}
