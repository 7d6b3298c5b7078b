//! Attestation statement verification. Each supported statement format has its
//! own module; [verify_attestation_statement] dispatches on the `fmt` string of the
//! attestation object.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use openssl::x509;
use serde_cbor_2::Value;

use crate::chain::CertificateChainValidator;
use crate::crypto::assert_not_root;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::{
    AttestationMetadata, AttestationType, AttestedCredentialData, AuthenticatorData,
    COSEAlgorithm, CredentialPublicKey, FormatVerifyResult,
};
use crate::internals::cbor_text_map;

mod android_key;
mod apple;
pub mod extensions;
mod fido_u2f;
mod packed;
mod safetynet;
mod tpm;

/// The type of attestation on the credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Hash)]
pub enum AttestationFormat {
    /// Packed attestation
    Packed,
    /// TPM attestation (like Microsoft)
    Tpm,
    /// Android hardware attestation
    AndroidKey,
    /// Older Android Safety Net
    AndroidSafetyNet,
    /// Old U2F attestation type
    FIDOU2F,
    /// Apple touchID/faceID
    AppleAnonymous,
    /// No attestation
    None,
}

impl AttestationFormat {
    /// The `fmt` identifier of this format.
    pub fn as_str(self) -> &'static str {
        match self {
            AttestationFormat::Packed => "packed",
            AttestationFormat::Tpm => "tpm",
            AttestationFormat::AndroidKey => "android-key",
            AttestationFormat::AndroidSafetyNet => "android-safetynet",
            AttestationFormat::FIDOU2F => "fido-u2f",
            AttestationFormat::AppleAnonymous => "apple",
            AttestationFormat::None => "none",
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AttestationFormat {
    type Error = WebauthnError;

    fn try_from(a: &str) -> Result<AttestationFormat, Self::Error> {
        match FormatSelector::from(a) {
            FormatSelector::Supported(f) => Ok(f),
            FormatSelector::Unsupported(name) => Err(WebauthnError::format(
                &name,
                "attestation format is not supported",
            )),
        }
    }
}

/// The `fmt` of an attestation object, resolved against the supported formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSelector {
    /// One of the formats this crate verifies.
    Supported(AttestationFormat),
    /// Anything else, by name.
    Unsupported(String),
}

impl From<&str> for FormatSelector {
    fn from(a: &str) -> Self {
        match a {
            "packed" => FormatSelector::Supported(AttestationFormat::Packed),
            "tpm" => FormatSelector::Supported(AttestationFormat::Tpm),
            "android-key" => FormatSelector::Supported(AttestationFormat::AndroidKey),
            "android-safetynet" => FormatSelector::Supported(AttestationFormat::AndroidSafetyNet),
            "fido-u2f" => FormatSelector::Supported(AttestationFormat::FIDOU2F),
            "apple" => FormatSelector::Supported(AttestationFormat::AppleAnonymous),
            "none" => FormatSelector::Supported(AttestationFormat::None),
            other => FormatSelector::Unsupported(other.to_string()),
        }
    }
}

/// Everything a statement verifier may consult besides the statement itself.
/// Fields are optional so that a verifier invoked without its prerequisites fails
/// with `Data is not enough` instead of reading garbage.
#[derive(Debug, Clone, Copy)]
pub struct VerificationContext<'a> {
    /// The raw authenticator data bytes, as signed.
    pub auth_data_bytes: Option<&'a [u8]>,
    /// The decoded authenticator data.
    pub auth_data: Option<&'a AuthenticatorData>,
    /// SHA-256 of the client data JSON.
    pub client_data_hash: Option<&'a [u8]>,
    /// The credential key from the attested credential data.
    pub credential_public_key: Option<&'a CredentialPublicKey>,
    /// Trust anchors declared by the metadata service, tried in order.
    pub roots: &'a [x509::X509],
    /// The chain validator to evaluate x5c with.
    pub chain: CertificateChainValidator<'a>,
}

const NOT_ENOUGH: &str = "Data is not enough";

impl<'a> VerificationContext<'a> {
    pub(crate) fn auth_data_bytes(&self, fmt: &str) -> WebauthnResult<&'a [u8]> {
        self.auth_data_bytes
            .ok_or_else(|| WebauthnError::format(fmt, NOT_ENOUGH))
    }

    pub(crate) fn auth_data(&self, fmt: &str) -> WebauthnResult<&'a AuthenticatorData> {
        self.auth_data.ok_or_else(|| WebauthnError::format(fmt, NOT_ENOUGH))
    }

    pub(crate) fn acd(&self, fmt: &str) -> WebauthnResult<&'a AttestedCredentialData> {
        self.auth_data(fmt)?
            .acd
            .as_ref()
            .ok_or_else(|| WebauthnError::format(fmt, NOT_ENOUGH))
    }

    pub(crate) fn client_data_hash(&self, fmt: &str) -> WebauthnResult<&'a [u8]> {
        self.client_data_hash
            .ok_or_else(|| WebauthnError::format(fmt, NOT_ENOUGH))
    }

    pub(crate) fn credential_public_key(
        &self,
        fmt: &str,
    ) -> WebauthnResult<&'a CredentialPublicKey> {
        self.credential_public_key
            .ok_or_else(|| WebauthnError::format(fmt, NOT_ENOUGH))
    }

    /// authenticatorData || clientDataHash
    pub(crate) fn signed_data(&self, fmt: &str) -> WebauthnResult<Vec<u8>> {
        let auth_data_bytes = self.auth_data_bytes(fmt)?;
        let client_data_hash = self.client_data_hash(fmt)?;
        Ok(auth_data_bytes
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect())
    }

    /// Every certificate must be current, and none may be a root.
    pub(crate) fn assert_certs_usable(
        &self,
        fmt: &str,
        certs: &[x509::X509],
    ) -> WebauthnResult<()> {
        for cert in certs.iter() {
            if !self.chain.is_current(cert)? {
                return Err(WebauthnError::format(
                    fmt,
                    "x5c certificate is expired or not yet valid",
                ));
            }
            assert_not_root(fmt, cert)?;
        }
        Ok(())
    }

    /// Validate x5c against the metadata roots, or as supplied when there are none.
    pub(crate) fn validate_chain(&self, fmt: &str, x5c: &[x509::X509]) -> WebauthnResult<bool> {
        if self.chain.verify_with_roots(x5c, self.roots)? {
            debug!(%fmt, roots = self.roots.len(), "certificate chain is valid");
            Ok(true)
        } else {
            Err(WebauthnError::format(fmt, "certificate chain is invalid"))
        }
    }
}

pub(crate) type StatementMap<'a> = BTreeMap<String, &'a Value>;

pub(crate) fn statement_map<'a>(
    fmt: &str,
    att_stmt: &'a Value,
) -> WebauthnResult<StatementMap<'a>> {
    cbor_text_map(att_stmt).map_err(|_| WebauthnError::format(fmt, "attStmt is not a map"))
}

pub(crate) fn stmt_field<'a>(
    fmt: &str,
    map: &StatementMap<'a>,
    key: &str,
) -> WebauthnResult<&'a Value> {
    map.get(key)
        .copied()
        .ok_or_else(|| WebauthnError::format(fmt, format!("{} is missing", key)))
}

pub(crate) fn stmt_bytes<'a>(
    fmt: &str,
    map: &StatementMap<'a>,
    key: &str,
) -> WebauthnResult<&'a [u8]> {
    match stmt_field(fmt, map, key)? {
        Value::Bytes(b) => Ok(b.as_slice()),
        _ => Err(WebauthnError::format(fmt, format!("{} is invalid", key))),
    }
}

pub(crate) fn stmt_alg(fmt: &str, map: &StatementMap<'_>) -> WebauthnResult<COSEAlgorithm> {
    match stmt_field(fmt, map, "alg")? {
        Value::Integer(i) => COSEAlgorithm::try_from(*i)
            .map_err(|_| WebauthnError::format(fmt, "alg is not supported")),
        _ => Err(WebauthnError::format(fmt, "alg is invalid")),
    }
}

/// Decode the DER certificates of an x5c array, leaf first. The array must not be empty.
pub(crate) fn stmt_x5c(fmt: &str, map: &StatementMap<'_>) -> WebauthnResult<Vec<x509::X509>> {
    let arr = match stmt_field(fmt, map, "x5c")? {
        Value::Array(a) => a,
        _ => return Err(WebauthnError::format(fmt, "x5c is invalid")),
    };

    let x5c = arr
        .iter()
        .map(|v| match v {
            Value::Bytes(b) => x509::X509::from_der(b)
                .map_err(|_| WebauthnError::format(fmt, "x5c certificate is malformed")),
            _ => Err(WebauthnError::format(fmt, "x5c is invalid")),
        })
        .collect::<WebauthnResult<Vec<_>>>()?;

    if x5c.is_empty() {
        return Err(WebauthnError::format(fmt, "x5c is empty"));
    }
    trace!(?x5c);
    Ok(x5c)
}

/// Does the certificate carry the same public key as the credential.
pub(crate) fn subject_key_matches(
    cert: &x509::X509Ref,
    credential: &CredentialPublicKey,
) -> WebauthnResult<bool> {
    let subject = cert.public_key()?;
    let credential = credential.to_pkey()?;
    Ok(subject.public_eq(&credential))
}

fn verify_none_attestation(_att_stmt: &Value) -> WebauthnResult<FormatVerifyResult> {
    Ok(FormatVerifyResult {
        format: AttestationFormat::None,
        is_valid: true,
        attestation_types: vec![AttestationType::None],
        trust_path: Vec::new(),
        certificate_chain_valid: None,
        metadata: AttestationMetadata::None,
    })
}

/// Verify an attestation statement of the format named by `fmt`.
pub fn verify_attestation_statement(
    fmt: &FormatSelector,
    att_stmt: &Value,
    ctx: &VerificationContext<'_>,
) -> WebauthnResult<FormatVerifyResult> {
    let format = match fmt {
        FormatSelector::Supported(f) => *f,
        FormatSelector::Unsupported(name) => {
            debug!(%name, "unsupported attestation format");
            return Err(WebauthnError::format(
                name,
                "attestation format is not supported",
            ));
        }
    };

    debug!(%format, "verifying attestation statement");
    let res = match format {
        AttestationFormat::None => verify_none_attestation(att_stmt),
        AttestationFormat::Packed => packed::verify_packed_attestation(att_stmt, ctx),
        AttestationFormat::Tpm => tpm::verify_tpm_attestation(att_stmt, ctx),
        AttestationFormat::AndroidKey => android_key::verify_android_key_attestation(att_stmt, ctx),
        AttestationFormat::AndroidSafetyNet => {
            safetynet::verify_android_safetynet_attestation(att_stmt, ctx)
        }
        AttestationFormat::FIDOU2F => fido_u2f::verify_fidou2f_attestation(att_stmt, ctx),
        AttestationFormat::AppleAnonymous => {
            apple::verify_apple_anonymous_attestation(att_stmt, ctx)
        }
    };

    if let Err(e) = &res {
        debug!(%format, %e, "attestation statement rejected");
    }
    res
}
