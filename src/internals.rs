//! Binary parsers for authenticator data and the TPM 2.0 structures carried in
//! `tpm` attestation statements.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use nom::bytes::complete::take;
use nom::combinator::{cond, verify};
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u32, be_u64, be_u8};

use crate::constants::*;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::{
    AttestedCredentialData, AuthenticatorData, AuthenticatorExtensions, AuthenticatorFlags,
    CredBlob, CredentialProtectionPolicy,
};

fn nom_failure(i: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Failure(nom::error::Error::new(i, nom::error::ErrorKind::Verify))
}

fn cbor_parser(i: &[u8]) -> nom::IResult<&[u8], serde_cbor_2::Value> {
    let mut deserializer = serde_cbor_2::Deserializer::from_slice(i);
    let v = serde::de::Deserialize::deserialize(&mut deserializer).map_err(|e| {
        debug!(?e, "cbor_parser");
        nom_failure(i)
    })?;
    let len = deserializer.byte_offset();
    let (i, _) = take(len)(i)?;
    Ok((i, v))
}

fn acd_parser(i: &[u8]) -> nom::IResult<&[u8], AttestedCredentialData> {
    let (i, aaguid) = take(16usize)(i)?;
    let (i, cred_id) = length_data(be_u16)(i)?;
    let (i, cred_pk) = cbor_parser(i)?;

    let mut aaguid_arr = [0u8; 16];
    aaguid_arr.copy_from_slice(aaguid);

    Ok((
        i,
        AttestedCredentialData {
            aaguid: aaguid_arr,
            credential_id: cred_id.into(),
            credential_pk: cred_pk,
        },
    ))
}

fn authenticator_data_parser(i: &[u8]) -> nom::IResult<&[u8], AuthenticatorData> {
    let (i, rp_id_hash) = take(32usize)(i)?;
    let (i, data_flags) = be_u8(i)?;
    let flags = AuthenticatorFlags::from(data_flags);
    let (i, counter) = be_u32(i)?;
    let (i, acd) = cond(flags.attested_credential_data, acd_parser)(i)?;
    let (i, extensions) = cond(flags.extension_data, cbor_parser)(i)?;

    Ok((
        i,
        AuthenticatorData {
            rp_id_hash: rp_id_hash.to_vec(),
            flags,
            counter,
            acd,
            extensions,
        },
    ))
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = WebauthnError;

    fn try_from(auth_data_bytes: &[u8]) -> Result<Self, Self::Error> {
        let (rem, ad) = authenticator_data_parser(auth_data_bytes).map_err(|e| {
            debug!(?e, "try_from authenticator_data_parser");
            WebauthnError::Parse("authenticatorData is malformed".to_string())
        })?;

        if !rem.is_empty() {
            return Err(WebauthnError::Parse(format!(
                "authenticatorData has {} trailing bytes",
                rem.len()
            )));
        }
        Ok(ad)
    }
}

impl TryFrom<&serde_cbor_2::Value> for AuthenticatorExtensions {
    type Error = WebauthnError;

    fn try_from(value: &serde_cbor_2::Value) -> Result<Self, Self::Error> {
        let map = cbor_try_map!(value)?;
        let mut exts = AuthenticatorExtensions::default();

        for (k, v) in map.iter() {
            let name = cbor_try_string!(k)?;
            match name.as_str() {
                "credProtect" => {
                    let policy = cbor_try_i128!(v)?;
                    exts.cred_protect = Some(CredentialProtectionPolicy::try_from(policy)?);
                }
                "credBlob" => {
                    exts.cred_blob = Some(match v {
                        serde_cbor_2::Value::Bool(b) => CredBlob::Stored(*b),
                        serde_cbor_2::Value::Bytes(b) => CredBlob::Data(b.clone()),
                        _ => {
                            return Err(WebauthnError::Parse(
                                "authenticatorData.extensions.credBlob is invalid".to_string(),
                            ))
                        }
                    });
                }
                "hmac-secret" => {
                    exts.hmac_secret = Some(cbor_try_bool!(v)?);
                }
                "minPinLength" => {
                    let len = cbor_try_i128!(v)?;
                    exts.min_pin_length = Some(u32::try_from(len).map_err(|_| {
                        WebauthnError::Parse(
                            "authenticatorData.extensions.minPinLength is invalid".to_string(),
                        )
                    })?);
                }
                _ => {
                    trace!(%name, "retaining uninterpreted extension");
                    exts.unknown.insert(name.clone(), v.clone());
                }
            }
        }

        Ok(exts)
    }
}

/// TPM structure tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TpmSt {
    AttestCertify,
    Other(u16),
}

impl From<u16> for TpmSt {
    fn from(v: u16) -> Self {
        match v {
            TPM_ST_ATTEST_CERTIFY => TpmSt::AttestCertify,
            v => TpmSt::Other(v),
        }
    }
}

/// TPM algorithm identifiers this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TpmAlgId {
    Rsa,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Null,
    Ecc,
    Other(u16),
}

impl From<u16> for TpmAlgId {
    fn from(v: u16) -> Self {
        match v {
            TPM_ALG_RSA => TpmAlgId::Rsa,
            TPM_ALG_SHA1 => TpmAlgId::Sha1,
            TPM_ALG_SHA256 => TpmAlgId::Sha256,
            TPM_ALG_SHA384 => TpmAlgId::Sha384,
            TPM_ALG_SHA512 => TpmAlgId::Sha512,
            TPM_ALG_NULL => TpmAlgId::Null,
            TPM_ALG_ECC => TpmAlgId::Ecc,
            v => TpmAlgId::Other(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TpmiEccCurve {
    NistP256,
    NistP384,
    NistP521,
    Other(u16),
}

impl From<u16> for TpmiEccCurve {
    fn from(v: u16) -> Self {
        match v {
            TPM_ECC_NIST_P256 => TpmiEccCurve::NistP256,
            TPM_ECC_NIST_P384 => TpmiEccCurve::NistP384,
            TPM_ECC_NIST_P521 => TpmiEccCurve::NistP521,
            v => TpmiEccCurve::Other(v),
        }
    }
}

/// TPM2B_NAME
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tpm2bName {
    None,
    Handle(u32),
    /// The two byte nameAlg followed by the digest.
    Digest(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TpmuAttest {
    /// name, qualifiedName
    AttestCertify(Tpm2bName, Tpm2bName),
    Invalid,
}

/// TPMS_ATTEST
#[derive(Debug, Clone)]
pub(crate) struct TpmsAttest {
    pub magic: u32,
    pub type_: TpmSt,
    pub qualified_signer: Tpm2bName,
    pub extra_data: Option<Vec<u8>>,
    pub firmware_version: u64,
    pub typeattested: TpmuAttest,
}

fn tpm2b_data(i: &[u8]) -> nom::IResult<&[u8], Option<Vec<u8>>> {
    let (i, data) = length_data(be_u16)(i)?;
    Ok((i, if data.is_empty() { None } else { Some(data.to_vec()) }))
}

fn tpm2b_name(i: &[u8]) -> nom::IResult<&[u8], Tpm2bName> {
    let (i, data) = length_data(be_u16)(i)?;
    let name = match data.len() {
        0 => Tpm2bName::None,
        4 => {
            let (_, h) = be_u32(data)?;
            Tpm2bName::Handle(h)
        }
        _ => Tpm2bName::Digest(data.to_vec()),
    };
    Ok((i, name))
}

fn tpms_attest_parser(i: &[u8]) -> nom::IResult<&[u8], TpmsAttest> {
    let (i, magic) = verify(be_u32, |m| *m == TPM_GENERATED_VALUE)(i)?;
    let (i, type_) = be_u16(i)?;
    let type_ = TpmSt::from(type_);
    let (i, qualified_signer) = tpm2b_name(i)?;
    let (i, extra_data) = tpm2b_data(i)?;
    // clockInfo: clock, resetCount, restartCount, safe
    let (i, _clock) = be_u64(i)?;
    let (i, _reset_count) = be_u32(i)?;
    let (i, _restart_count) = be_u32(i)?;
    let (i, _safe) = be_u8(i)?;
    let (i, firmware_version) = be_u64(i)?;

    let (i, typeattested) = match type_ {
        TpmSt::AttestCertify => {
            let (i, name) = tpm2b_name(i)?;
            let (i, qualified_name) = tpm2b_name(i)?;
            (i, TpmuAttest::AttestCertify(name, qualified_name))
        }
        TpmSt::Other(_) => (i, TpmuAttest::Invalid),
    };

    Ok((
        i,
        TpmsAttest {
            magic,
            type_,
            qualified_signer,
            extra_data,
            firmware_version,
            typeattested,
        },
    ))
}

impl TryFrom<&[u8]> for TpmsAttest {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        tpms_attest_parser(data)
            .map_err(|e| {
                debug!(?e, "try_from tpms_attest_parser");
                WebauthnError::format("tpm", "certInfo is malformed or magic is invalid")
            })
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TpmsRsaParms {
    pub key_bits: u16,
    pub exponent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TpmsEccParms {
    pub curve_id: TpmiEccCurve,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TpmuPublicParms {
    Rsa(TpmsRsaParms),
    Ecc(TpmsEccParms),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TpmsEccPoint {
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TpmuPublicId {
    Rsa(Vec<u8>),
    Ecc(TpmsEccPoint),
}

/// TPMT_PUBLIC
#[derive(Debug, Clone)]
pub(crate) struct TpmtPublic {
    pub type_: TpmAlgId,
    pub name_alg: TpmAlgId,
    pub object_attributes: u32,
    pub auth_policy: Option<Vec<u8>>,
    pub parameters: TpmuPublicParms,
    pub unique: TpmuPublicId,
}

// A TPMI_ALG_* selector, followed by a detail field that is only present when the
// selector is not TPM_ALG_NULL.
fn tpm_alg_with_detail<'a>(
    detail_len: usize,
) -> impl FnMut(&'a [u8]) -> nom::IResult<&'a [u8], TpmAlgId> {
    move |i: &'a [u8]| {
        let (i, alg) = be_u16(i)?;
        let alg = TpmAlgId::from(alg);
        let (i, _) = cond(alg != TpmAlgId::Null, take(detail_len))(i)?;
        Ok((i, alg))
    }
}

fn tpms_rsa_parms_parser(i: &[u8]) -> nom::IResult<&[u8], TpmsRsaParms> {
    // TPMT_SYM_DEF_OBJECT: keyBits + mode
    let (i, _symmetric) = tpm_alg_with_detail(4)(i)?;
    // TPMT_RSA_SCHEME: hashAlg
    let (i, _scheme) = tpm_alg_with_detail(2)(i)?;
    let (i, key_bits) = be_u16(i)?;
    let (i, exponent) = be_u32(i)?;
    let exponent = if exponent == 0 {
        TPM_RSA_DEFAULT_EXPONENT
    } else {
        exponent
    };
    Ok((i, TpmsRsaParms { key_bits, exponent }))
}

fn tpms_ecc_parms_parser(i: &[u8]) -> nom::IResult<&[u8], TpmsEccParms> {
    let (i, _symmetric) = tpm_alg_with_detail(4)(i)?;
    let (i, _scheme) = tpm_alg_with_detail(2)(i)?;
    let (i, curve_id) = be_u16(i)?;
    // TPMT_KDF_SCHEME: hashAlg
    let (i, _kdf) = tpm_alg_with_detail(2)(i)?;
    Ok((
        i,
        TpmsEccParms {
            curve_id: TpmiEccCurve::from(curve_id),
        },
    ))
}

fn tpmt_public_parser(i: &[u8]) -> nom::IResult<&[u8], TpmtPublic> {
    let (i, type_) = be_u16(i)?;
    let type_ = TpmAlgId::from(type_);
    let (i, name_alg) = be_u16(i)?;
    let (i, object_attributes) = be_u32(i)?;
    let (i, auth_policy) = tpm2b_data(i)?;

    let (i, parameters, unique) = match type_ {
        TpmAlgId::Rsa => {
            let (i, parms) = tpms_rsa_parms_parser(i)?;
            let (i, modulus) = length_data(be_u16)(i)?;
            (
                i,
                TpmuPublicParms::Rsa(parms),
                TpmuPublicId::Rsa(modulus.to_vec()),
            )
        }
        TpmAlgId::Ecc => {
            let (i, parms) = tpms_ecc_parms_parser(i)?;
            let (i, x) = length_data(be_u16)(i)?;
            let (i, y) = length_data(be_u16)(i)?;
            (
                i,
                TpmuPublicParms::Ecc(parms),
                TpmuPublicId::Ecc(TpmsEccPoint {
                    x: x.to_vec(),
                    y: y.to_vec(),
                }),
            )
        }
        _ => return Err(nom_failure(i)),
    };

    Ok((
        i,
        TpmtPublic {
            type_,
            name_alg: TpmAlgId::from(name_alg),
            object_attributes,
            auth_policy,
            parameters,
            unique,
        },
    ))
}

impl TryFrom<&[u8]> for TpmtPublic {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        tpmt_public_parser(data)
            .map_err(|e| {
                debug!(?e, "try_from tpmt_public_parser");
                WebauthnError::format("tpm", "pubArea is malformed")
            })
            .map(|(_, v)| v)
    }
}

/// Split a flat CBOR map keyed by text into owned pairs, so that statement
/// fields can be looked up by name.
pub(crate) fn cbor_text_map(
    value: &serde_cbor_2::Value,
) -> WebauthnResult<BTreeMap<String, &serde_cbor_2::Value>> {
    let map = cbor_try_map!(value)?;
    map.iter()
        .map(|(k, v)| cbor_try_string!(k).map(|k| (k.clone(), v)))
        .collect()
}
