//! x509 certificate extensions consulted by attestation statement verifiers.

use std::convert::TryInto;

use openssl::x509;
use x509_parser::oid_registry::Oid;

use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::{Aaguid, AttestationMetadata};

/// x509 certificate extensions are validated in the webauthn spec by checking
/// that the value of the extension is equal to some other value
pub trait AttestationX509Extension {
    /// the type of the value in the certificate extension
    type Output: Eq;

    /// the oid of the extension
    const OID: Oid<'static>;

    /// how to parse the value out of the certificate extension
    fn parse(i: &[u8]) -> der_parser::error::BerResult<(Self::Output, AttestationMetadata)>;

    /// if `true`, then validating this certificate fails if this extension is
    /// missing
    const IS_REQUIRED: bool;

    /// if `false`, the extension must not be marked critical
    const MAY_BE_CRITICAL: bool = true;

    /// the message reported if the "other value" is not equal to that in the
    /// extension
    const MISMATCH: &'static str;
}

/// The Fido AAGUID x509 extension
pub struct FidoGenCeAaguid;

/// The Apple anonymous attestation nonce extension
pub struct AppleAnonymousNonce;

/// The Android key attestation description extension
pub struct AndroidKeyAttestationExtensionData;

impl AttestationX509Extension for FidoGenCeAaguid {
    // If cert contains an extension with OID 1 3 6 1 4 1 45724 1 1 4 (id-fido-gen-ce-aaguid)
    const OID: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

    // verify that the value of this extension matches the aaguid in authenticatorData.
    type Output = Aaguid;

    fn parse(i: &[u8]) -> der_parser::error::BerResult<(Self::Output, AttestationMetadata)> {
        let (rem, aaguid) = der_parser::der::parse_der_octetstring(i)?;
        let aaguid: Aaguid = aaguid
            .as_slice()?
            .try_into()
            .map_err(|_| der_parser::error::BerError::InvalidLength)?;

        Ok((rem, (aaguid, AttestationMetadata::None)))
    }

    const IS_REQUIRED: bool = false;

    const MAY_BE_CRITICAL: bool = false;

    const MISMATCH: &'static str = "aaguid extension does not match authenticatorData";
}

pub(crate) mod android_key_attestation {
    use der_parser::ber::BerObjectContent;

    use crate::interface::{AndroidAuthorizations, AttestationMetadata};

    #[derive(Clone, PartialEq, Eq, Copy)]
    pub struct AuthorizationList {
        pub all_applications: bool,
        pub origin: Option<u32>,
        pub purpose: Option<u32>,
    }

    impl From<AuthorizationList> for AndroidAuthorizations {
        fn from(al: AuthorizationList) -> Self {
            AndroidAuthorizations {
                origin: al.origin,
                purpose: al.purpose,
            }
        }
    }

    impl AuthorizationList {
        pub fn parse(i: &[u8]) -> der_parser::error::BerResult<Self> {
            use der_parser::{der::*, error::BerError};
            parse_der_container(|i: &[u8], hdr: Header| {
                if hdr.tag() != Tag::Sequence {
                    return Err(nom::Err::Error(BerError::BerTypeError));
                }

                let mut all_applications = false;
                let mut origin = None;
                let mut purpose = None;

                let mut i = i;
                while let Ok((k, obj)) = parse_der(i) {
                    i = k;
                    if obj.content == BerObjectContent::Optional(None) {
                        continue;
                    }

                    match obj.tag() {
                        Tag(600) => {
                            all_applications = true;
                        }
                        Tag(702) => {
                            if let BerObjectContent::Unknown(o) = obj.content {
                                let (_, val) = parse_der_integer(o.data)?;
                                origin = Some(val.as_u32()?);
                            }
                        }
                        Tag(1) => {
                            if let BerObjectContent::Unknown(o) = obj.content {
                                let (_, val) =
                                    parse_der_container(|i, _| parse_der_integer(i))(o.data)?;
                                purpose = Some(val.as_u32()?);
                            }
                        }
                        _ => continue,
                    };
                }

                let al = AuthorizationList {
                    all_applications,
                    origin,
                    purpose,
                };

                Ok((i, al))
            })(i)
        }
    }

    /// Parse a KeyDescription, yielding the attestation challenge.
    pub fn parse(i: &[u8]) -> der_parser::error::BerResult<(Vec<u8>, AttestationMetadata)> {
        use der_parser::{der::*, error::BerError};
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let (i, _attestation_version) = parse_der_integer(i)?;
            let (i, attest_sec_level) = parse_der_enum(i)?;
            let attest_sec_level = attest_sec_level.as_u32()?;
            let (i, _km_version) = parse_der_integer(i)?;
            let (i, km_sec_level) = parse_der_enum(i)?;
            let km_sec_level = km_sec_level.as_u32()?;

            let (i, attestation_challenge) = parse_der_octetstring(i)?;
            let attestation_challenge = attestation_challenge.as_slice()?.to_vec();

            let (i, _unique_id) = parse_der_octetstring(i)?;

            let (i, software_enforced) = AuthorizationList::parse(i)?;
            let (i, tee_enforced) = AuthorizationList::parse(i)?;

            // 0 = Software, 1 = TrustedEnvironment, 2 = StrongBox
            if attest_sec_level > 2 || km_sec_level > 2 {
                return Err(BerError::InvalidTag)?;
            }

            // The key must be scoped to the RP ID.
            if software_enforced.all_applications || tee_enforced.all_applications {
                return Err(BerError::InvalidValue {
                    tag: Tag(600),
                    msg: "all_applications must not be set".to_string(),
                })?;
            }

            let metadata = AttestationMetadata::AndroidKey {
                is_km_tee: km_sec_level != 0,
                is_attest_tee: attest_sec_level != 0,
                software_enforced: software_enforced.into(),
                tee_enforced: tee_enforced.into(),
            };

            Ok((i, (attestation_challenge, metadata)))
        })(i)
    }
}

impl AttestationX509Extension for AndroidKeyAttestationExtensionData {
    // If cert contains an extension with OID 1.3.6.1.4.1.11129.2.1.17 (android key attestation)
    const OID: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);

    // verify that the attestationChallenge of this extension matches the clientDataHash.
    type Output = Vec<u8>;

    fn parse(i: &[u8]) -> der_parser::error::BerResult<(Self::Output, AttestationMetadata)> {
        android_key_attestation::parse(i)
    }

    const IS_REQUIRED: bool = true;

    const MISMATCH: &'static str = "attestationChallenge does not match clientDataHash";
}

impl AttestationX509Extension for AppleAnonymousNonce {
    type Output = [u8; 32];

    // Verify that nonce equals the value of the extension with OID ( 1.2.840.113635.100.8.2 ) in credCert.
    const OID: Oid<'static> = der_parser::oid!(1.2.840 .113635 .100 .8 .2);

    fn parse(i: &[u8]) -> der_parser::error::BerResult<(Self::Output, AttestationMetadata)> {
        use der_parser::{der::*, error::BerError};
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let (i, tagged_nonce) = parse_der_tagged_explicit(1, parse_der_octetstring)(i)?;
            let (class, _tag, nonce) = tagged_nonce.as_tagged()?;
            if class != Class::ContextSpecific {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let nonce = nonce
                .as_slice()?
                .try_into()
                .map_err(|_| BerError::InvalidLength)?;
            Ok((i, (nonce, AttestationMetadata::None)))
        })(i)
    }

    const IS_REQUIRED: bool = true;

    const MISMATCH: &'static str = "nonce does not match the certificate extension";
}

/// Validate an x509 extension is present in an x509 certificate, and that its
/// value equals `data`.
pub fn validate_extension<T>(
    fmt: &str,
    x509: &x509::X509Ref,
    data: &<T as AttestationX509Extension>::Output,
) -> WebauthnResult<AttestationMetadata>
where
    T: AttestationX509Extension,
{
    let der_bytes = x509.to_der()?;
    let (_, cert) = x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| WebauthnError::format(fmt, "x5c certificate is malformed"))?;

    let extension = match cert.extensions().iter().find(|e| e.oid == T::OID) {
        Some(e) => e,
        None if T::IS_REQUIRED => {
            return Err(WebauthnError::format(
                fmt,
                format!("certificate extension {} is missing", T::OID),
            ))
        }
        None => return Ok(AttestationMetadata::None),
    };

    if extension.critical && !T::MAY_BE_CRITICAL {
        return Err(WebauthnError::format(
            fmt,
            format!("certificate extension {} must not be critical", T::OID),
        ));
    }

    let (_, (output, metadata)) = T::parse(extension.value).map_err(|e| {
        debug!(?e, oid = %T::OID, "extension parse failure");
        WebauthnError::format(
            fmt,
            format!("certificate extension {} is malformed", T::OID),
        )
    })?;

    if &output == data {
        Ok(metadata)
    } else {
        Err(WebauthnError::format(fmt, T::MISMATCH))
    }
}
