//! The attestation (registration) and assertion (authentication) ceremonies.
//!
//! [WebauthnCore] is built once from a [VerifierConfig] holding the injected
//! collaborators, and then verifies any number of ceremonies. Each ceremony runs
//! its steps strictly in order; the first failing step aborts the remainder and
//! is returned together with everything decoded up to that point.

use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

use serde_cbor_2::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::attestation::{verify_attestation_statement, FormatSelector, VerificationContext};
use crate::base64_data::Base64UrlSafeData;
use crate::chain::{CertificateChainValidator, CrlSource};
use crate::constants::{CLIENT_DATA_TYPE_CREATE, CLIENT_DATA_TYPE_GET, CREDENTIAL_TYPE_PUBLIC_KEY};
use crate::crypto::{compute_sha256, verify_signature};
use crate::error::{
    AssertionError, AttestationError, CeremonyError, WebauthnError, WebauthnResult,
};
use crate::expectation::{AssertionExpectation, AttestationExpectation};
use crate::interface::{
    AssertionResult, AttestationResult, AuthenticatorData, AuthenticatorExtensions,
    AuthenticatorFlag, AuthenticatorFlags, CredentialID, CredentialPublicKey,
};
use crate::internals::cbor_text_map;
use crate::metadata::{MetadataEntry, MetadataPolicy, MetadataService};
use crate::proto::{
    CollectedClientData, PublicKeyCredential, RegisterPublicKeyCredential, TokenBinding,
};

/// The collaborators a [WebauthnCore] consults.
#[derive(Clone, Default)]
pub struct VerifierConfig {
    /// Looks up authenticator metadata by AAGUID, for expectations that request it.
    pub metadata_service: Option<Arc<dyn MetadataService + Send + Sync>>,
    /// Supplies certificate revocation lists by distribution point URI.
    pub crl_source: Option<Arc<dyn CrlSource + Send + Sync>>,
    /// Accept attestation certificates outside their validity window. Only for
    /// replaying recorded ceremonies.
    pub danger_disable_certificate_time_checks: bool,
}

impl fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("metadata_service", &self.metadata_service.is_some())
            .field("crl_source", &self.crl_source.is_some())
            .field(
                "danger_disable_certificate_time_checks",
                &self.danger_disable_certificate_time_checks,
            )
            .finish()
    }
}

/// This is the core of the Webauthn verification. It provides two interfaces:
/// * [WebauthnCore::verify_attestation], for registration responses
/// * [WebauthnCore::verify_assertion], for authentication responses
///
/// Neither holds per call state, so a single instance can be shared between
/// threads behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct WebauthnCore {
    config: VerifierConfig,
}

fn credential_id(id: &str, raw_id: Option<&Base64UrlSafeData>) -> WebauthnResult<CredentialID> {
    let decoded = Base64UrlSafeData::try_from(id)?;
    if let Some(raw_id) = raw_id {
        if raw_id.as_slice() != decoded.as_slice() {
            return Err(WebauthnError::mismatch(
                "rawId mismatch",
                raw_id,
                &decoded,
            ));
        }
    }
    Ok(decoded)
}

fn verify_credential_type(type_: &str) -> WebauthnResult<()> {
    if type_ != CREDENTIAL_TYPE_PUBLIC_KEY {
        return Err(WebauthnError::mismatch(
            "credential.type is not match.",
            type_,
            CREDENTIAL_TYPE_PUBLIC_KEY,
        ));
    }
    Ok(())
}

fn parse_client_data(client_data_json: &[u8]) -> WebauthnResult<CollectedClientData> {
    serde_json::from_slice(client_data_json).map_err(|e| {
        WebauthnError::Parse(format!("response.clientDataJSON is invalid: {}", e))
    })
}

fn verify_token_binding(
    actual: Option<&serde_json::Value>,
    expected: Option<&TokenBinding>,
) -> WebauthnResult<()> {
    let actual = actual
        .map(|v| {
            serde_json::from_value::<TokenBinding>(v.clone()).map_err(|e| {
                debug!(?e, "token binding structure");
                WebauthnError::ceremony("response.clientData.tokenBinding is invalid.")
            })
        })
        .transpose()?;

    match (actual, expected) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(WebauthnError::ceremony(
            "response.clientData.tokenBinding does not exist.",
        )),
        (Some(_), None) => Err(WebauthnError::ceremony(
            "response.clientData.tokenBinding is not expected.",
        )),
        (Some(actual), Some(expected)) => {
            if actual.status != expected.status {
                return Err(WebauthnError::mismatch(
                    "response.clientData.tokenBinding.status is not match.",
                    format!("{:?}", actual.status),
                    format!("{:?}", expected.status),
                ));
            }
            if actual.id != expected.id {
                return Err(WebauthnError::mismatch(
                    "response.clientData.tokenBinding.id is not match.",
                    actual.id.unwrap_or_default(),
                    expected.id.clone().unwrap_or_default(),
                ));
            }
            Ok(())
        }
    }
}

fn verify_client_data(
    client_data: &CollectedClientData,
    type_: &str,
    challenge: &[u8],
    origin: &str,
    token_binding: Option<&TokenBinding>,
) -> WebauthnResult<()> {
    // Verify that the value of C.type is type_.
    if client_data.type_ != type_ {
        return Err(WebauthnError::mismatch(
            "response.clientDataJSON.type is not match.",
            &client_data.type_,
            type_,
        ));
    }

    // Verify that the value of C.challenge equals the base64url encoding of the challenge.
    let challenge = Base64UrlSafeData::from(challenge).to_string();
    if client_data.challenge != challenge {
        return Err(WebauthnError::mismatch(
            "response.clientDataJSON.challenge is not match.",
            &client_data.challenge,
            challenge,
        ));
    }

    // Verify that the value of C.origin matches the Relying Party's origin.
    if client_data.origin != origin {
        debug!("{} != {}", client_data.origin, origin);
        return Err(WebauthnError::mismatch(
            "response.clientDataJSON.origin is not match.",
            &client_data.origin,
            origin,
        ));
    }

    // Verify that the value of C.tokenBinding.status matches the state of Token Binding for the
    // TLS connection over which the attestation was obtained.
    verify_token_binding(client_data.token_binding.as_ref(), token_binding)
}

fn verify_flags(
    flags: &AuthenticatorFlags,
    required: &BTreeSet<AuthenticatorFlag>,
) -> WebauthnResult<()> {
    // Verify that the User Present bit of the flags in authData is set.
    if !flags.user_present {
        return Err(WebauthnError::ceremony(
            "authenticatorData.flags.userPresent is not set.",
        ));
    }

    if let Some(missing) = required.iter().find(|f| !flags.contains(**f)) {
        return Err(WebauthnError::ceremony(format!(
            "authenticatorData.flags.{} is not set.",
            missing
        )));
    }
    Ok(())
}

fn decode_extensions(
    auth_data: &AuthenticatorData,
) -> WebauthnResult<Option<AuthenticatorExtensions>> {
    auth_data
        .extensions
        .as_ref()
        .map(|ext| {
            trace!(?ext, "authenticator extensions");
            AuthenticatorExtensions::try_from(ext)
        })
        .transpose()
}

fn clone_warning(sign_count: u32, stored_sign_count: u32) -> String {
    format!(
        "authenticatorData.signCount({}) is less than or equal to storedSignCount({}). This is a signal that the authenticator may be cloned.",
        sign_count, stored_sign_count
    )
}

impl WebauthnCore {
    /// Create a verifier over the supplied collaborators.
    pub fn new(config: VerifierConfig) -> Self {
        WebauthnCore { config }
    }

    fn chain_validator(&self) -> CertificateChainValidator<'_> {
        CertificateChainValidator::new(
            self.config.crl_source.as_deref(),
            self.config.danger_disable_certificate_time_checks,
        )
    }

    fn metadata_entry(&self, aaguid: Uuid) -> WebauthnResult<Option<MetadataEntry>> {
        match &self.config.metadata_service {
            Some(svc) => {
                let entry = svc.get(aaguid)?;
                if entry.is_none() {
                    debug!(%aaguid, "no metadata entry");
                }
                Ok(entry)
            }
            None => {
                warn!("metadata was requested but no metadata service is configured");
                Ok(None)
            }
        }
    }

    /// Verify a registration response against `expectation`.
    ///
    /// On success the result carries the new credential's id and public key, which
    /// the caller should persist. On failure the error carries whatever was decoded
    /// before the failing step.
    #[instrument(level = "debug", skip_all)]
    pub fn verify_attestation(
        &self,
        credential: &RegisterPublicKeyCredential,
        expectation: &AttestationExpectation,
    ) -> Result<AttestationResult, AttestationError> {
        let mut result = AttestationResult::default();
        match self.attestation_steps(credential, expectation, &mut result) {
            Ok(()) => {
                result.verification = true;
                debug!(
                    fmt = ?result.fmt,
                    attestation_type = ?result.attestation_type,
                    "attestation verified"
                );
                Ok(result)
            }
            Err(error) => {
                error!(%error, "attestation ceremony failed");
                Err(CeremonyError {
                    error,
                    result: Box::new(result),
                })
            }
        }
    }

    // https://w3c.github.io/webauthn/#sctn-registering-a-new-credential
    fn attestation_steps(
        &self,
        credential: &RegisterPublicKeyCredential,
        expectation: &AttestationExpectation,
        result: &mut AttestationResult,
    ) -> WebauthnResult<()> {
        verify_credential_type(&credential.type_)?;

        // 1. The raw id, when sent, must be the decoded form of the id.
        credential_id(&credential.id, credential.raw_id.as_ref())?;

        // 2. Let JSONtext be the result of running UTF-8 decode on the value of
        // response.clientDataJSON, and parse it into C.
        let client_data_json = credential.response.client_data_json.as_slice();
        let client_data = parse_client_data(client_data_json)?;
        result.client_data = Some(client_data.clone());

        // 3 - 6.
        verify_client_data(
            &client_data,
            CLIENT_DATA_TYPE_CREATE,
            &expectation.challenge,
            &expectation.origin,
            expectation.token_binding.as_ref(),
        )?;

        // 7. Compute the hash of response.clientDataJSON using SHA-256.
        let client_data_hash = compute_sha256(client_data_json);
        result.client_data_hash = Some(client_data_hash.to_vec());

        // 8. Perform CBOR decoding on the attestationObject field to obtain the attestation
        // statement format fmt, the authenticator data authData, and the attestation statement
        // attStmt.
        let attestation_object: Value =
            serde_cbor_2::from_slice(credential.response.attestation_object.as_slice()).map_err(
                |e| WebauthnError::Parse(format!("response.attestationObject is invalid: {}", e)),
            )?;
        let attestation_object = cbor_text_map(&attestation_object)?;
        let field = |key: &str| {
            attestation_object.get(key).copied().ok_or_else(|| {
                WebauthnError::Parse(format!("response.attestationObject.{} is missing", key))
            })
        };
        let fmt = match field("fmt")? {
            Value::Text(s) => FormatSelector::from(s.as_str()),
            _ => {
                return Err(WebauthnError::Parse(
                    "response.attestationObject.fmt is not text".to_string(),
                ))
            }
        };
        let auth_data_bytes = match field("authData")? {
            Value::Bytes(b) => b,
            _ => {
                return Err(WebauthnError::Parse(
                    "response.attestationObject.authData is not bytes".to_string(),
                ))
            }
        };
        let att_stmt = field("attStmt")?;
        if let FormatSelector::Supported(f) = &fmt {
            result.fmt = Some(*f);
        }

        let auth_data = AuthenticatorData::try_from(auth_data_bytes.as_slice())?;
        trace!(?auth_data);
        result.authenticator_data = Some(auth_data.clone());
        result.flags = Some(auth_data.flags);
        result.sign_count = Some(auth_data.counter);

        // 9. Verify that the rpIdHash in authData is the SHA-256 hash of the RP ID expected by
        // the Relying Party.
        if auth_data.rp_id_hash != expectation.rp_id_hash {
            return Err(WebauthnError::mismatch(
                "authenticatorData.rpIdHash is not match.",
                Base64UrlSafeData::from(auth_data.rp_id_hash.as_slice()),
                Base64UrlSafeData::from(&expectation.rp_id_hash[..]),
            ));
        }

        // 10. Verify that the User Present bit is set, the flags the Relying Party requires are
        // set, and attested credential data is included.
        verify_flags(&auth_data.flags, &expectation.required_flags)?;
        if !auth_data.flags.attested_credential_data {
            return Err(WebauthnError::ceremony(
                "authenticatorData.flags.attestedCredentialData is not set.",
            ));
        }

        // 11. Attested credential data.
        let acd = auth_data.acd.as_ref().ok_or_else(|| {
            WebauthnError::ceremony("authenticatorData.attestedCredentialData does not exist.")
        })?;
        let aaguid = Uuid::from_bytes(acd.aaguid);
        result.aaguid = Some(aaguid);
        result.credential_id = Some(acd.credential_id.clone());

        // 12. Verify that the "alg" parameter in the credential public key in authData matches
        // the alg attribute of one of the items in options.pubKeyCredParams.
        let credential_public_key = CredentialPublicKey::try_from(&acd.credential_pk)?;
        result.credential_public_key = Some(credential_public_key.clone());
        if !expectation.algs.contains(&credential_public_key.alg) {
            let allowed: Vec<String> = expectation.algs.iter().map(|a| a.to_string()).collect();
            return Err(WebauthnError::mismatch(
                "credentialPublicKey.alg is not allowed.",
                credential_public_key.alg,
                allowed.join(", "),
            ));
        }

        // 13. Verify that the values of the client extension outputs and the authenticator
        // extension outputs are as expected.
        result.extensions = decode_extensions(&auth_data)?;

        // 14. Consult the metadata service about this authenticator model.
        let metadata_entry = if expectation.use_metadata && !aaguid.is_nil() {
            self.metadata_entry(aaguid)?
        } else {
            None
        };
        result.metadata_entry = metadata_entry.clone();

        let roots = match &metadata_entry {
            Some(entry) => {
                let decision =
                    MetadataPolicy::verify_authenticator_status(entry, &expectation.status_policy);
                debug!(?decision, "authenticator status");
                if !decision.result {
                    return Err(WebauthnError::ceremony(decision.message));
                }
                entry.metadata_statement.root_certificates()?
            }
            None => Vec::new(),
        };

        // 15. Verify that attStmt is a correct attestation statement, conveying a valid
        // attestation signature, by using the attestation statement format fmt's verification
        // procedure given attStmt, authData and hash.
        let ctx = VerificationContext {
            auth_data_bytes: Some(auth_data_bytes.as_slice()),
            auth_data: Some(&auth_data),
            client_data_hash: Some(&client_data_hash[..]),
            credential_public_key: Some(&credential_public_key),
            roots: &roots,
            chain: self.chain_validator(),
        };
        let format_result = verify_attestation_statement(&fmt, att_stmt, &ctx)?;
        trace!(?format_result);
        if !format_result.is_valid {
            return Err(WebauthnError::ceremony("attStmt is invalid."));
        }

        // 16. Assess the attestation trustworthiness. With metadata, the attestation type must
        // be one the metadata statement declares.
        let attestation_type = match &metadata_entry {
            Some(entry) => {
                let decision = MetadataPolicy::verify_attestation_type(
                    entry,
                    &format_result.attestation_types,
                );
                debug!(?decision, "attestation type");
                if !decision.result {
                    result.format_result = Some(format_result);
                    return Err(WebauthnError::ceremony(decision.message));
                }
                decision.attestation_type
            }
            None => format_result.attestation_types.first().copied(),
        };
        result.attestation_type = attestation_type;
        result.format_result = Some(format_result);

        // 17. Everything the caller needs to register the credential.
        result.transports = credential.response.transports.clone();
        Ok(())
    }

    /// Verify an authentication response against `expectation`.
    ///
    /// On success the caller should persist [AssertionResult::sign_count] as the new
    /// stored counter.
    #[instrument(level = "debug", skip_all)]
    pub fn verify_assertion(
        &self,
        credential: &PublicKeyCredential,
        expectation: &AssertionExpectation,
    ) -> Result<AssertionResult, AssertionError> {
        let mut result = AssertionResult::default();
        match self.assertion_steps(credential, expectation, &mut result) {
            Ok(()) => {
                result.verification = true;
                debug!(sign_count = ?result.sign_count, "assertion verified");
                Ok(result)
            }
            Err(error) => {
                error!(%error, "assertion ceremony failed");
                Err(CeremonyError {
                    error,
                    result: Box::new(result),
                })
            }
        }
    }

    // https://w3c.github.io/webauthn/#sctn-verifying-assertion
    fn assertion_steps(
        &self,
        credential: &PublicKeyCredential,
        expectation: &AssertionExpectation,
        result: &mut AssertionResult,
    ) -> WebauthnResult<()> {
        verify_credential_type(&credential.type_)?;

        // 1. If the allowCredentials option was given, verify that credential.id identifies one
        // of the public key credentials listed in allowCredentials.
        let cred_id = credential_id(&credential.id, credential.raw_id.as_ref())?;
        result.credential_id = Some(cred_id.clone());
        if let Some(allowed) = &expectation.allow_credentials {
            if !allowed.contains(&cred_id) {
                return Err(WebauthnError::ceremony(
                    "credential.id is not in allowCredentials.",
                ));
            }
        }

        // 2. Identify the user being authenticated. When the user is already known, a returned
        // user handle must belong to them. Otherwise the response must carry one.
        let user_handle = credential
            .get_user_unique_id()
            .filter(|u| !u.is_empty())
            .map(<[u8]>::to_vec);
        match (&expectation.user_handle, &user_handle) {
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(WebauthnError::mismatch(
                    "response.userHandle is not match.",
                    Base64UrlSafeData::from(actual.as_slice()),
                    Base64UrlSafeData::from(expected.as_slice()),
                ));
            }
            (None, None) => {
                return Err(WebauthnError::ceremony("response.userHandle does not exist."));
            }
            _ => {}
        }
        result.user_handle = user_handle;

        // 3. Let cData, authData and sig denote the value of response's clientDataJSON,
        // authenticatorData, and signature respectively.
        let client_data_json = credential.response.client_data_json.as_slice();
        let client_data = parse_client_data(client_data_json)?;
        result.client_data = Some(client_data.clone());

        // 4 - 7.
        verify_client_data(
            &client_data,
            CLIENT_DATA_TYPE_GET,
            &expectation.challenge,
            &expectation.origin,
            expectation.token_binding.as_ref(),
        )?;

        let auth_data_bytes = credential.response.authenticator_data.as_slice();
        let auth_data = AuthenticatorData::try_from(auth_data_bytes)?;
        trace!(?auth_data);
        result.authenticator_data = Some(auth_data.clone());
        result.flags = Some(auth_data.flags);
        result.sign_count = Some(auth_data.counter);

        // 8. Verify that the rpIdHash in authData is the SHA-256 hash of the RP ID expected by
        // the Relying Party. A credential registered through U2F may instead hash the AppID,
        // when the client reports it used that extension.
        if auth_data.rp_id_hash != expectation.rp_id_hash {
            let appid_matches = credential.extensions.appid == Some(true)
                && expectation
                    .appid_hash
                    .map(|h| h[..] == auth_data.rp_id_hash[..])
                    .unwrap_or(false);
            if !appid_matches {
                return Err(WebauthnError::mismatch(
                    "authenticatorData.rpIdHash is not match.",
                    Base64UrlSafeData::from(auth_data.rp_id_hash.as_slice()),
                    Base64UrlSafeData::from(&expectation.rp_id_hash[..]),
                ));
            }
            debug!("rpIdHash matched the appid");
            result.appid_used = true;
        }

        // 9 - 10. Flags.
        verify_flags(&auth_data.flags, &expectation.required_flags)?;

        // 11. Extension outputs.
        result.extensions = decode_extensions(&auth_data)?;

        // 12. Let hash be the result of computing a hash over the cData using SHA-256.
        let client_data_hash = compute_sha256(client_data_json);
        result.client_data_hash = Some(client_data_hash.to_vec());

        // 13. Using the credential public key, verify that sig is a valid signature over the
        // binary concatenation of authData and hash.
        let verification_data: Vec<u8> = auth_data_bytes
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();
        let verified = verify_signature(
            expectation.alg,
            &expectation.public_key,
            credential.response.signature.as_slice(),
            &verification_data,
        )?;
        if !verified {
            return Err(WebauthnError::ceremony("response.signature is not valid."));
        }

        // 14. Signature counter. Authenticators that never increment report zero forever, so
        // zero against a stored zero is not compared.
        let sign_count = auth_data.counter;
        let stored_sign_count = expectation.stored_sign_count;
        if sign_count == 0 && stored_sign_count == 0 {
            debug!("sign counter not in use");
        } else {
            let greater = sign_count > stored_sign_count;
            result.greater_than_stored_sign_count = Some(greater);
            if !greater {
                let message = clone_warning(sign_count, stored_sign_count);
                if expectation.strict_sign_count {
                    return Err(WebauthnError::mismatch(
                        message,
                        sign_count,
                        stored_sign_count,
                    ));
                }
                warn!("{}", message);
                result.messages.push(message);
            }
        }

        Ok(())
    }
}
