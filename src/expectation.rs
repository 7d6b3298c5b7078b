//! Server side ground truth for a single ceremony. Expectations are built once from
//! a plain parameter struct, validated on construction, and never mutated.

use std::collections::BTreeSet;

use openssl::pkey::{PKey, Public};
use openssl::sha::sha256;

use crate::constants::CHALLENGE_MIN_BYTES;
use crate::crypto;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::{AuthenticatorFlag, COSEAlgorithm, CredentialID};
use crate::metadata::StatusPolicy;
use crate::proto::{TokenBinding, TokenBindingStatus};

/// Parameters of an [AttestationExpectation].
#[derive(Debug, Clone, Default)]
pub struct AttestationParams {
    /// The challenge sent to the client.
    pub challenge: Vec<u8>,
    /// The exact origin the client must report, ie `https://example.com`.
    pub origin: String,
    /// The relying party id. Defaults to the host of `origin`.
    pub rp_id: Option<String>,
    /// Acceptable credential algorithms. Defaults to [COSEAlgorithm::secure_algs].
    pub algs: Option<Vec<COSEAlgorithm>>,
    /// The token binding the client must report, if any.
    pub token_binding: Option<TokenBinding>,
    /// Flags that must be set in addition to user presence.
    pub required_flags: BTreeSet<AuthenticatorFlag>,
    /// Consult the metadata service for authenticators with a non-nil AAGUID.
    pub use_metadata: bool,
    /// Which metadata status reports are tolerated.
    pub status_policy: StatusPolicy,
}

/// Parameters of an [AssertionExpectation].
#[derive(Debug, Clone, Default)]
pub struct AssertionParams {
    /// The challenge sent to the client.
    pub challenge: Vec<u8>,
    /// The exact origin the client must report.
    pub origin: String,
    /// The relying party id. Defaults to the host of `origin`.
    pub rp_id: Option<String>,
    /// The PEM encoded public key stored at registration.
    pub public_key_pem: String,
    /// The credential algorithm. Inferred from the key when not given.
    pub alg: Option<COSEAlgorithm>,
    /// The user the credential belongs to, if the caller already knows it.
    pub user_handle: Option<Vec<u8>>,
    /// Credential ids that may be used.
    pub allow_credentials: Option<Vec<CredentialID>>,
    /// The signature counter stored after the previous ceremony.
    pub stored_sign_count: Option<u32>,
    /// Treat a non increasing counter as fatal. `None` means strict.
    pub strict_sign_count: Option<bool>,
    /// The token binding the client must report, if any.
    pub token_binding: Option<TokenBinding>,
    /// Flags that must be set in addition to user presence.
    pub required_flags: BTreeSet<AuthenticatorFlag>,
    /// A legacy U2F AppID the credential may have been registered under.
    pub appid: Option<String>,
}

/// Validated ground truth for an attestation ceremony.
#[derive(Debug, Clone)]
pub struct AttestationExpectation {
    pub(crate) challenge: Vec<u8>,
    pub(crate) origin: String,
    pub(crate) rp_id: String,
    pub(crate) rp_id_hash: [u8; 32],
    pub(crate) algs: Vec<COSEAlgorithm>,
    pub(crate) token_binding: Option<TokenBinding>,
    pub(crate) required_flags: BTreeSet<AuthenticatorFlag>,
    pub(crate) use_metadata: bool,
    pub(crate) status_policy: StatusPolicy,
}

/// Validated ground truth for an assertion ceremony.
#[derive(Debug, Clone)]
pub struct AssertionExpectation {
    pub(crate) challenge: Vec<u8>,
    pub(crate) origin: String,
    pub(crate) rp_id: String,
    pub(crate) rp_id_hash: [u8; 32],
    pub(crate) public_key: PKey<Public>,
    pub(crate) alg: COSEAlgorithm,
    pub(crate) user_handle: Option<Vec<u8>>,
    pub(crate) allow_credentials: Option<Vec<CredentialID>>,
    pub(crate) stored_sign_count: u32,
    pub(crate) strict_sign_count: bool,
    pub(crate) token_binding: Option<TokenBinding>,
    pub(crate) required_flags: BTreeSet<AuthenticatorFlag>,
    pub(crate) appid_hash: Option<[u8; 32]>,
}

fn validate_challenge(challenge: &[u8]) -> WebauthnResult<()> {
    if challenge.len() < CHALLENGE_MIN_BYTES {
        return Err(WebauthnError::Validation(format!(
            "challenge must be at least {} bytes, got {}",
            CHALLENGE_MIN_BYTES,
            challenge.len()
        )));
    }
    Ok(())
}

fn resolve_rp_id(origin: &str, rp_id: Option<&str>) -> WebauthnResult<String> {
    let url = url::Url::parse(origin)
        .map_err(|e| WebauthnError::Validation(format!("origin {} is invalid: {}", origin, e)))?;

    match rp_id {
        Some(rp_id) if rp_id.is_empty() => {
            Err(WebauthnError::Validation("rp_id must not be empty".to_string()))
        }
        Some(rp_id) => Ok(rp_id.to_string()),
        None => url.host_str().map(str::to_string).ok_or_else(|| {
            WebauthnError::Validation(format!(
                "no rp_id given and origin {} has no host",
                origin
            ))
        }),
    }
}

fn validate_token_binding(tb: Option<&TokenBinding>) -> WebauthnResult<()> {
    match tb {
        Some(TokenBinding {
            status: TokenBindingStatus::Present,
            id: None,
        }) => Err(WebauthnError::Validation(
            "a present token binding must declare an id".to_string(),
        )),
        _ => Ok(()),
    }
}

impl AttestationExpectation {
    /// Validate the parameters of a registration.
    pub fn new(params: AttestationParams) -> WebauthnResult<Self> {
        validate_challenge(&params.challenge)?;
        let rp_id = resolve_rp_id(&params.origin, params.rp_id.as_deref())?;
        validate_token_binding(params.token_binding.as_ref())?;

        let algs = params.algs.unwrap_or_else(COSEAlgorithm::secure_algs);
        if algs.is_empty() {
            return Err(WebauthnError::Validation(
                "at least one credential algorithm must be accepted".to_string(),
            ));
        }

        Ok(AttestationExpectation {
            rp_id_hash: sha256(rp_id.as_bytes()),
            challenge: params.challenge,
            origin: params.origin,
            rp_id,
            algs,
            token_binding: params.token_binding,
            required_flags: params.required_flags,
            use_metadata: params.use_metadata,
            status_policy: params.status_policy,
        })
    }

    /// The relying party id this expectation hashes.
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// The accepted credential algorithms.
    pub fn algs(&self) -> &[COSEAlgorithm] {
        &self.algs
    }
}

impl AssertionExpectation {
    /// Validate the parameters of an authentication.
    pub fn new(params: AssertionParams) -> WebauthnResult<Self> {
        validate_challenge(&params.challenge)?;
        let rp_id = resolve_rp_id(&params.origin, params.rp_id.as_deref())?;
        validate_token_binding(params.token_binding.as_ref())?;

        let public_key = PKey::public_key_from_pem(params.public_key_pem.as_bytes())
            .map_err(|e| {
                WebauthnError::Validation(format!("public_key_pem is not a valid key: {}", e))
            })?;

        let alg = match params.alg {
            Some(alg) => alg,
            None => crypto::infer_alg(&public_key).map_err(|e| {
                WebauthnError::Validation(format!("unable to infer algorithm: {}", e))
            })?,
        };

        let appid_hash = match params.appid.as_deref() {
            Some("") => {
                return Err(WebauthnError::Validation(
                    "appid must not be empty".to_string(),
                ))
            }
            Some(appid) => Some(sha256(appid.as_bytes())),
            None => None,
        };

        Ok(AssertionExpectation {
            rp_id_hash: sha256(rp_id.as_bytes()),
            challenge: params.challenge,
            origin: params.origin,
            rp_id,
            public_key,
            alg,
            user_handle: params.user_handle,
            allow_credentials: params.allow_credentials,
            stored_sign_count: params.stored_sign_count.unwrap_or(0),
            strict_sign_count: params.strict_sign_count.unwrap_or(true),
            token_binding: params.token_binding,
            required_flags: params.required_flags,
            appid_hash,
        })
    }

    /// The relying party id this expectation hashes.
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// The credential algorithm in use.
    pub fn alg(&self) -> COSEAlgorithm {
        self.alg
    }
}
