//! Metadata service entries and the policy applied to them.
//!
//! Fetching and caching the FIDO metadata blob is the caller's concern. The
//! engine only consumes the [MetadataEntry] a [MetadataService] returns for an
//! AAGUID, and decides whether the claimed attestation type and the reported
//! authenticator status are acceptable.

use std::collections::BTreeMap;
use std::fmt;

use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::AttestationType;

/// The certification status of an authenticator model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthenticatorStatus {
    /// The device is NOT fido certified
    #[serde(rename = "NOT_FIDO_CERTIFIED")]
    NotFidoCertified,
    /// Legacy certification, equivalent to `FIDO_CERTIFIED_L1`.
    #[serde(rename = "FIDO_CERTIFIED")]
    FidoCertified,
    /// Malware is able to bypass user verification.
    #[serde(rename = "USER_VERIFICATION_BYPASS")]
    UserVerificationBypass,
    /// An attestation key for this authenticator is known to be compromised.
    #[serde(rename = "ATTESTATION_KEY_COMPROMISE")]
    AttestationKeyCompromise,
    /// Registered keys can be compromised remotely.
    #[serde(rename = "USER_KEY_REMOTE_COMPROMISE")]
    UserKeyRemoteCompromise,
    /// User keys can be extracted by an adversary in physical possession of the device.
    #[serde(rename = "USER_KEY_PHYSICAL_COMPROMISE")]
    UserKeyPhysicalCompromise,
    /// A software or firmware update is available for the device.
    #[serde(rename = "UPDATE_AVAILABLE")]
    UpdateAvailable,
    /// The FIDO Alliance has determined that this authenticator should not be trusted.
    #[serde(rename = "REVOKED")]
    Revoked,
    /// The vendor has submitted the self-certification checklist.
    #[serde(rename = "SELF_ASSERTION_SUBMITTED")]
    SelfAssertionSubmitted,
    /// This device is certified at level 1
    #[serde(rename = "FIDO_CERTIFIED_L1")]
    FidoCertifiedL1,
    /// This device is certified at level 1 plus
    #[serde(rename = "FIDO_CERTIFIED_L1plus")]
    FidoCertifiedL1Plus,
    /// This device is certified at level 2
    #[serde(rename = "FIDO_CERTIFIED_L2")]
    FidoCertifiedL2,
    /// This device is certified at level 2 plus
    #[serde(rename = "FIDO_CERTIFIED_L2plus")]
    FidoCertifiedL2Plus,
    /// This device is certified at level 3
    #[serde(rename = "FIDO_CERTIFIED_L3")]
    FidoCertifiedL3,
    /// This device is certified at level 3 plus
    #[serde(rename = "FIDO_CERTIFIED_L3plus")]
    FidoCertifiedL3Plus,
}

impl fmt::Display for AuthenticatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthenticatorStatus::NotFidoCertified => "NOT_FIDO_CERTIFIED",
            AuthenticatorStatus::FidoCertified => "FIDO_CERTIFIED",
            AuthenticatorStatus::UserVerificationBypass => "USER_VERIFICATION_BYPASS",
            AuthenticatorStatus::AttestationKeyCompromise => "ATTESTATION_KEY_COMPROMISE",
            AuthenticatorStatus::UserKeyRemoteCompromise => "USER_KEY_REMOTE_COMPROMISE",
            AuthenticatorStatus::UserKeyPhysicalCompromise => "USER_KEY_PHYSICAL_COMPROMISE",
            AuthenticatorStatus::UpdateAvailable => "UPDATE_AVAILABLE",
            AuthenticatorStatus::Revoked => "REVOKED",
            AuthenticatorStatus::SelfAssertionSubmitted => "SELF_ASSERTION_SUBMITTED",
            AuthenticatorStatus::FidoCertifiedL1 => "FIDO_CERTIFIED_L1",
            AuthenticatorStatus::FidoCertifiedL1Plus => "FIDO_CERTIFIED_L1plus",
            AuthenticatorStatus::FidoCertifiedL2 => "FIDO_CERTIFIED_L2",
            AuthenticatorStatus::FidoCertifiedL2Plus => "FIDO_CERTIFIED_L2plus",
            AuthenticatorStatus::FidoCertifiedL3 => "FIDO_CERTIFIED_L3",
            AuthenticatorStatus::FidoCertifiedL3Plus => "FIDO_CERTIFIED_L3plus",
        };
        f.write_str(name)
    }
}

impl AuthenticatorStatus {
    /// Equality where `FIDO_CERTIFIED` and `FIDO_CERTIFIED_L1` are the same status.
    pub fn is_equivalent(self, other: AuthenticatorStatus) -> bool {
        fn canonical(s: AuthenticatorStatus) -> AuthenticatorStatus {
            match s {
                AuthenticatorStatus::FidoCertified => AuthenticatorStatus::FidoCertifiedL1,
                s => s,
            }
        }
        canonical(self) == canonical(other)
    }

    /// The statuses rejected when the caller supplies no policy.
    pub fn default_unacceptable() -> Vec<AuthenticatorStatus> {
        vec![
            AuthenticatorStatus::Revoked,
            AuthenticatorStatus::NotFidoCertified,
            AuthenticatorStatus::UserVerificationBypass,
            AuthenticatorStatus::AttestationKeyCompromise,
            AuthenticatorStatus::UserKeyRemoteCompromise,
            AuthenticatorStatus::UserKeyPhysicalCompromise,
        ]
    }
}

/// A status change of an authenticator model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// The status of the authenticator.
    pub status: AuthenticatorStatus,
    /// ISO-8601 date (`YYYY-MM-DD`) since when the status applies.
    #[serde(default)]
    pub effective_date: Option<String>,
    /// The authenticatorVersion that this status report relates to.
    #[serde(default)]
    pub authenticator_version: Option<u32>,
    /// HTTPS URL where additional information may be found.
    #[serde(default)]
    pub url: Option<String>,
}

/// The subset of a metadata statement the engine consults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    /// Human readable description of the authenticator.
    #[serde(default)]
    pub description: Option<String>,
    /// Attestation types in metadata vocabulary, ie `basic_full`, `attca`.
    #[serde(default)]
    pub attestation_types: Option<Vec<String>>,
    /// Trust anchors for this model, base64 (standard alphabet) DER or PEM.
    #[serde(default)]
    pub attestation_root_certificates: Vec<String>,
    /// Anything else in the statement.
    #[serde(flatten)]
    pub unknown_keys: BTreeMap<String, serde_json::Value>,
}

impl MetadataStatement {
    /// Decode the declared trust anchors, in declaration order.
    pub fn root_certificates(&self) -> WebauthnResult<Vec<X509>> {
        self.attestation_root_certificates
            .iter()
            .map(|c| {
                let c = c.trim();
                if c.starts_with("-----BEGIN") {
                    X509::from_pem(c.as_bytes()).map_err(WebauthnError::OpenSSLError)
                } else {
                    let der = base64::decode_config(c, base64::STANDARD).map_err(|e| {
                        WebauthnError::MetadataService(format!(
                            "attestationRootCertificates entry is not base64: {}",
                            e
                        ))
                    })?;
                    X509::from_der(&der).map_err(WebauthnError::OpenSSLError)
                }
            })
            .collect()
    }
}

/// A metadata service entry for one authenticator model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    /// The AAGUID this entry describes.
    #[serde(default)]
    pub aaguid: Option<Uuid>,
    /// The metadata statement.
    #[serde(default)]
    pub metadata_statement: MetadataStatement,
    /// Status history of the model.
    #[serde(default)]
    pub status_reports: Vec<StatusReport>,
}

/// Looks up the metadata entry for an AAGUID.
///
/// An implementation is created once and shared by every ceremony. `Ok(None)` means
/// the AAGUID is unknown to the service.
pub trait MetadataService {
    /// Fetch the entry for `aaguid`.
    fn get(&self, aaguid: Uuid) -> WebauthnResult<Option<MetadataEntry>>;
}

/// A [MetadataService] over entries that were loaded ahead of time.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataService {
    entries: BTreeMap<Uuid, MetadataEntry>,
}

impl StaticMetadataService {
    /// An empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, keyed by its AAGUID. Entries without one are ignored.
    pub fn insert(&mut self, entry: MetadataEntry) {
        match entry.aaguid {
            Some(aaguid) => {
                self.entries.insert(aaguid, entry);
            }
            None => warn!("ignoring metadata entry without an aaguid"),
        }
    }

    /// Load a JSON array of metadata entries.
    pub fn from_json(json: &str) -> WebauthnResult<Self> {
        let entries: Vec<MetadataEntry> = serde_json::from_str(json)
            .map_err(|e| WebauthnError::MetadataService(format!("invalid metadata json: {}", e)))?;
        let mut svc = Self::new();
        entries.into_iter().for_each(|e| svc.insert(e));
        debug!(entries = svc.entries.len(), "loaded static metadata");
        Ok(svc)
    }
}

impl MetadataService for StaticMetadataService {
    fn get(&self, aaguid: Uuid) -> WebauthnResult<Option<MetadataEntry>> {
        Ok(self.entries.get(&aaguid).cloned())
    }
}

/// Which authenticator statuses a ceremony tolerates. With both lists unset the
/// [AuthenticatorStatus::default_unacceptable] list applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPolicy {
    /// When set, only these statuses are accepted.
    pub acceptable_status: Option<Vec<AuthenticatorStatus>>,
    /// When set, these statuses are rejected instead of the default list.
    pub unacceptable_status: Option<Vec<AuthenticatorStatus>>,
}

/// The outcome of a metadata policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Whether the check passed.
    pub result: bool,
    /// The attestation type settled on, for attestation type checks.
    pub attestation_type: Option<AttestationType>,
    /// Why the check passed or failed.
    pub message: String,
}

impl PolicyDecision {
    fn accept(attestation_type: Option<AttestationType>, message: impl Into<String>) -> Self {
        PolicyDecision {
            result: true,
            attestation_type,
            message: message.into(),
        }
    }

    fn reject(message: impl Into<String>) -> Self {
        PolicyDecision {
            result: false,
            attestation_type: None,
            message: message.into(),
        }
    }
}

fn metadata_name(t: AttestationType) -> &'static str {
    match t {
        AttestationType::None => "none",
        AttestationType::Basic => "basic_full",
        AttestationType::Self_ => "basic_surrogate",
        AttestationType::AttCa => "attca",
        AttestationType::AnonCa => "anonca",
    }
}

fn contains_status(list: &[AuthenticatorStatus], status: AuthenticatorStatus) -> bool {
    list.iter().any(|s| s.is_equivalent(status))
}

/// Decisions about a [MetadataEntry].
pub struct MetadataPolicy;

impl MetadataPolicy {
    /// Narrow `candidates` to the first type the metadata statement declares.
    pub fn verify_attestation_type(
        entry: &MetadataEntry,
        candidates: &[AttestationType],
    ) -> PolicyDecision {
        let declared = match entry.metadata_statement.attestation_types.as_ref() {
            Some(d) if !d.is_empty() => d,
            _ => {
                return PolicyDecision::accept(
                    candidates.first().copied(),
                    "metadata declares no attestation types",
                )
            }
        };

        for name in declared.iter() {
            if let Some(t) = candidates.iter().find(|c| metadata_name(**c) == name) {
                trace!(%t, "attestation type accepted by metadata");
                return PolicyDecision::accept(Some(*t), format!("{} is declared", name));
            }
        }

        let names: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
        PolicyDecision::reject(format!(
            "attestation types [{}] are not declared in metadata",
            names.join(", ")
        ))
    }

    /// The status report that currently applies: the first declared of the most
    /// recent ones, except that `FIDO_CERTIFIED` yields to a same-date
    /// `FIDO_CERTIFIED_L1`.
    pub fn latest_status(entry: &MetadataEntry) -> Option<&StatusReport> {
        let mut reports: Vec<&StatusReport> = entry.status_reports.iter().collect();
        // Stable, so equal dates keep their declared order. Undated reports sort last.
        reports.sort_by(|a, b| b.effective_date.cmp(&a.effective_date));

        let newest = *reports.first()?;
        let same_day: Vec<&StatusReport> = reports
            .into_iter()
            .take_while(|r| r.effective_date == newest.effective_date)
            .collect();
        // L1 only outranks the plain FIDO_CERTIFIED report it refines.
        let has_l1 = same_day
            .iter()
            .any(|r| r.status == AuthenticatorStatus::FidoCertifiedL1);
        same_day
            .into_iter()
            .find(|r| !(has_l1 && r.status == AuthenticatorStatus::FidoCertified))
    }

    /// Is the current status of the authenticator acceptable under `policy`.
    pub fn verify_authenticator_status(
        entry: &MetadataEntry,
        policy: &StatusPolicy,
    ) -> PolicyDecision {
        let report = match Self::latest_status(entry) {
            Some(r) => r,
            None => return PolicyDecision::accept(None, "metadata has no status reports"),
        };
        let status = report.status;

        let accepted = match (&policy.acceptable_status, &policy.unacceptable_status) {
            (Some(ok), not_ok) => {
                contains_status(ok, status)
                    && !not_ok
                        .as_deref()
                        .map(|l| contains_status(l, status))
                        .unwrap_or(false)
            }
            (None, Some(not_ok)) => !contains_status(not_ok, status),
            (None, None) => {
                !contains_status(&AuthenticatorStatus::default_unacceptable(), status)
            }
        };

        if accepted {
            PolicyDecision::accept(None, format!("authenticator status {} is acceptable", status))
        } else {
            PolicyDecision::reject(format!(
                "authenticator status {} is not acceptable",
                status
            ))
        }
    }
}
