//! Certificate chain validation with CRL based revocation checks.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use openssl::asn1::Asn1Time;
use openssl::x509::{X509Crl, X509Ref, X509VerifyResult};

use crate::error::{WebauthnError, WebauthnResult};

/// A source of certificate revocation lists, keyed by the URI named in a
/// certificate's CRL distribution point extension.
///
/// Retrieval (HTTP or otherwise) is the implementor's concern. Return
/// `Ok(None)` when a list is unavailable; the URI is then skipped. An `Err`
/// aborts the ceremony.
pub trait CrlSource {
    /// Fetch the CRL published at `uri`, as PEM or DER bytes.
    fn fetch_crl(&self, uri: &str) -> WebauthnResult<Option<Vec<u8>>>;
}

/// A [CrlSource] over lists that were fetched ahead of time.
#[derive(Debug, Clone, Default)]
pub struct StaticCrlSource {
    crls: BTreeMap<String, Vec<u8>>,
}

impl StaticCrlSource {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the CRL bytes published at `uri`.
    pub fn insert(&mut self, uri: impl Into<String>, crl: Vec<u8>) {
        self.crls.insert(uri.into(), crl);
    }
}

impl CrlSource for StaticCrlSource {
    fn fetch_crl(&self, uri: &str) -> WebauthnResult<Option<Vec<u8>>> {
        Ok(self.crls.get(uri).cloned())
    }
}

/// Validates an ordered certificate chain, leaf first.
#[derive(Clone, Copy)]
pub struct CertificateChainValidator<'a> {
    crl_source: Option<&'a (dyn CrlSource + Send + Sync)>,
    danger_disable_certificate_time_checks: bool,
}

impl fmt::Debug for CertificateChainValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateChainValidator")
            .field("crl_source", &self.crl_source.is_some())
            .field(
                "danger_disable_certificate_time_checks",
                &self.danger_disable_certificate_time_checks,
            )
            .finish()
    }
}

fn crl_distribution_uris(cert: &X509Ref) -> Vec<String> {
    let mut uris = Vec::new();
    if let Some(dps) = cert.crl_distribution_points() {
        for dp in dps.iter() {
            let names = dp.distpoint().and_then(|dpn| dpn.fullname());
            if let Some(names) = names {
                uris.extend(names.iter().filter_map(|gn| gn.uri()).map(str::to_string));
            }
        }
    }
    uris
}

fn parse_crl(bytes: &[u8]) -> WebauthnResult<X509Crl> {
    if bytes.starts_with(b"-----BEGIN") {
        X509Crl::from_pem(bytes).map_err(WebauthnError::OpenSSLError)
    } else {
        X509Crl::from_der(bytes).map_err(WebauthnError::OpenSSLError)
    }
}

fn serial_of(cert: &X509Ref) -> WebauthnResult<Vec<u8>> {
    Ok(cert.serial_number().to_bn()?.to_vec())
}

/// Is `now` within the certificate's notBefore and notAfter.
pub(crate) fn within_validity_window(cert: &X509Ref) -> WebauthnResult<bool> {
    let now = Asn1Time::days_from_now(0)?;
    let started = cert.not_before().compare(&now)? != Ordering::Greater;
    let not_expired = cert.not_after().compare(&now)? != Ordering::Less;
    Ok(started && not_expired)
}

impl<'a> CertificateChainValidator<'a> {
    /// A validator that consults `crl_source` for revocation lists, if given.
    pub fn new(
        crl_source: Option<&'a (dyn CrlSource + Send + Sync)>,
        danger_disable_certificate_time_checks: bool,
    ) -> Self {
        CertificateChainValidator {
            crl_source,
            danger_disable_certificate_time_checks,
        }
    }

    /// Is the certificate within its validity window. Always true when time
    /// checks are disabled.
    pub fn is_current(&self, cert: &X509Ref) -> WebauthnResult<bool> {
        if self.danger_disable_certificate_time_checks {
            Ok(true)
        } else {
            within_validity_window(cert)
        }
    }

    fn revoked_serials(&self, chain: &[&X509Ref]) -> WebauthnResult<BTreeSet<Vec<u8>>> {
        let mut revoked = BTreeSet::new();

        let uris: BTreeSet<String> = chain
            .iter()
            .flat_map(|cert| crl_distribution_uris(cert))
            .collect();

        if uris.is_empty() {
            return Ok(revoked);
        }

        let source = match self.crl_source {
            Some(s) => s,
            None => {
                warn!(
                    ?uris,
                    "certificates name CRL distribution points but no crl source is configured"
                );
                return Ok(revoked);
            }
        };

        for uri in uris.iter() {
            let bytes = match source.fetch_crl(uri)? {
                Some(b) => b,
                None => {
                    warn!(%uri, "CRL is unavailable, skipping");
                    continue;
                }
            };
            let crl = parse_crl(&bytes)?;
            if let Some(entries) = crl.get_revoked() {
                for entry in entries.iter() {
                    revoked.insert(entry.serial_number().to_bn()?.to_vec());
                }
            }
        }

        trace!(revoked = revoked.len(), "resolved revoked serials");
        Ok(revoked)
    }

    /// Validate `chain` (leaf first), with `root` appended when supplied.
    ///
    /// Fails with [WebauthnError::CertificateRevoked] if any certificate is listed
    /// in a resolved CRL. Otherwise returns whether every certificate is within its
    /// validity window and is signed by its successor.
    ///
    /// Revocation matches serial numbers against every resolved CRL pooled together;
    /// the CRL issuer and signature are not checked.
    pub fn verify(
        &self,
        chain: &[openssl::x509::X509],
        root: Option<&X509Ref>,
    ) -> WebauthnResult<bool> {
        let full: Vec<&X509Ref> = chain
            .iter()
            .map(|c| c.as_ref())
            .chain(root.into_iter())
            .collect();

        if full.is_empty() {
            debug!("empty certificate chain");
            return Ok(false);
        }

        let revoked = self.revoked_serials(&full)?;
        for cert in full.iter() {
            let serial = serial_of(cert)?;
            if revoked.contains(&serial) {
                let serial = cert.serial_number().to_bn()?.to_hex_str()?.to_string();
                warn!(%serial, "certificate is revoked");
                return Err(WebauthnError::CertificateRevoked { serial });
            }
        }

        for (idx, cert) in full.iter().enumerate() {
            if !self.is_current(cert)? {
                debug!(?idx, "certificate is outside its validity window");
                return Ok(false);
            }

            if let Some(parent) = full.get(idx + 1) {
                if parent.issued(cert) != X509VerifyResult::OK {
                    debug!(?idx, "certificate issuer does not match parent subject");
                    return Ok(false);
                }
                let parent_key = parent.public_key()?;
                if !cert.verify(&parent_key)? {
                    debug!(?idx, "certificate is not signed by its parent");
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Validate `chain` against each of `roots` in order, the first success wins.
    /// With no roots the chain is validated as supplied.
    pub fn verify_with_roots(
        &self,
        chain: &[openssl::x509::X509],
        roots: &[openssl::x509::X509],
    ) -> WebauthnResult<bool> {
        if roots.is_empty() {
            return self.verify(chain, None);
        }

        for root in roots.iter() {
            if self.verify(chain, Some(root))? {
                return Ok(true);
            }
        }
        debug!("no metadata root certificate validated the chain");
        Ok(false)
    }
}
