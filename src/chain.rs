//! Certificate handling and issuer chain resolution.
//!
//! A [`Certificate`] owns raw DER bytes and exposes the fields the rest of the
//! library needs through accessors that parse on demand. Absent fields come
//! back as `Ok(None)`; malformed certificates come back as `Err`, so the two
//! cases stay distinguishable.

use crate::error::{Error, Result};
use x509_parser::oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_OCSP;
use x509_parser::prelude::*;

/// Chains longer than this are treated as unresolvable.
const MAX_CHAIN_DEPTH: usize = 8;

/// An X.509 certificate held as DER bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wrap DER bytes, validating that they parse as an X.509 certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        X509Certificate::from_der(&der).map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        Ok(Self { der })
    }

    /// Raw DER bytes.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    fn parsed(&self) -> Result<X509Certificate<'_>> {
        let (_, cert) =
            X509Certificate::from_der(&self.der).map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        Ok(cert)
    }

    /// Subject distinguished name, human readable.
    pub fn subject(&self) -> Result<String> {
        Ok(self.parsed()?.subject().to_string())
    }

    /// Raw DER bytes of the subject Name.
    pub fn subject_raw(&self) -> Result<Vec<u8>> {
        Ok(self.parsed()?.subject().as_raw().to_vec())
    }

    /// Raw DER bytes of the issuer Name.
    pub fn issuer_raw(&self) -> Result<Vec<u8>> {
        Ok(self.parsed()?.issuer().as_raw().to_vec())
    }

    /// Serial number as big-endian bytes, as encoded in the certificate.
    pub fn serial(&self) -> Result<Vec<u8>> {
        Ok(self.parsed()?.raw_serial().to_vec())
    }

    /// Validity window as Unix timestamps `(not_before, not_after)`.
    pub fn validity_unix(&self) -> Result<(i64, i64)> {
        let cert = self.parsed()?;
        let validity = cert.validity();
        Ok((validity.not_before.timestamp(), validity.not_after.timestamp()))
    }

    /// Whether subject and issuer name are identical.
    pub fn is_self_signed(&self) -> Result<bool> {
        let cert = self.parsed()?;
        Ok(cert.subject().as_raw() == cert.issuer().as_raw())
    }

    /// OCSP responder URL from the Authority Information Access extension.
    pub fn ocsp_url(&self) -> Result<Option<String>> {
        let cert = self.parsed()?;
        for ext in cert.extensions() {
            if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
                for desc in &aia.accessdescs {
                    if desc.access_method == OID_PKIX_ACCESS_DESCRIPTOR_OCSP {
                        if let GeneralName::URI(uri) = &desc.access_location {
                            return Ok(Some(uri.to_string()));
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// All URI distribution points from the CRL Distribution Points extension.
    pub fn crl_urls(&self) -> Result<Vec<String>> {
        let cert = self.parsed()?;
        let mut urls = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::CRLDistributionPoints(dps) = ext.parsed_extension() {
                for dp in &dps.points {
                    if let Some(DistributionPointName::FullName(names)) = &dp.distribution_point {
                        for name in names {
                            if let GeneralName::URI(uri) = name {
                                urls.push(uri.to_string());
                            }
                        }
                    }
                }
            }
        }
        Ok(urls)
    }

    /// First HTTP(S) CRL distribution point, if any.
    pub fn http_crl_url(&self) -> Result<Option<String>> {
        Ok(self
            .crl_urls()?
            .into_iter()
            .find(|u| u.starts_with("http://") || u.starts_with("https://")))
    }

    /// First LDAP CRL distribution point, if any.
    pub fn ldap_crl_url(&self) -> Result<Option<String>> {
        Ok(self.crl_urls()?.into_iter().find(|u| u.starts_with("ldap://")))
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("der", &format!("{} bytes", self.der.len()))
            .field(
                "subject",
                &self.subject().unwrap_or_else(|_| "<unparsed>".to_string()),
            )
            .finish()
    }
}

/// An ordered certificate chain, leaf first, root last.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    certs: Vec<Certificate>,
}

impl CertificateChain {
    /// Build a chain from certificates already in leaf-first order.
    pub fn from_certs(certs: Vec<Certificate>) -> Result<Self> {
        if certs.is_empty() {
            return Err(Error::ChainUnresolved("empty certificate chain".to_string()));
        }
        Ok(Self { certs })
    }

    /// The end-entity certificate.
    pub fn leaf(&self) -> &Certificate {
        &self.certs[0]
    }

    /// The last certificate reached during resolution.
    pub fn root(&self) -> &Certificate {
        &self.certs[self.certs.len() - 1]
    }

    /// Number of certificates in the chain.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Whether the chain is empty. Never true for a resolved chain.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Iterate leaf to root.
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certs.iter()
    }

    /// Combined DER size of every certificate, used for placeholder estimation.
    pub fn total_der_len(&self) -> usize {
        self.certs.iter().map(|c| c.as_der().len()).sum()
    }
}

/// Builds issuer chains from a caller-supplied set of candidate certificates.
///
/// Resolution walks issuer-subject links until it reaches a self-signed
/// certificate. No revocation or signature checking happens here.
pub struct ChainResolver<'a> {
    candidates: &'a [Certificate],
}

impl<'a> ChainResolver<'a> {
    /// Create a resolver over a candidate issuer set.
    pub fn new(candidates: &'a [Certificate]) -> Self {
        Self { candidates }
    }

    /// Find the candidate whose subject matches `cert`'s issuer.
    pub fn find_issuer(&self, cert: &Certificate) -> Option<&'a Certificate> {
        let issuer = cert.issuer_raw().ok()?;
        self.candidates.iter().find(|c| {
            c.subject_raw().map(|s| s == issuer).unwrap_or(false) && c.as_der() != cert.as_der()
        })
    }

    /// Resolve the chain for `leaf`, or `None` when it cannot be completed.
    pub fn resolve(&self, leaf: &Certificate) -> Option<CertificateChain> {
        let mut certs = vec![leaf.clone()];
        loop {
            let current = &certs[certs.len() - 1];
            if current.is_self_signed().ok()? {
                return Some(CertificateChain { certs });
            }
            if certs.len() >= MAX_CHAIN_DEPTH {
                log::warn!("chain resolution aborted after {} certificates", certs.len());
                return None;
            }
            match self.find_issuer(current) {
                Some(issuer) => certs.push(issuer.clone()),
                None => {
                    log::debug!("no issuer candidate for {:?}", current);
                    return None;
                },
            }
        }
    }
}
