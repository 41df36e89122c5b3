//! CRL retrieval over HTTP and serial lookup.
//!
//! CRLs are downloaded from the certificate's first HTTP distribution point,
//! optionally bounded by a size ceiling, and cached per checker instance so
//! multiple certificates sharing a distribution point cost one download.

use crate::chain::Certificate;
use crate::error::{Error, Result};
use crate::revocation::RevocationStatus;
use der::{Decode, Encode};
use std::collections::HashMap;
use std::time::Duration;
use x509_cert::crl::CertificateList;

/// Per-instance CRL download cache keyed by URL.
#[derive(Debug, Default)]
pub struct CrlCache {
    entries: HashMap<String, Vec<u8>>,
}

impl CrlCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached CRLs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, url: &str) -> Option<&[u8]> {
        self.entries.get(url).map(|v| v.as_slice())
    }

    pub(crate) fn insert(&mut self, url: String, der: Vec<u8>) {
        self.entries.insert(url, der);
    }
}

fn malformed(reason: impl ToString) -> Error {
    Error::MalformedResponse {
        source_kind: "CRL distribution point",
        reason: reason.to_string(),
    }
}

pub(crate) fn parse_crl(der: &[u8]) -> Result<CertificateList> {
    CertificateList::from_der(der).map_err(malformed)
}

/// Leading zero octets do not change the serial value.
fn trim_serial(bytes: &[u8]) -> &[u8] {
    let mut start = 0;
    while start + 1 < bytes.len() && bytes[start] == 0 {
        start += 1;
    }
    &bytes[start..]
}

/// Whether `crl` revokes the certificate: issuer names must match and the
/// serial must appear in the revoked list.
pub(crate) fn is_revoked_by(crl: &CertificateList, issuer_name_der: &[u8], serial: &[u8]) -> Result<bool> {
    let crl_issuer = crl.tbs_cert_list.issuer.to_der()?;
    if crl_issuer != issuer_name_der {
        return Ok(false);
    }
    let serial = trim_serial(serial);
    let revoked = match &crl.tbs_cert_list.revoked_certificates {
        Some(revoked) => revoked,
        None => return Ok(false),
    };
    Ok(revoked
        .iter()
        .any(|entry| trim_serial(entry.serial_number.as_bytes()) == serial))
}

/// Download a CRL, honoring the optional size ceiling.
fn download(url: &str, timeout: Duration, size_limit: Option<usize>) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send()?.error_for_status()?;

    match size_limit {
        Some(limit) => {
            use std::io::Read;
            let mut buf = Vec::new();
            response.take(limit as u64 + 1).read_to_end(&mut buf)?;
            if buf.len() > limit {
                return Err(Error::CrlTooLarge { limit });
            }
            Ok(buf)
        },
        None => Ok(response.bytes()?.to_vec()),
    }
}

fn fetch_cached(
    cache: &mut CrlCache,
    url: &str,
    timeout: Duration,
    size_limit: Option<usize>,
) -> Result<Vec<u8>> {
    if let Some(der) = cache.get(url) {
        log::debug!("CRL cache hit for {}", url);
        return Ok(der.to_vec());
    }
    log::debug!("downloading CRL from {}", url);
    let der = download(url, timeout, size_limit)?;
    parse_crl(&der)?;
    cache.insert(url.to_string(), der.clone());
    Ok(der)
}

/// Determine the revocation status of `cert` from a parsed CRL.
pub(crate) fn status_against(crl: &CertificateList, cert: &Certificate) -> Result<RevocationStatus> {
    let issuer = cert.issuer_raw()?;
    let serial = cert.serial()?;
    if is_revoked_by(crl, &issuer, &serial)? {
        Ok(RevocationStatus::Revoked)
    } else {
        Ok(RevocationStatus::Valid)
    }
}

/// Check `cert` against its first HTTP CRL distribution point.
///
/// A certificate without an HTTP distribution point has nothing to check
/// and is reported as `Valid`.
pub(crate) fn check_http(
    cache: &mut CrlCache,
    cert: &Certificate,
    timeout: Duration,
    size_limit: Option<usize>,
) -> Result<RevocationStatus> {
    let url = match cert.http_crl_url()? {
        Some(url) => url,
        None => return Ok(RevocationStatus::Valid),
    };
    let der = fetch_cached(cache, &url, timeout, size_limit)?;
    let crl = parse_crl(&der)?;
    status_against(&crl, cert)
}

/// Fetch the raw CRL DER for embedding as LTV evidence.
pub(crate) fn fetch_evidence(
    cache: &mut CrlCache,
    cert: &Certificate,
    timeout: Duration,
    size_limit: Option<usize>,
) -> Result<Option<Vec<u8>>> {
    let url = match cert.http_crl_url()? {
        Some(url) => url,
        None => return Ok(None),
    };
    fetch_cached(cache, &url, timeout, size_limit).map(Some)
}
