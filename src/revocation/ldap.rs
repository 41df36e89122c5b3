//! CRL retrieval from LDAP directory servers.
//!
//! Distribution points of the form
//! `ldap://host:port/CN=...,DC=...?certificateRevocationList;binary` are
//! split into endpoint, base DN and attribute, then resolved with a base
//! scope search.

use crate::chain::Certificate;
use crate::error::{Error, Result};
use crate::revocation::crl::{self, CrlCache};
use crate::revocation::RevocationStatus;
use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use std::time::Duration;

const DEFAULT_CRL_ATTRIBUTE: &str = "certificateRevocationList;binary";

/// An LDAP distribution point split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LdapCrlTarget {
    /// Scheme, host and optional port, e.g. `ldap://dir.example:389`
    pub endpoint: String,
    /// Percent-decoded base DN of the CRL entry
    pub base_dn: String,
    /// Attribute holding the CRL bytes
    pub attribute: String,
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &input[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Split an LDAP URL (RFC 4516 subset) into endpoint, base DN and attribute.
pub(crate) fn parse_ldap_url(url: &str) -> Result<LdapCrlTarget> {
    let rest = url
        .strip_prefix("ldap://")
        .ok_or_else(|| Error::Ldap(format!("not an ldap URL: {}", url)))?;

    let (authority, path_and_query) = match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(Error::Ldap(format!("ldap URL missing host: {}", url)));
    }

    let mut parts = path_and_query.splitn(2, '?');
    let dn = parts.next().unwrap_or("");
    if dn.is_empty() {
        return Err(Error::Ldap(format!("ldap URL missing base DN: {}", url)));
    }
    let attribute = parts
        .next()
        .map(|q| q.split('?').next().unwrap_or(""))
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_CRL_ATTRIBUTE)
        .to_string();

    Ok(LdapCrlTarget {
        endpoint: format!("ldap://{}", authority),
        base_dn: percent_decode(dn),
        attribute,
    })
}

/// Fetch the CRL bytes behind an LDAP distribution point.
fn fetch_from_directory(target: &LdapCrlTarget, timeout: Duration) -> Result<Vec<u8>> {
    let settings = LdapConnSettings::new().set_conn_timeout(timeout);
    let mut conn = LdapConn::with_settings(settings, &target.endpoint)
        .map_err(|e| Error::Ldap(e.to_string()))?;

    let (entries, _result) = conn
        .search(
            &target.base_dn,
            Scope::Base,
            "(objectClass=*)",
            vec![target.attribute.as_str()],
        )
        .map_err(|e| Error::Ldap(e.to_string()))?
        .success()
        .map_err(|e| Error::Ldap(e.to_string()))?;
    let _ = conn.unbind();

    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| Error::Ldap(format!("no entry at {}", target.base_dn)))?;
    let entry = SearchEntry::construct(entry);

    // Binary attributes land in bin_attrs; some servers drop the ;binary tag
    let bare_name = target.attribute.split(';').next().unwrap_or(&target.attribute);
    let values = entry
        .bin_attrs
        .get(&target.attribute)
        .or_else(|| entry.bin_attrs.get(bare_name))
        .ok_or_else(|| Error::Ldap(format!("entry has no {} attribute", target.attribute)))?;
    values
        .first()
        .cloned()
        .ok_or_else(|| Error::Ldap(format!("empty {} attribute", target.attribute)))
}

fn fetch_cached(cache: &mut CrlCache, url: &str, timeout: Duration) -> Result<Vec<u8>> {
    if let Some(der) = cache.get(url) {
        log::debug!("CRL cache hit for {}", url);
        return Ok(der.to_vec());
    }
    let target = parse_ldap_url(url)?;
    log::debug!("fetching CRL from {} at {}", target.base_dn, target.endpoint);
    let der = fetch_from_directory(&target, timeout)?;
    crl::parse_crl(&der)?;
    cache.insert(url.to_string(), der.clone());
    Ok(der)
}

/// Check `cert` against its first LDAP CRL distribution point.
///
/// A certificate without an LDAP distribution point has nothing to check
/// and is reported as `Valid`.
pub(crate) fn check(
    cache: &mut CrlCache,
    cert: &Certificate,
    timeout: Duration,
) -> Result<RevocationStatus> {
    let url = match cert.ldap_crl_url()? {
        Some(url) => url,
        None => return Ok(RevocationStatus::Valid),
    };
    let der = fetch_cached(cache, &url, timeout)?;
    let parsed = crl::parse_crl(&der)?;
    crl::status_against(&parsed, cert)
}
