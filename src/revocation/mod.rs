//! Certificate status checking over local time, OCSP, and CRLs.
//!
//! One [`RevocationChecker`] instance serves one signing or verification
//! operation; its only mutable state is the per-instance CRL cache. Every
//! call checks exactly one channel, selected by [`VerificationType`].

pub mod crl;
pub mod ldap;
pub mod ocsp;

pub use crl::CrlCache;

use crate::chain::Certificate;
use crate::error::{Error, Result};
use crate::types::{Clock, SystemClock};
use std::time::Duration;

/// Default per-request network timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default CRL size ceiling when collecting LTV evidence: 1 MiB.
pub const DEFAULT_LTV_CRL_LIMIT: usize = 1024 * 1024;

/// Outcome of a status check. Never silently upgraded between channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    /// No evidence against the certificate on the selected channel
    Valid,
    /// The issuer has revoked the certificate
    Revoked,
    /// The channel could not give a definitive answer
    Unknown,
    /// The certificate's validity window has passed
    Expired,
}

/// Which single channel a check consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    /// Pure clock comparison against the validity window, no network
    LocalTime,
    /// OCSP responder from the AIA extension
    Ocsp,
    /// CRL from the first HTTP distribution point
    Crl,
    /// CRL from the first LDAP distribution point
    Ldap,
}

/// How infrastructure failures on network channels map to a status.
///
/// Failures of the channel itself (timeouts, unreachable responders,
/// undecodable responses) are distinct from answers. `FailOpen` treats an
/// unanswerable question as `Valid`; `FailClosed` reports `Unknown` and
/// leaves the decision to the caller. A responder that answers for the
/// wrong certificate is never softened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Infrastructure failures map to `Valid`
    #[default]
    FailOpen,
    /// Infrastructure failures map to `Unknown`
    FailClosed,
}

/// Classify a certificate against a clock: within the validity window is
/// `Valid`, past `not_after` is `Expired`, before `not_before` is `Unknown`.
pub fn local_time_status(cert: &Certificate, clock: &dyn Clock) -> Result<RevocationStatus> {
    let (not_before, not_after) = cert.validity_unix()?;
    let now = clock.now_unix();
    if now > not_after {
        Ok(RevocationStatus::Expired)
    } else if now < not_before {
        Ok(RevocationStatus::Unknown)
    } else {
        Ok(RevocationStatus::Valid)
    }
}

/// Checks certificate status over one channel at a time.
pub struct RevocationChecker {
    policy: FailurePolicy,
    timeout: Duration,
    crl_size_limit: Option<usize>,
    clock: Box<dyn Clock>,
    cache: CrlCache,
}

impl Default for RevocationChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl RevocationChecker {
    /// Checker with the default fail-open policy and 15 second timeout.
    pub fn new() -> Self {
        Self {
            policy: FailurePolicy::FailOpen,
            timeout: DEFAULT_TIMEOUT,
            crl_size_limit: None,
            clock: Box::new(SystemClock),
            cache: CrlCache::new(),
        }
    }

    /// Select a failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the per-request network timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound CRL downloads to `limit` bytes.
    pub fn with_crl_size_limit(mut self, limit: usize) -> Self {
        self.crl_size_limit = Some(limit);
        self
    }

    /// Inject a time source for local validity checks.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The configured failure policy.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Check `cert` on the selected channel.
    ///
    /// `issuer` is required for OCSP; the other channels ignore it.
    /// Infrastructure failures resolve per the failure policy; a CertID
    /// mismatch from an OCSP responder always surfaces as an error.
    pub fn check(
        &mut self,
        cert: &Certificate,
        issuer: Option<&Certificate>,
        channel: VerificationType,
    ) -> Result<RevocationStatus> {
        let outcome = match channel {
            VerificationType::LocalTime => local_time_status(cert, &*self.clock),
            VerificationType::Ocsp => match issuer {
                Some(issuer) => ocsp::check(cert, issuer, self.timeout),
                None => Err(Error::ChainUnresolved(
                    "OCSP check requires the issuer certificate".to_string(),
                )),
            },
            VerificationType::Crl => {
                crl::check_http(&mut self.cache, cert, self.timeout, self.crl_size_limit)
            },
            VerificationType::Ldap => ldap::check(&mut self.cache, cert, self.timeout),
        };
        self.soften(outcome, channel)
    }

    /// Fetch a raw CRL for LTV embedding, bounded by the evidence ceiling.
    pub fn fetch_crl_evidence(&mut self, cert: &Certificate) -> Result<Option<Vec<u8>>> {
        let limit = self.crl_size_limit.unwrap_or(DEFAULT_LTV_CRL_LIMIT);
        crl::fetch_evidence(&mut self.cache, cert, self.timeout, Some(limit))
    }

    /// Fetch a raw OCSP response for LTV embedding.
    pub fn fetch_ocsp_evidence(
        &mut self,
        cert: &Certificate,
        issuer: &Certificate,
    ) -> Result<Option<Vec<u8>>> {
        ocsp::fetch_evidence(cert, issuer, self.timeout)
    }

    fn soften(&self, outcome: Result<RevocationStatus>, channel: VerificationType) -> Result<RevocationStatus> {
        match outcome {
            Ok(status) => Ok(status),
            Err(Error::CertIdMismatch) => Err(Error::CertIdMismatch),
            Err(e) => {
                log::warn!("{:?} check failed ({}); applying {:?}", channel, e, self.policy);
                match self.policy {
                    FailurePolicy::FailOpen => Ok(RevocationStatus::Valid),
                    FailurePolicy::FailClosed => Ok(RevocationStatus::Unknown),
                }
            },
        }
    }
}
