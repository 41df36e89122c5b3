//! Core types shared across the signing and verification modules.

use const_oid::db::rfc5912::{ID_SHA_1, ID_SHA_256, ID_SHA_384, ID_SHA_512};
use const_oid::ObjectIdentifier;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::time::Duration;

/// Hash algorithm used for message digests and timestamp imprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// SHA-1 (deprecated, but still common in legacy deployments)
    Sha1,
    /// SHA-256 (recommended)
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

/// Single algorithm lookup table; keeps dispatch out of call sites.
const HASH_TABLE: [(HashAlgorithm, ObjectIdentifier, &str, usize); 4] = [
    (HashAlgorithm::Sha1, ID_SHA_1, "SHA-1", 20),
    (HashAlgorithm::Sha256, ID_SHA_256, "SHA-256", 32),
    (HashAlgorithm::Sha384, ID_SHA_384, "SHA-384", 48),
    (HashAlgorithm::Sha512, ID_SHA_512, "SHA-512", 64),
];

impl HashAlgorithm {
    /// Get the OID for this hash algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        self.entry().1
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        self.entry().2
    }

    /// Digest output length in bytes.
    pub fn digest_len(&self) -> usize {
        self.entry().3
    }

    /// Look up an algorithm by its OID.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        HASH_TABLE.iter().find(|e| &e.1 == oid).map(|e| e.0)
    }

    /// Compute the digest of `data` under this algorithm.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn entry(&self) -> &'static (HashAlgorithm, ObjectIdentifier, &'static str, usize) {
        // Table covers every variant
        HASH_TABLE
            .iter()
            .find(|e| e.0 == *self)
            .unwrap_or(&HASH_TABLE[1])
    }
}

/// Signature container standard.
///
/// Both standards produce the same detached CMS SignedData; only the
/// container sub-filter name differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureStandard {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    Pkcs7,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    Cades,
}

impl SignatureStandard {
    /// Get the container sub-filter name for this standard.
    pub fn sub_filter_name(&self) -> &'static str {
        match self {
            SignatureStandard::Pkcs7 => "adbe.pkcs7.detached",
            SignatureStandard::Cades => "ETSI.CAdES.detached",
        }
    }

    /// Parse a sub-filter name into a standard.
    pub fn from_sub_filter_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureStandard::Pkcs7),
            "ETSI.CAdES.detached" => Some(SignatureStandard::Cades),
            _ => None,
        }
    }
}

/// Which long-term-validation evidence to embed in the signature envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LtvLevel {
    /// No revocation evidence embedded
    #[default]
    None,
    /// Embed CRLs for the signing chain
    IncludeCrl,
    /// Embed OCSP responses for the signing chain
    IncludeOcsp,
    /// Embed both CRLs and OCSP responses
    IncludeCrlAndOcsp,
}

impl LtvLevel {
    /// Whether CRL evidence should be collected.
    pub fn wants_crl(&self) -> bool {
        matches!(self, LtvLevel::IncludeCrl | LtvLevel::IncludeCrlAndOcsp)
    }

    /// Whether OCSP evidence should be collected.
    pub fn wants_ocsp(&self) -> bool {
        matches!(self, LtvLevel::IncludeOcsp | LtvLevel::IncludeCrlAndOcsp)
    }
}

/// Signing credentials containing certificate and private key.
#[derive(Clone)]
pub struct SigningCredentials {
    /// DER-encoded X.509 certificate
    pub certificate: Vec<u8>,
    /// DER-encoded private key (PKCS#8 format)
    pub private_key: Vec<u8>,
    /// Certificate chain candidates (intermediate/root certificates, DER-encoded)
    pub chain: Vec<Vec<u8>>,
}

impl SigningCredentials {
    /// Create new signing credentials from raw components.
    pub fn new(certificate: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            certificate,
            private_key,
            chain: Vec::new(),
        }
    }

    /// Create credentials with a certificate chain.
    pub fn with_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.chain = chain;
        self
    }
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("certificate", &format!("{} bytes", self.certificate.len()))
            .field("private_key", &"[REDACTED]")
            .field("chain", &format!("{} certificates", self.chain.len()))
            .finish()
    }
}

/// Configuration for talking to an RFC 3161 timestamp authority.
#[derive(Clone)]
pub struct TimestampSettings {
    /// TSA endpoint URL
    pub url: String,
    /// HTTP Basic auth username
    pub username: Option<String>,
    /// HTTP Basic auth password
    pub password: Option<String>,
    /// TLS client identity (PKCS#12 DER bytes + password)
    pub client_identity: Option<(Vec<u8>, String)>,
    /// Request timeout
    pub timeout: Duration,
    /// Requested TSA policy OID, if any
    pub policy: Option<ObjectIdentifier>,
    /// Whether to include a nonce in the request
    pub use_nonce: bool,
}

impl TimestampSettings {
    /// Settings for an unauthenticated TSA endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            client_identity: None,
            timeout: Duration::from_secs(20),
            policy: None,
            use_nonce: true,
        }
    }

    /// Add HTTP Basic authentication.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Request a specific TSA policy.
    pub fn with_policy(mut self, policy: ObjectIdentifier) -> Self {
        self.policy = Some(policy);
        self
    }
}

impl std::fmt::Debug for TimestampSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .field("use_nonce", &self.use_nonce)
            .finish()
    }
}

/// Options for signing a document.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Hash algorithm to use
    pub hash_algorithm: HashAlgorithm,
    /// Signature container standard
    pub standard: SignatureStandard,
    /// Reason for signing
    pub reason: Option<String>,
    /// Location where the document was signed
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Name of the signer (if different from certificate CN)
    pub name: Option<String>,
    /// Revocation evidence to embed for long-term validation
    pub ltv: LtvLevel,
    /// Timestamp authority configuration; `None` disables timestamping
    pub timestamp: Option<TimestampSettings>,
    /// Minimum placeholder size in bytes; the reservation never shrinks below this
    pub estimated_size: usize,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha256,
            standard: SignatureStandard::Pkcs7,
            reason: None,
            location: None,
            contact_info: None,
            name: None,
            ltv: LtvLevel::None,
            timestamp: None,
            estimated_size: 8192, // Conservative default for signature size
        }
    }
}

impl SignOptions {
    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Enable timestamping against the given TSA.
    pub fn with_timestamp(mut self, settings: TimestampSettings) -> Self {
        self.timestamp = Some(settings);
        self
    }

    /// Select a long-term-validation evidence level.
    pub fn with_ltv(mut self, ltv: LtvLevel) -> Self {
        self.ltv = ltv;
        self
    }
}

/// Time source used for local validity checks.
///
/// Injected so validity-window decisions can be tested at fixed instants.
pub trait Clock {
    /// Current time as seconds since the Unix epoch.
    fn now_unix(&self) -> i64;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for tests and reproducible validation.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0
    }
}
