//! Error types for the trust verification and signing library.
//!
//! This module defines all error types that can occur while checking certificate
//! status, acquiring timestamps, and embedding signatures.

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during trust verification and signing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No document bytes were supplied to sign
    #[error("No document loaded for signing")]
    DocumentNotLoaded,

    /// Signing was requested without a certificate
    #[error("No signing certificate set")]
    CertificateNotSet,

    /// Certificate bytes could not be parsed as X.509 DER
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Private key bytes could not be parsed as PKCS#8
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Issuer chain could not be resolved for an operation that requires it
    #[error("Certificate chain unresolved: {0}")]
    ChainUnresolved(String),

    /// A network operation exceeded its deadline
    #[error("Network timeout talking to {0}")]
    NetworkTimeout(String),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// LDAP directory failure
    #[error("LDAP error: {0}")]
    Ldap(String),

    /// A response from a responder/TSA/distribution point failed to decode
    #[error("Malformed response from {source_kind}: {reason}")]
    MalformedResponse {
        /// Which remote produced the bytes (OCSP responder, CRL endpoint, TSA)
        source_kind: &'static str,
        /// Decode failure detail
        reason: String,
    },

    /// OCSP response answered for a different certificate than asked
    #[error("OCSP CertID mismatch: responder answered for a different certificate")]
    CertIdMismatch,

    /// A downloaded CRL exceeded the configured size ceiling
    #[error("CRL exceeds size limit of {limit} bytes")]
    CrlTooLarge {
        /// Configured ceiling in bytes
        limit: usize,
    },

    /// The TSA refused the timestamp request
    #[error("Timestamp request rejected by TSA: {0}")]
    TimestampRejected(String),

    /// The timestamp token is internally inconsistent or undecodable
    #[error("Timestamp token altered or invalid: {0}")]
    TimestampAltered(String),

    /// The final signature did not fit the reserved placeholder
    #[error("Signature of {needed} bytes exceeds reserved placeholder of {reserved} bytes")]
    PlaceholderOverflow {
        /// Bytes the encoded signature actually needs
        needed: usize,
        /// Bytes the placeholder reserved
        reserved: usize,
    },

    /// Byte-range bookkeeping does not match the document
    #[error("Invalid byte range: {0}")]
    InvalidByteRange(String),

    /// CMS envelope construction failure
    #[error("Signature envelope error: {0}")]
    Envelope(String),

    /// ASN.1 encode/decode error
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let url = err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "remote endpoint".to_string());
            Error::NetworkTimeout(url)
        } else {
            Error::Http(err.to_string())
        }
    }
}
