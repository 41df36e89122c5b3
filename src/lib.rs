// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::match_like_matches_macro)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PAdES Oxide
//!
//! Trust verification and signature embedding for byte-range signed documents.
//!
//! ## Core Features
//!
//! ### Trust Verification
//! - **Revocation Checking**: OCSP (RFC 6960), CRL over HTTP, CRL over LDAP
//! - **Failure Policies**: fail-open or fail-closed mapping of infrastructure failures
//! - **Chain Resolution**: issuer chains built from caller-supplied candidates
//! - **Local Validity**: clock-injected validity-window checks
//!
//! ### Signature Embedding
//! - **CMS SignedData**: detached PKCS#7 and CAdES envelopes (RFC 5652)
//! - **Timestamping**: RFC 3161 acquisition with nonce and imprint validation
//! - **LTV Evidence**: CRLs and OCSP responses embedded for long-term validation
//! - **Byte-Range Protocol**: placeholder reservation, digest over signed ranges,
//!   in-place hex patch-back that never changes the document length
//!
//! ## Quick Start
//!
//! ```ignore
//! use pades_oxide::{DocumentSigner, SignOptions, SigningCredentials};
//!
//! # fn main() -> pades_oxide::Result<()> {
//! let credentials = SigningCredentials::new(cert_der, key_der).with_chain(chain_der);
//! let options = SignOptions::default().with_reason("Contract approval");
//!
//! let mut signer = DocumentSigner::new(credentials, options);
//! let report = signer.sign(&mut document)?;
//! println!("signed, byte range {:?}", report.byte_range);
//! # Ok(())
//! # }
//! ```
//!
//! Verification-side helpers work without credentials:
//!
//! ```ignore
//! use pades_oxide::revocation::{RevocationChecker, VerificationType};
//!
//! let mut checker = RevocationChecker::new();
//! let status = checker.check(&cert, Some(&issuer), VerificationType::Ocsp)?;
//! ```

// Error types
pub mod error;

// Shared configuration and algorithm types
pub mod types;

// Certificate handling and chain resolution
pub mod chain;

// Revocation checking: OCSP, CRL over HTTP, CRL over LDAP
pub mod revocation;

// RFC 3161 timestamp client and token verification
pub mod timestamp;

// CMS SignedData envelope assembly
pub mod envelope;

// Byte-range placeholder reservation and patch-back
pub mod byterange;

// Signing orchestration
pub mod signer;

// Test-only certificate, CRL and token fixtures
#[cfg(test)]
pub(crate) mod testutil;

// Re-exports
pub use byterange::PlaceholderReservation;
pub use chain::{Certificate, CertificateChain, ChainResolver};
pub use error::{Error, Result};
pub use revocation::{FailurePolicy, RevocationChecker, RevocationStatus, VerificationType};
pub use signer::{DocumentSigner, SigningReport};
pub use timestamp::{TimestampClient, TimestampToken, TimestampVerification};
pub use types::{
    Clock, FixedClock, HashAlgorithm, LtvLevel, SignOptions, SignatureStandard,
    SigningCredentials, SystemClock, TimestampSettings,
};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
