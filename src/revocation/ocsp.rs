//! OCSP status checking (RFC 6960).
//!
//! Requests are unsigned and carry a single CertID built over SHA-1 hashes
//! of the issuer name and issuer public key:
//!
//! ```text
//! OCSPRequest ::= SEQUENCE {
//!     tbsRequest    TBSRequest,
//!     optionalSignature [0] EXPLICIT Signature OPTIONAL }
//!
//! CertID ::= SEQUENCE {
//!     hashAlgorithm  AlgorithmIdentifier,
//!     issuerNameHash OCTET STRING,
//!     issuerKeyHash  OCTET STRING,
//!     serialNumber   CertificateSerialNumber }
//!
//! OCSPResponse ::= SEQUENCE {
//!     responseStatus OCSPResponseStatus,
//!     responseBytes  [0] EXPLICIT ResponseBytes OPTIONAL }
//! ```
//!
//! The responder's answer is accepted only when it contains exactly one
//! SingleResponse whose CertID matches the request.

use crate::chain::Certificate;
use crate::error::{Error, Result};
use crate::revocation::RevocationStatus;
use const_oid::db::rfc5912::ID_SHA_1;
use const_oid::ObjectIdentifier;
use der::asn1::{AnyRef, BitString, GeneralizedTime, Null, OctetString};
use der::{Any, Choice, Decode, Encode, Enumerated, Sequence};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sha1::{Digest, Sha1};
use spki::AlgorithmIdentifierOwned;
use std::time::Duration;
use x509_cert::serial_number::SerialNumber;

/// id-pkix-ocsp-basic
const ID_PKIX_OCSP_BASIC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");

const MEDIA_TYPE_REQUEST: &str = "application/ocsp-request";
const MEDIA_TYPE_RESPONSE: &str = "application/ocsp-response";

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct CertId {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub issuer_name_hash: OctetString,
    pub issuer_key_hash: OctetString,
    pub serial_number: SerialNumber,
}

#[derive(Clone, Debug, Sequence)]
struct Request {
    req_cert: CertId,
}

#[derive(Clone, Debug, Sequence)]
struct TbsRequest {
    // version and requestorName defaulted/omitted for unsigned requests
    request_list: Vec<Request>,
}

#[derive(Clone, Debug, Sequence)]
struct OcspRequest {
    tbs_request: TbsRequest,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[asn1(type = "ENUMERATED")]
#[repr(u8)]
enum OcspResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

#[derive(Clone, Debug, Sequence)]
struct OcspResponse {
    response_status: OcspResponseStatus,
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    response_bytes: Option<ResponseBytes>,
}

#[derive(Clone, Debug, Sequence)]
struct ResponseBytes {
    response_type: ObjectIdentifier,
    response: OctetString,
}

#[derive(Clone, Debug, Sequence)]
struct BasicOcspResponse {
    tbs_response_data: ResponseData,
    signature_algorithm: AlgorithmIdentifierOwned,
    signature: BitString,
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    certs: Option<Vec<Any>>,
}

#[derive(Clone, Debug, Sequence)]
struct ResponseData {
    #[asn1(context_specific = "0", default = "Default::default")]
    version: u8,
    // ResponderID is a CHOICE of [1] Name / [2] KeyHash; opaque here
    responder_id: Any,
    produced_at: GeneralizedTime,
    responses: Vec<SingleResponse>,
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    response_extensions: Option<Any>,
}

#[derive(Clone, Debug, Sequence)]
struct SingleResponse {
    cert_id: CertId,
    cert_status: CertStatus,
    this_update: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    next_update: Option<GeneralizedTime>,
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    single_extensions: Option<Any>,
}

#[derive(Clone, Debug, Choice)]
enum CertStatus {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    Good(Null),
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Revoked(RevokedInfo),
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT")]
    Unknown(Null),
}

#[derive(Clone, Debug, Sequence)]
struct RevokedInfo {
    revocation_time: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    revocation_reason: Option<Any>,
}

fn malformed(reason: impl ToString) -> Error {
    Error::MalformedResponse {
        source_kind: "OCSP responder",
        reason: reason.to_string(),
    }
}

/// Build the CertID for `cert` under `issuer` per RFC 6960 §4.1.1.
pub(crate) fn build_cert_id(cert: &Certificate, issuer: &Certificate) -> Result<CertId> {
    let leaf = x509_cert::Certificate::from_der(cert.as_der())
        .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
    let issuer_cert = x509_cert::Certificate::from_der(issuer.as_der())
        .map_err(|e| Error::InvalidCertificate(e.to_string()))?;

    let name_der = issuer_cert.tbs_certificate.subject.to_der()?;
    let name_hash = Sha1::digest(&name_der);
    let key_hash = Sha1::digest(
        issuer_cert
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes(),
    );

    Ok(CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: ID_SHA_1,
            parameters: Some(Any::from(AnyRef::NULL)),
        },
        issuer_name_hash: OctetString::new(name_hash.as_slice())?,
        issuer_key_hash: OctetString::new(key_hash.as_slice())?,
        serial_number: leaf.tbs_certificate.serial_number.clone(),
    })
}

fn build_request(cert_id: CertId) -> Result<Vec<u8>> {
    let request = OcspRequest {
        tbs_request: TbsRequest {
            request_list: vec![Request { req_cert: cert_id }],
        },
    };
    Ok(request.to_der()?)
}

/// The responder must answer for the certificate we asked about.
fn validate_cert_id(request: &CertId, response: &CertId) -> Result<()> {
    if request.serial_number != response.serial_number
        || request.issuer_name_hash != response.issuer_name_hash
    {
        return Err(Error::CertIdMismatch);
    }
    Ok(())
}

/// Decode and validate a raw OCSPResponse body against the request CertID.
pub(crate) fn evaluate_response(body: &[u8], request_id: &CertId) -> Result<RevocationStatus> {
    let response = OcspResponse::from_der(body).map_err(malformed)?;
    if response.response_status != OcspResponseStatus::Successful {
        return Err(malformed(format!(
            "responder status {:?}",
            response.response_status
        )));
    }
    let bytes = response
        .response_bytes
        .ok_or_else(|| malformed("successful response without responseBytes"))?;
    if bytes.response_type != ID_PKIX_OCSP_BASIC {
        return Err(malformed(format!(
            "unsupported response type {}",
            bytes.response_type
        )));
    }

    let basic = BasicOcspResponse::from_der(bytes.response.as_bytes()).map_err(malformed)?;
    let responses = &basic.tbs_response_data.responses;
    if responses.len() != 1 {
        return Err(malformed(format!(
            "expected exactly one SingleResponse, got {}",
            responses.len()
        )));
    }
    let single = &responses[0];
    validate_cert_id(request_id, &single.cert_id)?;

    Ok(match single.cert_status {
        CertStatus::Good(_) => RevocationStatus::Valid,
        CertStatus::Revoked(_) => RevocationStatus::Revoked,
        CertStatus::Unknown(_) => RevocationStatus::Unknown,
    })
}

fn post_query(url: &str, request_der: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
    let response = client
        .post(url)
        .header(CONTENT_TYPE, MEDIA_TYPE_REQUEST)
        .header(ACCEPT, MEDIA_TYPE_RESPONSE)
        .body(request_der)
        .send()?
        .error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

fn query(cert: &Certificate, issuer: &Certificate, timeout: Duration) -> Result<Option<(Vec<u8>, RevocationStatus)>> {
    let url = match cert.ocsp_url()? {
        Some(url) => url,
        None => return Ok(None),
    };
    log::debug!("querying OCSP responder at {}", url);

    let cert_id = build_cert_id(cert, issuer)?;
    let body = post_query(&url, build_request(cert_id.clone())?, timeout)?;
    let status = evaluate_response(&body, &cert_id)?;
    Ok(Some((body, status)))
}

/// Check `cert` against its AIA OCSP responder.
///
/// A certificate without an OCSP URL has nothing to check and is reported
/// as `Valid`.
pub(crate) fn check(cert: &Certificate, issuer: &Certificate, timeout: Duration) -> Result<RevocationStatus> {
    Ok(match query(cert, issuer, timeout)? {
        Some((_, status)) => status,
        None => RevocationStatus::Valid,
    })
}

/// Fetch the raw OCSPResponse DER for embedding as LTV evidence.
pub(crate) fn fetch_evidence(
    cert: &Certificate,
    issuer: &Certificate,
    timeout: Duration,
) -> Result<Option<Vec<u8>>> {
    Ok(query(cert, issuer, timeout)?.map(|(body, _)| body))
}
