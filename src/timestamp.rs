//! RFC 3161 timestamp acquisition and verification.
//!
//! A [`TimestampClient`] posts a `TimeStampReq` to the configured authority
//! and validates the returned `TimeStampResp`: PKI status, echoed nonce and
//! message imprint all have to line up before the token is accepted.
//! [`verify_token`] re-checks a stored token against its payload without
//! any network access. Parsing a token always verifies the TSA signature
//! inside it against the embedded signing certificate.

use crate::error::{Error, Result};
use crate::types::{HashAlgorithm, TimestampSettings};
use base64::Engine;
use cmpv2::status::PkiStatus;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use const_oid::db::rfc5911::{ID_MESSAGE_DIGEST, ID_SIGNED_DATA};
use const_oid::ObjectIdentifier;
use der::asn1::{Int, OctetString};
use der::{Decode, Encode};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use spki::AlgorithmIdentifierOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use x509_tsp::{MessageImprint, TimeStampReq, TimeStampResp, TspVersion, TstInfo};

/// id-ct-TSTInfo
pub(crate) const ID_CT_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");

const MEDIA_TYPE_QUERY: &str = "application/timestamp-query";

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Replay-detection nonce: monotonic counter plus wall-clock nanos.
/// Uniqueness per process is what matters here, not unpredictability.
fn next_nonce() -> [u8; 16] {
    let count = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&count.to_be_bytes());
    bytes[8..].copy_from_slice(&nanos.to_be_bytes());
    // Keep the INTEGER positive
    bytes[0] &= 0x7f;
    bytes
}

fn altered(reason: impl ToString) -> Error {
    Error::TimestampAltered(reason.to_string())
}

/// An accepted timestamp token: raw ContentInfo bytes plus the parsed TSTInfo.
pub struct TimestampToken {
    der: Vec<u8>,
    tst_info: TstInfo,
}

impl TimestampToken {
    /// Parse a DER-encoded token (a `ContentInfo` carrying SignedData over
    /// TSTInfo) and verify the TSA signature inside it. Structural problems
    /// and failing signatures yield [`Error::TimestampAltered`].
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let tst_info = extract_tst_info(&der)?;
        Ok(Self { der, tst_info })
    }

    /// Raw token bytes, suitable for embedding as an unsigned attribute.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// Consume the token, returning its bytes.
    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    /// TSA generation time as seconds since the Unix epoch.
    pub fn gen_time_unix(&self) -> i64 {
        self.tst_info.gen_time.to_unix_duration().as_secs() as i64
    }

    /// Policy OID the TSA issued under.
    pub fn policy(&self) -> ObjectIdentifier {
        self.tst_info.policy
    }

    /// The digest the TSA signed over.
    pub fn imprint(&self) -> &[u8] {
        self.tst_info.message_imprint.hashed_message.as_bytes()
    }

    /// Hash algorithm the imprint was computed with, when recognized.
    pub fn imprint_algorithm(&self) -> Option<HashAlgorithm> {
        HashAlgorithm::from_oid(&self.tst_info.message_imprint.hash_algorithm.oid)
    }

    /// Echoed nonce, if the TSA returned one.
    pub fn nonce(&self) -> Option<&Int> {
        self.tst_info.nonce.as_ref()
    }

    /// DER encoding of the token's serial number.
    pub fn serial_der(&self) -> Result<Vec<u8>> {
        Ok(self.tst_info.serial_number.to_der()?)
    }
}

impl std::fmt::Debug for TimestampToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampToken")
            .field("der", &format!("{} bytes", self.der.len()))
            .field("gen_time_unix", &self.gen_time_unix())
            .field("policy", &self.policy())
            .finish()
    }
}

fn extract_tst_info(der: &[u8]) -> Result<TstInfo> {
    let content_info = ContentInfo::from_der(der).map_err(altered)?;
    if content_info.content_type != ID_SIGNED_DATA {
        return Err(altered("token is not a SignedData ContentInfo"));
    }
    let signed_data =
        SignedData::from_der(content_info.content.to_der()?.as_slice()).map_err(altered)?;
    if signed_data.encap_content_info.econtent_type != ID_CT_TST_INFO {
        return Err(altered("token content type is not TSTInfo"));
    }
    let econtent = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| altered("token carries no eContent"))?;
    let octets = OctetString::from_der(econtent.to_der()?.as_slice()).map_err(altered)?;
    verify_token_signature(&signed_data, octets.as_bytes())?;
    TstInfo::from_der(octets.as_bytes()).map_err(altered)
}

/// Check the TSA signature inside the token against the certificate the
/// token itself embeds. Anything short of a verifying signature over the
/// TSTInfo is treated as an altered token.
fn verify_token_signature(signed_data: &SignedData, tst_der: &[u8]) -> Result<()> {
    let signer = signed_data
        .signer_infos
        .0
        .get(0)
        .ok_or_else(|| altered("token carries no signer"))?;
    let digest_alg = HashAlgorithm::from_oid(&signer.digest_alg.oid).ok_or_else(|| {
        altered(format!("unsupported signer digest algorithm {}", signer.digest_alg.oid))
    })?;

    // With signed attributes the signature covers their SET OF encoding and
    // the message-digest attribute must bind them to the TSTInfo; without
    // them it covers the TSTInfo directly
    let message = match &signer.signed_attrs {
        Some(attrs) => {
            let bound = attrs
                .iter()
                .find(|attr| attr.oid == ID_MESSAGE_DIGEST)
                .and_then(|attr| attr.values.iter().next())
                .ok_or_else(|| altered("token signer lacks a message-digest attribute"))?;
            let octets = OctetString::from_der(bound.to_der()?.as_slice()).map_err(altered)?;
            if octets.as_bytes() != digest_alg.digest(tst_der).as_slice() {
                return Err(altered("message-digest attribute does not cover the TSTInfo"));
            }
            attrs.to_der()?
        },
        None => tst_der.to_vec(),
    };

    let key = signer_public_key(signed_data, signer)?;
    let hashed = digest_alg.digest(&message);
    let signature = signer.signature.as_bytes();
    let outcome = match digest_alg {
        HashAlgorithm::Sha1 => key.verify(Pkcs1v15Sign::new::<sha1::Sha1>(), &hashed, signature),
        HashAlgorithm::Sha256 => key.verify(Pkcs1v15Sign::new::<sha2::Sha256>(), &hashed, signature),
        HashAlgorithm::Sha384 => key.verify(Pkcs1v15Sign::new::<sha2::Sha384>(), &hashed, signature),
        HashAlgorithm::Sha512 => key.verify(Pkcs1v15Sign::new::<sha2::Sha512>(), &hashed, signature),
    };
    outcome.map_err(|_| altered("token signature does not verify"))
}

/// Locate the signer's certificate among those embedded in the token and
/// extract its RSA public key.
fn signer_public_key(signed_data: &SignedData, signer: &SignerInfo) -> Result<RsaPublicKey> {
    let certs = signed_data
        .certificates
        .as_ref()
        .ok_or_else(|| altered("token embeds no signing certificate"))?;
    for choice in certs.0.iter() {
        let cert = match choice {
            CertificateChoices::Certificate(cert) => cert,
            _ => continue,
        };
        let matches = match &signer.sid {
            SignerIdentifier::IssuerAndSerialNumber(ias) => {
                ias.issuer == cert.tbs_certificate.issuer
                    && ias.serial_number == cert.tbs_certificate.serial_number
            },
            // No issuer link to compare; accept any embedded certificate
            // whose key verifies
            SignerIdentifier::SubjectKeyIdentifier(_) => true,
        };
        if matches {
            let spki = cert.tbs_certificate.subject_public_key_info.to_der()?;
            return RsaPublicKey::from_public_key_der(&spki)
                .map_err(|e| altered(format!("token signer key unusable: {}", e)));
        }
    }
    Err(altered("token signing certificate not found"))
}

/// Outcome of re-verifying a stored token against a payload.
///
/// Damage to the token itself, including a TSA signature that fails
/// self-verification, surfaces as [`Error::TimestampAltered`] from
/// [`verify_token`]; a sound token over the wrong document comes back with
/// `imprint_matches == false`.
#[derive(Debug, Clone)]
pub struct TimestampVerification {
    /// TSA generation time as seconds since the Unix epoch
    pub gen_time_unix: i64,
    /// Policy OID the TSA issued under
    pub policy: ObjectIdentifier,
    /// DER encoding of the token serial number
    pub serial_der: Vec<u8>,
    /// Hash algorithm declared in the imprint
    pub algorithm: HashAlgorithm,
    /// Whether the payload digest matches the imprint
    pub imprint_matches: bool,
}

impl TimestampVerification {
    /// Whether the token fails to vouch for the payload.
    pub fn is_timestamp_altered(&self) -> bool {
        !self.imprint_matches
    }
}

/// Re-verify a stored token against `payload`, recomputing the digest under
/// the token's own declared algorithm.
pub fn verify_token(payload: &[u8], token_der: &[u8]) -> Result<TimestampVerification> {
    let token = TimestampToken::from_der(token_der.to_vec())?;
    let algorithm = token.imprint_algorithm().ok_or_else(|| {
        altered(format!(
            "unsupported imprint algorithm {}",
            token.tst_info.message_imprint.hash_algorithm.oid
        ))
    })?;
    let digest = algorithm.digest(payload);
    Ok(TimestampVerification {
        gen_time_unix: token.gen_time_unix(),
        policy: token.policy(),
        serial_der: token.serial_der()?,
        algorithm,
        imprint_matches: digest.as_slice() == token.imprint(),
    })
}

/// Client for one RFC 3161 timestamp authority.
pub struct TimestampClient {
    settings: TimestampSettings,
}

impl TimestampClient {
    /// Create a client from TSA settings.
    pub fn new(settings: TimestampSettings) -> Self {
        Self { settings }
    }

    /// Request a token over `digest`, computed with `hash`.
    pub fn request(&self, digest: &[u8], hash: HashAlgorithm) -> Result<TimestampToken> {
        let nonce = if self.settings.use_nonce {
            Some(Int::new(&next_nonce())?)
        } else {
            None
        };

        let ts_req = TimeStampReq {
            version: TspVersion::V1,
            message_imprint: MessageImprint {
                hash_algorithm: AlgorithmIdentifierOwned {
                    oid: hash.oid(),
                    parameters: None,
                },
                hashed_message: OctetString::new(digest.to_vec())?,
            },
            req_policy: self.settings.policy,
            nonce: nonce.clone(),
            cert_req: true,
            extensions: None,
        };

        let body = self.post(ts_req.to_der()?)?;
        let ts_resp = TimeStampResp::from_der(&body).map_err(|e| Error::MalformedResponse {
            source_kind: "timestamp authority",
            reason: e.to_string(),
        })?;
        check_status(&ts_resp)?;

        let token = ts_resp
            .time_stamp_token
            .as_ref()
            .ok_or_else(|| Error::TimestampRejected("granted response carries no token".to_string()))?;
        let token = TimestampToken::from_der(token.to_der()?)?;

        // The token must answer this exact request
        if token.imprint() != digest {
            return Err(altered("message imprint does not match the request"));
        }
        if let Some(expected) = &nonce {
            if token.nonce() != Some(expected) {
                return Err(altered("echoed nonce does not match the request"));
            }
        }
        log::debug!(
            "timestamp token granted by {} at {}",
            self.settings.url,
            token.gen_time_unix()
        );
        Ok(token)
    }

    fn post(&self, request_der: Vec<u8>) -> Result<Vec<u8>> {
        let mut builder = reqwest::blocking::Client::builder().timeout(self.settings.timeout);
        if let Some((pkcs12, password)) = &self.settings.client_identity {
            let identity = reqwest::Identity::from_pkcs12_der(pkcs12, password)
                .map_err(|e| Error::Http(e.to_string()))?;
            builder = builder.identity(identity);
        }
        let client = builder.build()?;

        let mut request = client
            .post(&self.settings.url)
            .header(CONTENT_TYPE, MEDIA_TYPE_QUERY)
            .body(request_der);
        if let (Some(user), Some(pass)) = (&self.settings.username, &self.settings.password) {
            let credentials =
                base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
            request = request.header(AUTHORIZATION, format!("Basic {}", credentials));
        }

        let response = request.send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

fn check_status(resp: &TimeStampResp<'_>) -> Result<()> {
    let info = &resp.status;
    let granted = matches!(info.status, PkiStatus::Accepted | PkiStatus::GrantedWithMods);
    if granted && info.fail_info.is_none() {
        return Ok(());
    }
    let mut detail = format!("{:?}", info.status);
    if let Some(text) = &info.status_string {
        detail.push_str(&format!(" ({:?})", text));
    }
    if let Some(fail) = &info.fail_info {
        detail.push_str(&format!(" [{:?}]", fail));
    }
    Err(Error::TimestampRejected(detail))
}
