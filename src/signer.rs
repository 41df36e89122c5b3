//! Document signing orchestration.
//!
//! [`DocumentSigner`] runs the whole pipeline: resolve the signing chain,
//! collect revocation evidence, reserve the byte-range placeholder, digest
//! the signed ranges, assemble the envelope, optionally timestamp it, and
//! commit the result back into the reserved slot. The document length never
//! changes after reservation.

use crate::byterange::{estimate_reserved_size, prepare_document};
use crate::chain::{Certificate, CertificateChain, ChainResolver};
use crate::envelope::{attach_timestamp_token, signature_value_of, EnvelopeBuilder};
use crate::error::{Error, Result};
use crate::revocation::RevocationChecker;
use crate::timestamp::TimestampClient;
use crate::types::{SignOptions, SigningCredentials};
use chrono::Utc;
use pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;

/// Extra placeholder room when a timestamp token will be attached.
const TIMESTAMP_ALLOWANCE: usize = 6144;

/// Summary of a completed signing operation.
#[derive(Debug, Clone)]
pub struct SigningReport {
    /// ByteRange committed into the document
    pub byte_range: [i64; 4],
    /// Bytes reserved for the signature value
    pub reserved_size: usize,
    /// Actual envelope size in bytes
    pub envelope_len: usize,
    /// Certificates in the embedded chain
    pub chain_len: usize,
    /// Whether a timestamp token was attached
    pub timestamped: bool,
    /// CRLs embedded as revocation evidence
    pub embedded_crls: usize,
    /// OCSP responses embedded as revocation evidence
    pub embedded_ocsp_responses: usize,
}

/// Signs documents with a fixed set of credentials and options.
pub struct DocumentSigner {
    credentials: SigningCredentials,
    options: SignOptions,
    checker: RevocationChecker,
}

impl DocumentSigner {
    /// Create a signer; revocation checking uses default settings unless
    /// overridden with [`DocumentSigner::with_revocation_checker`].
    pub fn new(credentials: SigningCredentials, options: SignOptions) -> Self {
        Self {
            credentials,
            options,
            checker: RevocationChecker::new(),
        }
    }

    /// Replace the revocation checker used for evidence collection.
    pub fn with_revocation_checker(mut self, checker: RevocationChecker) -> Self {
        self.checker = checker;
        self
    }

    /// The options this signer was built with.
    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    /// Sign `document` in place, appending the signature container and
    /// committing the envelope into its placeholder.
    ///
    /// On failure the document is restored to its original content, so a
    /// caller can retry without accumulating half-built containers.
    pub fn sign(&mut self, document: &mut Vec<u8>) -> Result<SigningReport> {
        if document.is_empty() {
            return Err(Error::DocumentNotLoaded);
        }
        if self.credentials.certificate.is_empty() {
            return Err(Error::CertificateNotSet);
        }

        let chain = self.resolve_chain()?;
        let (crls, ocsp_responses) = self.collect_evidence(&chain);

        // Everything past this point appends to or edits the appended
        // container only, so truncating undoes a failed attempt
        let original_len = document.len();
        let result = self.reserve_and_commit(document, &chain, crls, ocsp_responses);
        if result.is_err() {
            document.truncate(original_len);
        }
        result
    }

    fn reserve_and_commit(
        &self,
        document: &mut Vec<u8>,
        chain: &CertificateChain,
        crls: Vec<Vec<u8>>,
        ocsp_responses: Vec<Vec<u8>>,
    ) -> Result<SigningReport> {
        let reserved = self.reserved_size(chain, &crls, &ocsp_responses)?;
        let fields = self.signature_fields();
        let reservation = prepare_document(document, &fields, reserved)?;

        let signed = reservation.signed_bytes(document)?;
        let digest = self.options.hash_algorithm.digest(&signed);

        let mut builder = EnvelopeBuilder::new(
            chain,
            &self.credentials.private_key,
            self.options.hash_algorithm,
        );
        for crl in crls.iter().cloned() {
            builder.add_crl(crl);
        }
        for resp in ocsp_responses.iter().cloned() {
            builder.add_ocsp_response(resp);
        }
        let mut envelope = builder.build(&digest)?;

        let mut timestamped = false;
        if let Some(settings) = &self.options.timestamp {
            let signature_value = signature_value_of(&envelope)?;
            let imprint = self.options.hash_algorithm.digest(&signature_value);
            let client = TimestampClient::new(settings.clone());
            let token = client.request(&imprint, self.options.hash_algorithm)?;
            envelope = attach_timestamp_token(&envelope, token.as_der())?;
            timestamped = true;
        }

        let byte_range = reservation.byte_range();
        let reserved_size = reservation.reserved_size();
        let envelope_len = envelope.len();
        reservation.commit(document, &envelope)?;

        log::info!(
            "signed document: {} byte envelope in {} byte slot, chain of {}",
            envelope_len,
            reserved_size,
            chain.len()
        );
        Ok(SigningReport {
            byte_range,
            reserved_size,
            envelope_len,
            chain_len: chain.len(),
            timestamped,
            embedded_crls: crls.len(),
            embedded_ocsp_responses: ocsp_responses.len(),
        })
    }

    /// Resolve leaf-to-root from the configured candidates. An incomplete
    /// chain falls back to embedding the leaf alone.
    fn resolve_chain(&self) -> Result<CertificateChain> {
        let leaf = Certificate::from_der(self.credentials.certificate.clone())?;
        let mut candidates = Vec::with_capacity(self.credentials.chain.len());
        for der in &self.credentials.chain {
            candidates.push(Certificate::from_der(der.clone())?);
        }
        match ChainResolver::new(&candidates).resolve(&leaf) {
            Some(chain) => Ok(chain),
            None => {
                log::debug!("chain resolution incomplete; embedding leaf only");
                CertificateChain::from_certs(vec![leaf])
            },
        }
    }

    /// Collect revocation evidence per the configured LTV level. Fetch
    /// failures degrade to less evidence, not to a failed signature.
    fn collect_evidence(&mut self, chain: &CertificateChain) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let mut crls = Vec::new();
        let mut ocsp_responses = Vec::new();

        if self.options.ltv.wants_crl() {
            for cert in chain.iter() {
                match self.checker.fetch_crl_evidence(cert) {
                    Ok(Some(der)) => crls.push(der),
                    Ok(None) => {},
                    Err(e) => log::warn!("CRL evidence unavailable: {}", e),
                }
            }
        }

        if self.options.ltv.wants_ocsp() {
            let certs: Vec<_> = chain.iter().collect();
            for pair in certs.windows(2) {
                match self.checker.fetch_ocsp_evidence(pair[0], pair[1]) {
                    Ok(Some(der)) => ocsp_responses.push(der),
                    Ok(None) => {},
                    Err(e) => log::warn!("OCSP evidence unavailable: {}", e),
                }
            }
        }

        (crls, ocsp_responses)
    }

    fn reserved_size(
        &self,
        chain: &CertificateChain,
        crls: &[Vec<u8>],
        ocsp_responses: &[Vec<u8>],
    ) -> Result<usize> {
        let key = RsaPrivateKey::from_pkcs8_der(&self.credentials.private_key)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let key_bits = key.size() * 8;

        let blob_sizes: Vec<usize> = crls
            .iter()
            .chain(ocsp_responses.iter())
            .map(|b| b.len())
            .collect();
        let mut estimate = estimate_reserved_size(
            self.options.hash_algorithm,
            key_bits,
            chain.total_der_len(),
            &blob_sizes,
        );
        if self.options.timestamp.is_some() {
            estimate += TIMESTAMP_ALLOWANCE;
        }
        Ok(estimate.max(self.options.estimated_size))
    }

    /// Container entries as newline-terminated lines, ready for
    /// [`prepare_document`].
    fn signature_fields(&self) -> String {
        let mut fields = String::new();
        fields.push_str("/Type /Sig\n");
        fields.push_str("/Filter /Adobe.PPKLite\n");
        fields.push_str(&format!("/SubFilter /{}\n", self.options.standard.sub_filter_name()));
        fields.push_str(&format!(
            "/M (D:{}Z)\n",
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        if let Some(reason) = &self.options.reason {
            fields.push_str(&format!("/Reason ({})\n", escape_text(reason)));
        }
        if let Some(location) = &self.options.location {
            fields.push_str(&format!("/Location ({})\n", escape_text(location)));
        }
        if let Some(contact) = &self.options.contact_info {
            fields.push_str(&format!("/ContactInfo ({})\n", escape_text(contact)));
        }
        if let Some(name) = &self.options.name {
            fields.push_str(&format!("/Name ({})\n", escape_text(name)));
        }
        fields
    }
}

/// Escape characters that would break a literal string value.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
