//! CMS SignedData envelope assembly and timestamp attachment.
//!
//! The envelope is always detached: `eContent` stays empty and the document
//! digest is passed to the signer as an external message digest. Revocation
//! evidence rides in the `crls` field, CRLs directly and OCSP responses
//! wrapped in `OtherRevocationInfoFormat`, which is what long-term validation
//! consumers expect to find.

use crate::chain::CertificateChain;
use crate::error::{Error, Result};
use crate::types::HashAlgorithm;
use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::ContentInfo;
use cms::revocation::{OtherRevocationInfoFormat, RevocationInfoChoice};
use cms::signed_data::{
    EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfos, UnsignedAttributes,
};
use const_oid::db::rfc5911::{ID_DATA, ID_SIGNED_DATA};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::asn1::SetOfVec;
use der::{Any, AnyRef, Decode, Encode};
use pkcs8::DecodePrivateKey;
use rsa::pkcs1v15::RsaSignatureAssociatedOid;
use rsa::RsaPrivateKey;
use sha2::digest::Digest;
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::crl::CertificateList;

/// id-aa-timeStampToken, RFC 3161 appendix A
pub(crate) const ID_AA_TIME_STAMP_TOKEN: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.14");

/// id-ri-ocsp-response, RFC 5940
const ID_RI_OCSP_RESPONSE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.16.2");

fn envelope_err(e: impl std::fmt::Display) -> Error {
    Error::Envelope(e.to_string())
}

/// Assembles a detached SignedData envelope over an externally computed
/// document digest.
pub struct EnvelopeBuilder<'a> {
    chain: &'a CertificateChain,
    private_key_der: &'a [u8],
    hash: HashAlgorithm,
    crls: Vec<Vec<u8>>,
    ocsp_responses: Vec<Vec<u8>>,
}

impl<'a> EnvelopeBuilder<'a> {
    /// Builder over a resolved chain and a PKCS#8 DER private key.
    pub fn new(chain: &'a CertificateChain, private_key_der: &'a [u8], hash: HashAlgorithm) -> Self {
        Self {
            chain,
            private_key_der,
            hash,
            crls: Vec::new(),
            ocsp_responses: Vec::new(),
        }
    }

    /// Embed a DER CRL as revocation evidence.
    pub fn add_crl(&mut self, der: Vec<u8>) -> &mut Self {
        self.crls.push(der);
        self
    }

    /// Embed a DER OCSP response as revocation evidence.
    pub fn add_ocsp_response(&mut self, der: Vec<u8>) -> &mut Self {
        self.ocsp_responses.push(der);
        self
    }

    /// Produce the DER `ContentInfo` for `digest`, which must have been
    /// computed with the configured hash algorithm.
    pub fn build(&self, digest: &[u8]) -> Result<Vec<u8>> {
        if digest.len() != self.hash.digest_len() {
            return Err(Error::Envelope(format!(
                "digest length {} does not match {}",
                digest.len(),
                self.hash.name()
            )));
        }
        let key = RsaPrivateKey::from_pkcs8_der(self.private_key_der)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        match self.hash {
            HashAlgorithm::Sha1 => self.build_with::<sha1::Sha1>(key, digest),
            HashAlgorithm::Sha256 => self.build_with::<sha2::Sha256>(key, digest),
            HashAlgorithm::Sha384 => self.build_with::<sha2::Sha384>(key, digest),
            HashAlgorithm::Sha512 => self.build_with::<sha2::Sha512>(key, digest),
        }
    }

    /// The signer is identified by issuer and serial of the leaf certificate.
    fn signer_identifier(&self) -> Result<SignerIdentifier> {
        let leaf = x509_cert::Certificate::from_der(self.chain.leaf().as_der())
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        Ok(SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: leaf.tbs_certificate.issuer,
            serial_number: leaf.tbs_certificate.serial_number,
        }))
    }

    fn build_with<D>(&self, key: RsaPrivateKey, digest: &[u8]) -> Result<Vec<u8>>
    where
        D: Digest + AssociatedOid + RsaSignatureAssociatedOid,
    {
        let signing_key = rsa::pkcs1v15::SigningKey::<D>::new(key);
        let digest_algorithm = AlgorithmIdentifierOwned {
            oid: self.hash.oid(),
            parameters: None,
        };
        let encap = EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        };

        let signer_info = SignerInfoBuilder::new(
            &signing_key,
            self.signer_identifier()?,
            digest_algorithm.clone(),
            &encap,
            Some(digest),
        )
        .map_err(envelope_err)?;

        let mut builder = SignedDataBuilder::new(&encap);
        builder.add_digest_algorithm(digest_algorithm).map_err(envelope_err)?;
        for cert in self.chain.iter() {
            let parsed = x509_cert::Certificate::from_der(cert.as_der())
                .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
            builder
                .add_certificate(CertificateChoices::Certificate(parsed))
                .map_err(envelope_err)?;
        }
        for crl_der in &self.crls {
            let crl = CertificateList::from_der(crl_der)?;
            builder
                .add_crl(RevocationInfoChoice::Crl(crl))
                .map_err(envelope_err)?;
        }
        for ocsp_der in &self.ocsp_responses {
            builder
                .add_crl(RevocationInfoChoice::Other(OtherRevocationInfoFormat {
                    other_format: AlgorithmIdentifierOwned {
                        oid: ID_RI_OCSP_RESPONSE,
                        parameters: None,
                    },
                    other: Any::from_der(ocsp_der)?,
                }))
                .map_err(envelope_err)?;
        }

        let content_info = builder
            .add_signer_info::<rsa::pkcs1v15::SigningKey<D>, rsa::pkcs1v15::Signature>(signer_info)
            .map_err(envelope_err)?
            .build()
            .map_err(envelope_err)?;
        Ok(content_info.to_der()?)
    }
}

fn decode_signed_data(envelope_der: &[u8]) -> Result<SignedData> {
    let content_info = ContentInfo::from_der(envelope_der)?;
    if content_info.content_type != ID_SIGNED_DATA {
        return Err(Error::Envelope(format!(
            "not a SignedData envelope: {}",
            content_info.content_type
        )));
    }
    Ok(SignedData::from_der(content_info.content.to_der()?.as_slice())?)
}

fn encode_signed_data(signed_data: &SignedData) -> Result<Vec<u8>> {
    let signed_data_der = signed_data.to_der()?;
    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::from(AnyRef::try_from(signed_data_der.as_slice())?),
    };
    Ok(content_info.to_der()?)
}

/// Attach an RFC 3161 token to the envelope's single signer as the
/// timeStampToken unsigned attribute, returning the re-encoded envelope.
pub fn attach_timestamp_token(envelope_der: &[u8], token_der: &[u8]) -> Result<Vec<u8>> {
    let mut signed_data = decode_signed_data(envelope_der)?;

    let mut signer_infos: Vec<_> = signed_data.signer_infos.0.into_vec();
    let signer = match signer_infos.len() {
        1 => &mut signer_infos[0],
        n => return Err(Error::Envelope(format!("expected one signer, found {}", n))),
    };

    let mut values = SetOfVec::new();
    values.insert(Any::from_der(token_der)?)?;
    let attribute = Attribute {
        oid: ID_AA_TIME_STAMP_TOKEN,
        values,
    };

    let mut attributes: Vec<Attribute> = signer
        .unsigned_attrs
        .take()
        .map(|attrs| attrs.iter().cloned().collect())
        .unwrap_or_default();
    attributes.push(attribute);
    signer.unsigned_attrs =
        Some(UnsignedAttributes::try_from(attributes).map_err(envelope_err)?);

    signed_data.signer_infos = SignerInfos::try_from(signer_infos).map_err(envelope_err)?;
    encode_signed_data(&signed_data)
}

/// The signature value of the envelope's single signer. This is the payload
/// an RFC 3161 signature timestamp covers.
pub fn signature_value_of(envelope_der: &[u8]) -> Result<Vec<u8>> {
    let signed_data = decode_signed_data(envelope_der)?;
    let signer = signed_data
        .signer_infos
        .0
        .get(0)
        .ok_or_else(|| Error::Envelope("envelope has no signer".to_string()))?;
    Ok(signer.signature.as_bytes().to_vec())
}

/// Extract the timeStampToken attribute from the envelope's single signer,
/// if one is attached.
pub fn timestamp_token_of(envelope_der: &[u8]) -> Result<Option<Vec<u8>>> {
    let signed_data = decode_signed_data(envelope_der)?;
    for signer in signed_data.signer_infos.0.iter() {
        let attrs = match &signer.unsigned_attrs {
            Some(attrs) => attrs,
            None => continue,
        };
        for attr in attrs.iter() {
            if attr.oid == ID_AA_TIME_STAMP_TOKEN {
                if let Some(value) = attr.values.iter().next() {
                    return Ok(Some(value.to_der()?));
                }
            }
        }
    }
    Ok(None)
}
