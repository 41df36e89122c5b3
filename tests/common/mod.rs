//! Shared fixtures for integration tests.
//!
//! Certificates and CRLs are syntactically valid DER with placeholder
//! signature bits; the library does not verify certificate signatures.
//! Timestamp tokens are really signed, since the library checks the TSA
//! signature embedded in a token.

#![allow(dead_code)]

use const_oid::db::rfc5912::{RSA_ENCRYPTION, SHA_256_WITH_RSA_ENCRYPTION};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, GeneralizedTime, Int, OctetString};
use der::{Any, Decode, Encode};
use pades_oxide::HashAlgorithm;
use rsa::pkcs8::EncodePrivateKey;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};

/// Route library logs through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 2024-01-01T00:00:00Z
pub const NOT_BEFORE: i64 = 1_704_067_200;
/// 2025-12-31T00:00:00Z
pub const NOT_AFTER: i64 = 1_767_139_200;

fn general_time(unix: i64) -> Time {
    Time::GeneralTime(GeneralizedTime::from_unix_duration(Duration::from_secs(unix as u64)).unwrap())
}

fn rsa_sha256() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: SHA_256_WITH_RSA_ENCRYPTION,
        parameters: None,
    }
}

/// Build a DER certificate with the given subject, issuer and serial.
pub fn make_cert(subject: &str, issuer: &str, serial: &[u8]) -> Vec<u8> {
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(serial).unwrap(),
        signature: rsa_sha256(),
        issuer: Name::from_str(issuer).unwrap(),
        validity: Validity {
            not_before: general_time(NOT_BEFORE),
            not_after: general_time(NOT_AFTER),
        },
        subject: Name::from_str(subject).unwrap(),
        subject_public_key_info: SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: RSA_ENCRYPTION,
                parameters: None,
            },
            subject_public_key: BitString::from_bytes(&[0u8; 64]).unwrap(),
        },
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };

    let cert = Certificate {
        tbs_certificate: tbs,
        signature_algorithm: rsa_sha256(),
        signature: BitString::from_bytes(&[0u8; 64]).unwrap(),
    };
    cert.to_der().unwrap()
}

/// Like [`make_cert`], with a CRL distribution point extension.
pub fn make_cert_with_crl_url(subject: &str, issuer: &str, serial: &[u8], url: &str) -> Vec<u8> {
    use x509_cert::ext::pkix::crl::dp::DistributionPoint;
    use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
    use x509_cert::ext::pkix::CrlDistributionPoints;
    use x509_cert::ext::Extension;

    let dp = DistributionPoint {
        distribution_point: Some(DistributionPointName::FullName(vec![
            GeneralName::UniformResourceIdentifier(der::asn1::Ia5String::new(url).unwrap()),
        ])),
        reasons: None,
        crl_issuer: None,
    };
    let extension = Extension {
        extn_id: const_oid::db::rfc5912::ID_CE_CRL_DISTRIBUTION_POINTS,
        critical: false,
        extn_value: OctetString::new(CrlDistributionPoints(vec![dp]).to_der().unwrap()).unwrap(),
    };

    let mut cert = Certificate::from_der(&make_cert(subject, issuer, serial)).unwrap();
    cert.tbs_certificate.extensions = Some(vec![extension]);
    cert.to_der().unwrap()
}

/// Build a DER CRL issued by `issuer` revoking the given serials.
pub fn make_crl(issuer: &str, revoked_serials: &[&[u8]]) -> Vec<u8> {
    let revoked: Vec<RevokedCert> = revoked_serials
        .iter()
        .map(|serial| RevokedCert {
            serial_number: SerialNumber::new(serial).unwrap(),
            revocation_date: general_time(NOT_BEFORE),
            crl_entry_extensions: None,
        })
        .collect();

    let tbs = TbsCertList {
        version: Version::V2,
        signature: rsa_sha256(),
        issuer: Name::from_str(issuer).unwrap(),
        this_update: general_time(NOT_BEFORE),
        next_update: Some(general_time(NOT_AFTER)),
        revoked_certificates: if revoked.is_empty() { None } else { Some(revoked) },
        crl_extensions: None,
    };

    let crl = CertificateList {
        tbs_cert_list: tbs,
        signature_algorithm: rsa_sha256(),
        signature: BitString::from_bytes(&[0u8; 64]).unwrap(),
    };
    crl.to_der().unwrap()
}

/// Generation time baked into fabricated tokens: 2024-06-01T00:00:00Z.
pub const TOKEN_GEN_TIME: u64 = 1_717_200_000;

/// Fabricate a signed RFC 3161 token over `imprint` declared under `alg`.
///
/// Signed with the fixture RSA key and carrying a TSA certificate with the
/// matching public key, so the token passes self-verification.
pub fn make_timestamp_token(imprint: &[u8], alg: HashAlgorithm) -> Vec<u8> {
    use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
    use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
    use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
    use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
    use x509_tsp::{MessageImprint, TspVersion, TstInfo};

    let id_ct_tst_info = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");
    let tst_info = TstInfo {
        version: TspVersion::V1,
        policy: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1"),
        message_imprint: MessageImprint {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: alg.oid(),
                parameters: None,
            },
            hashed_message: OctetString::new(imprint.to_vec()).unwrap(),
        },
        serial_number: Int::new(&[0x2a]).unwrap(),
        gen_time: GeneralizedTime::from_unix_duration(Duration::from_secs(TOKEN_GEN_TIME)).unwrap(),
        accuracy: None,
        ordering: false,
        nonce: None,
        tsa: None,
        extensions: None,
    };

    let econtent_der = OctetString::new(tst_info.to_der().unwrap())
        .unwrap()
        .to_der()
        .unwrap();
    let encap = EncapsulatedContentInfo {
        econtent_type: id_ct_tst_info,
        econtent: Some(Any::from_der(&econtent_der).unwrap()),
    };

    let key = rsa::RsaPrivateKey::from_pkcs8_der(&make_rsa_key_pkcs8()).unwrap();
    let spki_der = key.to_public_key().to_public_key_der().unwrap();
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[9]).unwrap(),
        signature: rsa_sha256(),
        issuer: Name::from_str("CN=Fixture TSA").unwrap(),
        validity: Validity {
            not_before: general_time(NOT_BEFORE),
            not_after: general_time(NOT_AFTER),
        },
        subject: Name::from_str("CN=Fixture TSA").unwrap(),
        subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes()).unwrap(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    let tsa_cert = Certificate {
        tbs_certificate: tbs,
        signature_algorithm: rsa_sha256(),
        signature: BitString::from_bytes(&[0u8; 64]).unwrap(),
    };

    let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: tsa_cert.tbs_certificate.issuer.clone(),
        serial_number: tsa_cert.tbs_certificate.serial_number.clone(),
    });
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: HashAlgorithm::Sha256.oid(),
        parameters: None,
    };
    let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(key);
    let signer_info =
        SignerInfoBuilder::new(&signing_key, sid, digest_algorithm.clone(), &encap, None).unwrap();

    let mut builder = SignedDataBuilder::new(&encap);
    builder.add_digest_algorithm(digest_algorithm).unwrap();
    builder
        .add_certificate(CertificateChoices::Certificate(tsa_cert))
        .unwrap();
    let content_info = builder
        .add_signer_info::<rsa::pkcs1v15::SigningKey<sha2::Sha256>, rsa::pkcs1v15::Signature>(
            signer_info,
        )
        .unwrap()
        .build()
        .unwrap();
    content_info.to_der().unwrap()
}

/// PKCS#8 DER encoding of a freshly generated RSA key, cached per process.
pub fn make_rsa_key_pkcs8() -> Vec<u8> {
    static KEY: OnceLock<Vec<u8>> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        key.to_pkcs8_der().unwrap().as_bytes().to_vec()
    })
    .clone()
}

/// Extract the hex-decoded /Contents value from a signed document.
pub fn extract_envelope(doc: &[u8], byte_range: &[i64; 4]) -> Vec<u8> {
    let start = byte_range[1] as usize;
    let end = byte_range[2] as usize;
    let slot = &doc[start..end];
    assert_eq!(slot[0], b'<');
    assert_eq!(slot[slot.len() - 1], b'>');

    let hex: Vec<u8> = slot[1..slot.len() - 1].to_vec();
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks(2) {
        let s = std::str::from_utf8(pair).unwrap();
        bytes.push(u8::from_str_radix(s, 16).unwrap());
    }

    // Strip the zero padding behind the DER value: the outer SEQUENCE header
    // says how long the real envelope is
    let (value_len, header_len) = match bytes[1] {
        n if n < 0x80 => (n as usize, 2),
        0x81 => (bytes[2] as usize, 3),
        0x82 => (((bytes[2] as usize) << 8) | bytes[3] as usize, 4),
        0x83 => (
            ((bytes[2] as usize) << 16) | ((bytes[3] as usize) << 8) | bytes[4] as usize,
            5,
        ),
        other => panic!("unexpected DER length byte {:#04x}", other),
    };
    bytes.truncate(header_len + value_len);
    bytes
}
