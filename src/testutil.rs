//! Test-only builders for certificates, CRLs and timestamp tokens.
//!
//! Certificates and CRLs carry placeholder signature bits; nothing in this
//! library verifies them, so fixtures do not need a real CA. Timestamp
//! tokens are the exception: their inner TSA signature is checked on parse,
//! so [`make_timestamp_token`] really signs with the fixture RSA key.

use crate::timestamp::ID_CT_TST_INFO;
use crate::types::HashAlgorithm;
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    DigestAlgorithmIdentifiers, EncapsulatedContentInfo, SignedData, SignerInfo, SignerInfos,
};
use const_oid::db::rfc5911::ID_SIGNED_DATA;
use const_oid::db::rfc5912::{
    ID_AD_OCSP, ID_CE_CRL_DISTRIBUTION_POINTS, ID_PE_AUTHORITY_INFO_ACCESS, RSA_ENCRYPTION,
    SHA_256_WITH_RSA_ENCRYPTION,
};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, GeneralizedTime, Ia5String, Int, OctetString};
use der::{Any, AnyRef, Decode, Encode};
use rsa::pkcs8::EncodePrivateKey;
use std::sync::OnceLock;
use x509_tsp::{MessageImprint, TspVersion, TstInfo};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::str::FromStr;
use std::time::Duration;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::crl::dp::DistributionPoint;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::{AccessDescription, AuthorityInfoAccessSyntax, CrlDistributionPoints};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};

/// 2024-01-01T00:00:00Z
pub const DEFAULT_NOT_BEFORE: i64 = 1_704_067_200;
/// 2025-12-31T00:00:00Z
pub const DEFAULT_NOT_AFTER: i64 = 1_767_139_200;

/// Knobs for [`make_cert`].
pub struct TestCertExt {
    pub crl_url: Option<String>,
    pub ldap_crl_url: Option<String>,
    pub ocsp_url: Option<String>,
    pub not_before: i64,
    pub not_after: i64,
}

impl Default for TestCertExt {
    fn default() -> Self {
        Self {
            crl_url: None,
            ldap_crl_url: None,
            ocsp_url: None,
            not_before: DEFAULT_NOT_BEFORE,
            not_after: DEFAULT_NOT_AFTER,
        }
    }
}

fn general_time(unix: i64) -> Time {
    Time::GeneralTime(GeneralizedTime::from_unix_duration(Duration::from_secs(unix as u64)).unwrap())
}

fn rsa_sha256() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: SHA_256_WITH_RSA_ENCRYPTION,
        parameters: None,
    }
}

fn uri(url: &str) -> GeneralName {
    GeneralName::UniformResourceIdentifier(Ia5String::new(url).unwrap())
}

/// Build a DER certificate with the given subject, issuer and serial.
pub fn make_cert(
    subject: &str,
    issuer: &str,
    serial: &[u8],
    configure: impl FnOnce(&mut TestCertExt),
) -> Vec<u8> {
    let mut opts = TestCertExt::default();
    configure(&mut opts);

    let mut extensions: Vec<Extension> = Vec::new();

    let mut dps: Vec<DistributionPoint> = Vec::new();
    for url in [opts.crl_url.as_deref(), opts.ldap_crl_url.as_deref()].into_iter().flatten() {
        dps.push(DistributionPoint {
            distribution_point: Some(DistributionPointName::FullName(vec![uri(url)])),
            reasons: None,
            crl_issuer: None,
        });
    }
    if !dps.is_empty() {
        extensions.push(Extension {
            extn_id: ID_CE_CRL_DISTRIBUTION_POINTS,
            critical: false,
            extn_value: OctetString::new(CrlDistributionPoints(dps).to_der().unwrap()).unwrap(),
        });
    }

    if let Some(url) = opts.ocsp_url.as_deref() {
        let aia = AuthorityInfoAccessSyntax(vec![AccessDescription {
            access_method: ID_AD_OCSP,
            access_location: uri(url),
        }]);
        extensions.push(Extension {
            extn_id: ID_PE_AUTHORITY_INFO_ACCESS,
            critical: false,
            extn_value: OctetString::new(aia.to_der().unwrap()).unwrap(),
        });
    }

    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(serial).unwrap(),
        signature: rsa_sha256(),
        issuer: Name::from_str(issuer).unwrap(),
        validity: Validity {
            not_before: general_time(opts.not_before),
            not_after: general_time(opts.not_after),
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
        extensions: if extensions.is_empty() { None } else { Some(extensions) },
    };

    let cert = Certificate {
        tbs_certificate: tbs,
        signature_algorithm: rsa_sha256(),
        signature: BitString::from_bytes(&[0u8; 64]).unwrap(),
    };
    cert.to_der().unwrap()
}

/// Build a DER CRL issued by `issuer` revoking the given serials.
pub fn make_crl(issuer: &str, revoked_serials: &[&[u8]]) -> Vec<u8> {
    let revoked: Vec<RevokedCert> = revoked_serials
        .iter()
        .map(|serial| RevokedCert {
            serial_number: SerialNumber::new(serial).unwrap(),
            revocation_date: general_time(DEFAULT_NOT_BEFORE),
            crl_entry_extensions: None,
        })
        .collect();

    let tbs = TbsCertList {
        version: Version::V2,
        signature: rsa_sha256(),
        issuer: Name::from_str(issuer).unwrap(),
        this_update: general_time(DEFAULT_NOT_BEFORE),
        next_update: Some(general_time(DEFAULT_NOT_AFTER)),
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

/// Policy OID baked into fabricated tokens.
pub const TOKEN_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1");

fn make_tst_info(imprint: &[u8], alg: HashAlgorithm) -> TstInfo {
    TstInfo {
        version: TspVersion::V1,
        policy: TOKEN_POLICY,
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
    }
}

/// Self-issued TSA certificate carrying the real public half of the fixture
/// RSA key, so fabricated token signatures verify against it.
fn make_tsa_cert(key: &rsa::RsaPrivateKey) -> Certificate {
    use rsa::pkcs8::EncodePublicKey;

    let spki_der = key.to_public_key().to_public_key_der().unwrap();
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[9]).unwrap(),
        signature: rsa_sha256(),
        issuer: Name::from_str("CN=Fixture TSA").unwrap(),
        validity: Validity {
            not_before: general_time(DEFAULT_NOT_BEFORE),
            not_after: general_time(DEFAULT_NOT_AFTER),
        },
        subject: Name::from_str("CN=Fixture TSA").unwrap(),
        subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes()).unwrap(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    Certificate {
        tbs_certificate: tbs,
        signature_algorithm: rsa_sha256(),
        signature: BitString::from_bytes(&[0u8; 64]).unwrap(),
    }
}

/// Fabricate a signed RFC 3161 token over `imprint` declared under `alg`.
///
/// The SignedData is signed with the fixture RSA key over SHA-256 signed
/// attributes and embeds a TSA certificate carrying the matching public key,
/// so the token passes self-verification.
pub fn make_timestamp_token(imprint: &[u8], alg: HashAlgorithm) -> Vec<u8> {
    use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
    use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
    use cms::signed_data::SignerIdentifier;
    use rsa::pkcs8::DecodePrivateKey;

    let econtent_der = OctetString::new(make_tst_info(imprint, alg).to_der().unwrap())
        .unwrap()
        .to_der()
        .unwrap();
    let encap = EncapsulatedContentInfo {
        econtent_type: ID_CT_TST_INFO,
        econtent: Some(Any::from_der(&econtent_der).unwrap()),
    };

    let key = rsa::RsaPrivateKey::from_pkcs8_der(&make_rsa_key_pkcs8()).unwrap();
    let tsa_cert = make_tsa_cert(&key);
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

/// Fabricate a token whose SignedData carries no signer at all. Token
/// verification must refuse to vouch for these.
pub fn make_unsigned_timestamp_token(imprint: &[u8], alg: HashAlgorithm) -> Vec<u8> {
    let econtent_der = OctetString::new(make_tst_info(imprint, alg).to_der().unwrap())
        .unwrap()
        .to_der()
        .unwrap();
    let signed_data = SignedData {
        version: CmsVersion::V3,
        digest_algorithms: DigestAlgorithmIdentifiers::try_from(vec![AlgorithmIdentifierOwned {
            oid: alg.oid(),
            parameters: None,
        }])
        .unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_CT_TST_INFO,
            econtent: Some(Any::from_der(&econtent_der).unwrap()),
        },
        certificates: None,
        crls: None,
        signer_infos: SignerInfos::try_from(Vec::<SignerInfo>::new()).unwrap(),
    };

    let signed_data_der = signed_data.to_der().unwrap();
    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::from(AnyRef::try_from(signed_data_der.as_slice()).unwrap()),
    };
    content_info.to_der().unwrap()
}

/// PKCS#8 DER encoding of a freshly generated RSA key, cached per process
/// because key generation dominates test time otherwise.
pub fn make_rsa_key_pkcs8() -> Vec<u8> {
    static KEY: OnceLock<Vec<u8>> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        key.to_pkcs8_der().unwrap().as_bytes().to_vec()
    })
    .clone()
}
