//! CMS SignedData for detached PDF signatures.
//!
//! Signing produces a `ContentInfo` wrapping a SignedData with no
//! encapsulated content, one SignerInfo identified by issuer and serial
//! number, and the signed attributes content-type, signing-time and
//! message-digest. Parsing is tolerant: optional pieces that cannot be read
//! are left as `None`.

use super::types::DigestAlgorithm;
use crate::credentials::Credential;
use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use cms::cert::x509::attr::{Attribute, Attributes};
use cms::cert::x509::time::Time;
use cms::cert::x509::Certificate as X509Certificate;
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData as CmsSignedData, SignerIdentifier,
    SignerInfo as CmsSignerInfo, SignerInfos,
};
use der::asn1::{Any, GeneralizedTime, OctetString, SetOfVec, UtcTime};
use der::oid::db::{rfc5911, rfc5912};
use der::oid::ObjectIdentifier;
use der::{Decode, Encode, SliceReader};
use pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use spki::AlgorithmIdentifierOwned;
use std::time::Duration;

/// id-aa-timeStampToken, 1.2.840.113549.1.9.16.2.14
pub const ID_AA_TIME_STAMP_TOKEN: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.14");

/// RSA PKCS#1 v1.5 over `message` hashed with `digest`.
pub fn rsa_sign(key: &RsaPrivateKey, digest: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>> {
    let hashed = digest.digest(message);
    key.sign(pkcs1v15_scheme(digest), &hashed)
        .map_err(|e| Error::Crypto(format!("RSA signing failed: {}", e)))
}

/// Verify an RSA PKCS#1 v1.5 signature with a PKCS#1 `RSAPublicKey`.
pub fn rsa_verify(
    public_key_pkcs1: &[u8],
    digest: DigestAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let key = RsaPublicKey::from_pkcs1_der(public_key_pkcs1)
        .map_err(|e| Error::Crypto(format!("invalid RSA public key: {}", e)))?;
    let hashed = digest.digest(message);
    Ok(key.verify(pkcs1v15_scheme(digest), &hashed, signature).is_ok())
}

fn pkcs1v15_scheme(digest: DigestAlgorithm) -> Pkcs1v15Sign {
    match digest {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

fn algorithm(oid: ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: Some(Any::null()),
    }
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

/// UTCTime through 2049, GeneralizedTime after.
fn time_value(at: &DateTime<Utc>) -> Result<Any> {
    let since_epoch = u64::try_from(at.timestamp())
        .map(Duration::from_secs)
        .map_err(|_| Error::Der(format!("signing time {} precedes 1970", at)))?;
    match UtcTime::from_unix_duration(since_epoch) {
        Ok(utc) => Ok(Any::encode_from(&utc)?),
        Err(_) => Ok(Any::encode_from(&GeneralizedTime::from_unix_duration(since_epoch)?)?),
    }
}

fn time_from_any(value: &Any) -> Result<DateTime<Utc>> {
    let time = Time::from_der(&value.to_der()?)?;
    let seconds = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|_| Error::Der(format!("time {} out of range", time)))?;
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| Error::Der(format!("time {} out of range", time)))
}

/// The `SET OF Attribute` holding content-type, signing-time and
/// message-digest. Its DER encoding is what the signature covers.
pub fn signed_attributes(message_digest: &[u8], signing_time: &DateTime<Utc>) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    attributes.insert(attribute(rfc5911::ID_CONTENT_TYPE, Any::encode_from(&rfc5911::ID_DATA)?)?)?;
    attributes.insert(attribute(rfc5911::ID_SIGNING_TIME, time_value(signing_time)?)?)?;
    attributes.insert(attribute(
        rfc5911::ID_MESSAGE_DIGEST,
        Any::encode_from(&OctetString::new(message_digest)?)?,
    )?)?;
    Ok(attributes)
}

/// Build a detached `ContentInfo`/SignedData for content whose hash is
/// `content_digest`.
pub fn build_signed_data(
    credential: &Credential,
    digest: DigestAlgorithm,
    content_digest: &[u8],
    signing_time: &DateTime<Utc>,
) -> Result<Vec<u8>> {
    let leaf = X509Certificate::from_der(credential.certificate().der())?;

    let attributes = signed_attributes(content_digest, signing_time)?;
    let signature = rsa_sign(credential.private_key(), digest, &attributes.to_der()?)?;

    let signer_info = CmsSignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: leaf.tbs_certificate.issuer.clone(),
            serial_number: leaf.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: algorithm(digest.oid()),
        signed_attrs: Some(attributes),
        signature_algorithm: algorithm(rfc5912::RSA_ENCRYPTION),
        signature: OctetString::new(signature)?,
        unsigned_attrs: None,
    };

    let mut certificates = SetOfVec::new();
    certificates.insert(CertificateChoices::Certificate(leaf))?;
    for extra in credential.chain() {
        let cert = X509Certificate::from_der(extra.der())?;
        certificates.insert(CertificateChoices::Certificate(cert))?;
    }

    let signed_data = CmsSignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![algorithm(digest.oid())])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: rfc5911::ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(certificates)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };

    let content_info = ContentInfo {
        content_type: rfc5911::ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    Ok(content_info.to_der()?)
}

/// Parsed SignerInfo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerInfo {
    /// DER issuer name of the signer certificate
    pub issuer_raw: Option<Vec<u8>>,
    /// Serial number content octets
    pub serial: Option<Vec<u8>>,
    /// Digest algorithm, when recognized
    pub digest_algorithm: Option<DigestAlgorithm>,
    /// Dotted OID of the digest algorithm
    pub digest_algorithm_oid: String,
    /// Signed attributes re-encoded as a DER SET (what was signed)
    pub signed_attributes: Option<Vec<u8>>,
    /// message-digest attribute
    pub message_digest: Option<Vec<u8>>,
    /// signing-time attribute
    pub signing_time: Option<DateTime<Utc>>,
    /// Dotted OID of the signature algorithm
    pub signature_algorithm_oid: String,
    /// Signature value
    pub signature: Vec<u8>,
    /// genTime of an embedded timestamp token
    pub timestamp_time: Option<DateTime<Utc>>,
}

/// Parsed detached SignedData.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedData {
    /// Embedded certificates, DER
    pub certificates: Vec<Vec<u8>>,
    /// First signer
    pub signer: SignerInfo,
}

impl SignedData {
    /// Parse a `ContentInfo`. Trailing bytes (placeholder padding) are ignored.
    pub fn parse(contents: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(contents)?;
        let content_info = ContentInfo::decode(&mut reader)?;
        if content_info.content_type != rfc5911::ID_SIGNED_DATA {
            return Err(Error::Der(format!(
                "content type {} is not signedData",
                content_info.content_type
            )));
        }
        let signed_data = content_info.content.decode_as::<CmsSignedData>()?;

        let mut certificates = Vec::new();
        for choice in signed_data.certificates.iter().flat_map(|set| set.0.iter()) {
            match choice {
                CertificateChoices::Certificate(cert) => certificates.push(cert.to_der()?),
                CertificateChoices::Other(_) => log::debug!("Skipping non-X.509 certificate entry"),
            }
        }

        let first = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Der("SignedData has no signer".to_string()))?;

        Ok(SignedData {
            certificates,
            signer: summarize_signer(first)?,
        })
    }
}

fn summarize_signer(signer: &CmsSignerInfo) -> Result<SignerInfo> {
    let mut info = SignerInfo::default();
    if let SignerIdentifier::IssuerAndSerialNumber(id) = &signer.sid {
        info.issuer_raw = Some(id.issuer.to_der()?);
        // content octets exactly as encoded, sign padding included
        info.serial = Some(Any::from_der(&id.serial_number.to_der()?)?.value().to_vec());
    }

    info.digest_algorithm = DigestAlgorithm::from_oid(&signer.digest_alg.oid);
    info.digest_algorithm_oid = signer.digest_alg.oid.to_string();
    info.signature_algorithm_oid = signer.signature_algorithm.oid.to_string();
    info.signature = signer.signature.as_bytes().to_vec();

    if let Some(attributes) = &signer.signed_attrs {
        info.signed_attributes = Some(attributes.to_der()?);
        for attribute in attributes.iter() {
            read_signed_attribute(attribute, &mut info);
        }
    }

    if let Some(unsigned) = &signer.unsigned_attrs {
        info.timestamp_time = unsigned.iter().find_map(|attribute| {
            timestamp_from_attribute(attribute).unwrap_or_else(|e| {
                log::debug!("Unreadable timestamp token: {}", e);
                None
            })
        });
    }

    Ok(info)
}

fn read_signed_attribute(attribute: &Attribute, info: &mut SignerInfo) {
    let Some(value) = attribute.values.iter().next() else { return };
    if attribute.oid == rfc5911::ID_MESSAGE_DIGEST {
        match value.decode_as::<OctetString>() {
            Ok(digest) => info.message_digest = Some(digest.into_bytes()),
            Err(e) => log::debug!("Unreadable message digest: {}", e),
        }
    } else if attribute.oid == rfc5911::ID_SIGNING_TIME {
        match time_from_any(value) {
            Ok(time) => info.signing_time = Some(time),
            Err(e) => log::debug!("Unreadable signing time: {}", e),
        }
    }
}

/// genTime of an RFC 3161 timestamp token attribute.
fn timestamp_from_attribute(attribute: &Attribute) -> Result<Option<DateTime<Utc>>> {
    if attribute.oid != ID_AA_TIME_STAMP_TOKEN {
        return Ok(None);
    }
    let Some(token) = attribute.values.iter().next() else { return Ok(None) };

    let token = token.decode_as::<ContentInfo>()?;
    let signed_data = token.content.decode_as::<CmsSignedData>()?;
    let Some(econtent) = signed_data.encap_content_info.econtent else { return Ok(None) };
    let tst_info = econtent.decode_as::<OctetString>()?;

    // version, policy, messageImprint, serialNumber, genTime, ...
    let fields = Vec::<Any>::from_der(tst_info.as_bytes())?;
    match fields.get(4) {
        Some(gen_time) => time_from_any(gen_time).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use chrono::TimeZone;
    use der::Tagged;

    fn unix(at: &DateTime<Utc>) -> Duration {
        Duration::from_secs(at.timestamp() as u64)
    }

    #[test]
    fn test_signed_attributes_are_der_sorted() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let attributes = signed_attributes(&[0xAA; 32], &at).unwrap();
        assert_eq!(attributes.len(), 3);
        let encoded: Vec<Vec<u8>> = attributes.iter().map(|a| a.to_der().unwrap()).collect();
        assert!(encoded.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(attributes.to_der().unwrap()[0], 0x31);
    }

    #[test]
    fn test_signing_time_encoding_by_year() {
        let recent = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let late = Utc.with_ymd_and_hms(2051, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(time_value(&recent).unwrap().tag(), der::Tag::UtcTime);
        assert_eq!(time_value(&late).unwrap().tag(), der::Tag::GeneralizedTime);
        assert_eq!(time_from_any(&time_value(&late).unwrap()).unwrap(), late);
    }

    #[test]
    fn test_build_and_parse() {
        let credential = test_support::self_signed_credential("Cms Signer");
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let content_digest = DigestAlgorithm::Sha256.digest(b"covered bytes");
        let der = build_signed_data(&credential, DigestAlgorithm::Sha256, &content_digest, &at).unwrap();

        let mut padded = der.clone();
        padded.extend_from_slice(&[0u8; 64]);
        let parsed = SignedData::parse(&padded).unwrap();

        assert_eq!(parsed.certificates, vec![credential.certificate().der().to_vec()]);
        let signer = &parsed.signer;
        assert_eq!(signer.digest_algorithm, Some(DigestAlgorithm::Sha256));
        assert_eq!(signer.digest_algorithm_oid, "2.16.840.1.101.3.4.2.1");
        assert_eq!(signer.signature_algorithm_oid, "1.2.840.113549.1.1.1");
        assert_eq!(signer.message_digest.as_deref(), Some(&content_digest[..]));
        assert_eq!(signer.signing_time, Some(at));
        assert_eq!(signer.timestamp_time, None);
        assert_eq!(signer.issuer_raw.as_deref(), Some(credential.certificate().issuer_raw()));
        assert_eq!(signer.serial.as_deref(), Some(credential.certificate().raw_serial()));

        let attributes = signer.signed_attributes.as_ref().unwrap();
        assert_eq!(attributes, &signed_attributes(&content_digest, &at).unwrap().to_der().unwrap());
        assert!(rsa_verify(
            credential.certificate().public_key(),
            DigestAlgorithm::Sha256,
            attributes,
            &signer.signature
        )
        .unwrap());
        assert!(!rsa_verify(
            credential.certificate().public_key(),
            DigestAlgorithm::Sha256,
            b"something else",
            &signer.signature
        )
        .unwrap());
    }

    #[test]
    fn test_output_decodes_with_cms_types() {
        let (credential, _) = test_support::ca_issued_credential("Chained Signer", 77);
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let der = build_signed_data(&credential, DigestAlgorithm::Sha384, &[7; 48], &at).unwrap();

        let content_info = ContentInfo::from_der(&der).unwrap();
        assert_eq!(content_info.content_type, rfc5911::ID_SIGNED_DATA);
        let signed_data = content_info.content.decode_as::<CmsSignedData>().unwrap();
        assert_eq!(signed_data.version, CmsVersion::V1);
        assert!(signed_data.encap_content_info.econtent.is_none());
        assert_eq!(signed_data.certificates.unwrap().0.len(), 2);
        let signer = signed_data.signer_infos.0.iter().next().unwrap();
        assert_eq!(signer.digest_alg.oid, DigestAlgorithm::Sha384.oid());
        assert!(signer.unsigned_attrs.is_none());
    }

    #[test]
    fn test_timestamp_token_fallback() {
        let gen_time = Utc.with_ymd_and_hms(2023, 11, 2, 10, 0, 0).unwrap();
        let imprint = vec![
            Any::encode_from(&DigestAlgorithm::Sha256.oid()).unwrap(),
            Any::encode_from(&OctetString::new(vec![0u8; 32]).unwrap()).unwrap(),
        ];
        let tst_info = vec![
            Any::encode_from(&1u8).unwrap(),
            Any::encode_from(&ObjectIdentifier::new_unwrap("1.2.3")).unwrap(),
            Any::encode_from(&imprint).unwrap(),
            Any::encode_from(&42u32).unwrap(),
            Any::encode_from(&GeneralizedTime::from_unix_duration(unix(&gen_time)).unwrap()).unwrap(),
        ];
        let token_content = CmsSignedData {
            version: CmsVersion::V3,
            digest_algorithms: SetOfVec::new(),
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4"),
                econtent: Some(Any::encode_from(&OctetString::new(tst_info.to_der().unwrap()).unwrap()).unwrap()),
            },
            certificates: None,
            crls: None,
            signer_infos: SignerInfos(SetOfVec::new()),
        };
        let token = ContentInfo {
            content_type: rfc5911::ID_SIGNED_DATA,
            content: Any::encode_from(&token_content).unwrap(),
        };
        let attribute = attribute(ID_AA_TIME_STAMP_TOKEN, Any::encode_from(&token).unwrap()).unwrap();
        assert_eq!(timestamp_from_attribute(&attribute).unwrap(), Some(gen_time));

        let content_type = Any::encode_from(&rfc5911::ID_DATA).unwrap();
        let unrelated = super::attribute(rfc5911::ID_CONTENT_TYPE, content_type).unwrap();
        assert_eq!(timestamp_from_attribute(&unrelated).unwrap(), None);
    }

    #[test]
    fn test_rejects_other_content() {
        let not_signed = ContentInfo {
            content_type: rfc5911::ID_DATA,
            content: Any::encode_from(&OctetString::new(b"x".to_vec()).unwrap()).unwrap(),
        };
        assert!(SignedData::parse(&not_signed.to_der().unwrap()).is_err());
        assert!(SignedData::parse(&[0u8; 16]).is_err());
        assert!(SignedData::parse(&[]).is_err());
    }
}
