//! Runtime-generated keys and certificates for unit tests.

use crate::credentials::{Credential, CredentialLoader};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::{X509Name, X509NameBuilder, X509};

pub const PASSWORD: &str = "correct horse";

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn name(cn: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    builder.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Stamp Test").unwrap();
    builder.build()
}

/// Certificate for `key` named `cn`, signed by `issuer` (self-signed when `None`).
pub fn certificate(
    cn: &str,
    key: &PKey<Private>,
    serial: u32,
    issuer: Option<(&X509, &PKey<Private>)>,
) -> X509 {
    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    let subject = name(cn);
    builder.set_subject_name(&subject).unwrap();
    match issuer {
        Some((cert, _)) => builder.set_issuer_name(cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&subject).unwrap(),
    }
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(365).unwrap()).unwrap();
    let signing_key = issuer.map(|(_, k)| k).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// PKCS#12 container with `cert`, `key` and optional CA certificates.
pub fn pkcs12(cert: &X509, key: &PKey<Private>, ca: &[X509], password: &str) -> Vec<u8> {
    let mut builder = Pkcs12::builder();
    builder.name("test").pkey(key).cert(cert);
    if !ca.is_empty() {
        let mut stack = Stack::new().unwrap();
        for c in ca {
            stack.push(c.clone()).unwrap();
        }
        builder.ca(stack);
    }
    builder.build2(password).unwrap().to_der().unwrap()
}

/// Self-signed credential named `cn`.
pub fn self_signed_credential(cn: &str) -> Credential {
    let key = rsa_key();
    let cert = certificate(cn, &key, 1001, None);
    CredentialLoader::load(&pkcs12(&cert, &key, &[], PASSWORD), PASSWORD).unwrap()
}

/// Credential named `cn` issued by a fresh CA; returns the CA DER too.
pub fn ca_issued_credential(cn: &str, serial: u32) -> (Credential, Vec<u8>) {
    let ca_key = rsa_key();
    let ca = certificate("Stamp Test Root", &ca_key, 1, None);
    let key = rsa_key();
    let cert = certificate(cn, &key, serial, Some((&ca, &ca_key)));
    let credential =
        CredentialLoader::load(&pkcs12(&cert, &key, &[ca.clone()], PASSWORD), PASSWORD).unwrap();
    (credential, ca.to_der().unwrap())
}
