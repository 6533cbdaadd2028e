//! Shared fixtures: runtime-generated credentials and blank documents.
#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::{X509NameBuilder, X509};
use stamp_signer::writer::PdfWriter;
use std::path::{Path, PathBuf};

pub const PASSWORD: &str = "integration secret";

/// Route `log` output through the test harness; `RUST_LOG=debug` shows it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

/// Certificate for `key`, signed by `issuer` or self-signed.
pub fn certificate(
    cn: Option<&str>,
    key: &PKey<Private>,
    serial: u32,
    issuer: Option<(&X509, &PKey<Private>)>,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    if let Some(cn) = cn {
        name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    }
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Integration").unwrap();
    name.append_entry_by_nid(Nid::COUNTRYNAME, "PT").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some((ca, _)) => builder.set_issuer_name(ca.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
    builder
        .sign(issuer.map(|(_, k)| k).unwrap_or(key), MessageDigest::sha256())
        .unwrap();
    builder.build()
}

pub fn pkcs12(cert: &X509, key: &PKey<Private>, chain: &[X509], password: &str) -> Vec<u8> {
    let mut builder = Pkcs12::builder();
    builder.name("integration").pkey(key).cert(cert);
    if !chain.is_empty() {
        let mut stack = Stack::new().unwrap();
        for c in chain {
            stack.push(c.clone()).unwrap();
        }
        builder.ca(stack);
    }
    builder.build2(password).unwrap().to_der().unwrap()
}

/// A self-signed container for `cn` written to `dir`.
pub fn write_container(dir: &Path, file_name: &str, cn: &str, serial: u32) -> PathBuf {
    let key = rsa_key();
    let cert = certificate(Some(cn), &key, serial, None);
    let path = dir.join(file_name);
    std::fs::write(&path, pkcs12(&cert, &key, &[], PASSWORD)).unwrap();
    path
}

/// A container issued by a fresh CA; returns the container path and the CA DER.
pub fn write_ca_issued_container(dir: &Path, file_name: &str, cn: &str) -> (PathBuf, Vec<u8>) {
    let ca_key = rsa_key();
    let ca = certificate(Some("Integration Root CA"), &ca_key, 1, None);
    let key = rsa_key();
    let cert = certificate(Some(cn), &key, 0x5eed, Some((&ca, &ca_key)));
    let path = dir.join(file_name);
    std::fs::write(&path, pkcs12(&cert, &key, &[ca.clone()], PASSWORD)).unwrap();
    (path, ca.to_der().unwrap())
}

/// A blank Letter-size document with `pages` pages.
pub fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut writer = PdfWriter::new();
    for _ in 0..pages {
        writer = writer.add_page(612.0, 792.0);
    }
    writer.finish().unwrap()
}
