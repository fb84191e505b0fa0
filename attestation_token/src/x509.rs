//! X.509 certificates used to sign and verify attestation tokens

use std::fmt::Write as _;

use aliri_base64::Base64;
use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    nid::Nid,
    x509::{X509Builder, X509NameBuilder, X509NameRef, X509},
};

use crate::{error, jwa};

const PEM_LINE_WIDTH: usize = 64;

/// An X.509 certificate and the public key it certifies
#[derive(Clone, Debug)]
#[must_use]
pub struct Certificate {
    x509: X509,
    public_key: jwa::PublicKey,
}

impl Certificate {
    /// Imports a certificate that is either PEM-encoded or bare standard base64 DER
    ///
    /// # Errors
    ///
    /// The input does not decode to an X.509 certificate with a supported key.
    pub fn import(encoded: &str) -> Result<Self, error::CertificateRejected> {
        if encoded.contains("-----BEGIN") {
            Self::from_pem(encoded)
        } else {
            let compact: String = encoded.split_whitespace().collect();
            let der = Base64::from_encoded(compact).map_err(error::certificate_rejected)?;
            Self::from_der(der.as_slice())
        }
    }

    /// Imports a PEM-encoded certificate
    ///
    /// # Errors
    ///
    /// The input is not a PEM certificate with a supported key.
    pub fn from_pem(pem: &str) -> Result<Self, error::CertificateRejected> {
        let x509 = X509::from_pem(pem.as_bytes()).map_err(error::certificate_rejected)?;
        Self::from_openssl(x509)
    }

    /// Imports a DER-encoded certificate
    ///
    /// # Errors
    ///
    /// The input is not a DER certificate with a supported key.
    pub fn from_der(der: &[u8]) -> Result<Self, error::CertificateRejected> {
        let x509 = X509::from_der(der).map_err(error::certificate_rejected)?;
        Self::from_openssl(x509)
    }

    fn from_openssl(x509: X509) -> Result<Self, error::CertificateRejected> {
        let key = x509.public_key().map_err(error::certificate_rejected)?;
        let public_key = jwa::PublicKey::from_openssl(&*key).map_err(error::certificate_rejected)?;

        Ok(Self { x509, public_key })
    }

    /// Creates a self-signed certificate for the given key, valid for one year
    ///
    /// # Errors
    ///
    /// The certificate could not be assembled or signed.
    pub fn self_signed(key: &jwa::PrivateKey, subject: &str) -> Result<Self, error::Unexpected> {
        let pkey = key.to_openssl()?;

        let mut name = X509NameBuilder::new().map_err(error::unexpected)?;
        name.append_entry_by_nid(Nid::COMMONNAME, subject)
            .map_err(error::unexpected)?;
        let name = name.build();

        let mut serial = BigNum::new().map_err(error::unexpected)?;
        serial
            .rand(64, MsbOption::MAYBE_ZERO, false)
            .map_err(error::unexpected)?;
        let serial = serial.to_asn1_integer().map_err(error::unexpected)?;

        let not_before = Asn1Time::days_from_now(0).map_err(error::unexpected)?;
        let not_after = Asn1Time::days_from_now(365).map_err(error::unexpected)?;

        let mut builder = X509Builder::new().map_err(error::unexpected)?;
        builder.set_version(2).map_err(error::unexpected)?;
        builder
            .set_serial_number(&serial)
            .map_err(error::unexpected)?;
        builder.set_subject_name(&name).map_err(error::unexpected)?;
        builder.set_issuer_name(&name).map_err(error::unexpected)?;
        builder.set_pubkey(&pkey).map_err(error::unexpected)?;
        builder
            .set_not_before(&not_before)
            .map_err(error::unexpected)?;
        builder.set_not_after(&not_after).map_err(error::unexpected)?;
        builder
            .sign(&pkey, MessageDigest::sha256())
            .map_err(error::unexpected)?;

        Self::from_openssl(builder.build()).map_err(error::unexpected)
    }

    /// The public key certified by this certificate
    #[must_use]
    pub fn public_key(&self) -> &jwa::PublicKey {
        &self.public_key
    }

    /// The algorithm used when signing tokens with this certificate's key
    #[must_use]
    pub fn algorithm(&self) -> jwa::Algorithm {
        self.public_key.default_algorithm()
    }

    /// The JSON Web Key type of the certified key, either `RSA` or `EC`
    #[must_use]
    pub fn key_type(&self) -> &'static str {
        self.public_key.key_type()
    }

    /// Whether `key` is the private half of this certificate's key
    #[must_use]
    pub fn matches_private_key(&self, key: &jwa::PrivateKey) -> bool {
        self.public_key == key.public_key()
    }

    /// The DER encoding of the certificate
    ///
    /// # Errors
    ///
    /// The certificate could not be re-encoded.
    pub fn to_der(&self) -> Result<Vec<u8>, error::Unexpected> {
        self.x509.to_der().map_err(error::unexpected)
    }

    /// The standard base64 encoding of the DER certificate, as used in `x5c`
    ///
    /// # Errors
    ///
    /// The certificate could not be re-encoded.
    pub fn to_base64(&self) -> Result<String, error::Unexpected> {
        Ok(Base64::from_raw(self.to_der()?).to_string())
    }

    /// The PEM encoding of the certificate
    ///
    /// # Errors
    ///
    /// The certificate could not be re-encoded.
    pub fn to_pem(&self) -> Result<String, error::Unexpected> {
        let pem = self.x509.to_pem().map_err(error::unexpected)?;
        String::from_utf8(pem).map_err(error::unexpected)
    }

    /// The certificate thumbprint: upper-case hex SHA-1 of the DER encoding
    ///
    /// # Errors
    ///
    /// The digest could not be computed.
    pub fn thumbprint(&self) -> Result<String, error::Unexpected> {
        let digest = self
            .x509
            .digest(MessageDigest::sha1())
            .map_err(error::unexpected)?;

        let mut hex = String::with_capacity(digest.len() * 2);
        for b in digest.iter() {
            write!(hex, "{:02X}", b).map_err(error::unexpected)?;
        }

        Ok(hex)
    }

    /// The subject name, formatted as `CN=..., O=...`
    #[must_use]
    pub fn subject_name(&self) -> String {
        format_name(self.x509.subject_name())
    }

    /// The issuer name, formatted as `CN=..., O=...`
    #[must_use]
    pub fn issuer_name(&self) -> String {
        format_name(self.x509.issuer_name())
    }
}

fn format_name(name: &X509NameRef) -> String {
    name.entries()
        .filter_map(|entry| {
            let field = entry.object().nid().short_name().ok()?;
            let value = String::from_utf8_lossy(entry.data().as_slice());
            Some(format!("{}={}", field, value))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Wraps standard base64 data in PEM armor with the given label
///
/// `pem_from_base64(der, "CERTIFICATE")` produces a document readable by
/// [`Certificate::from_pem()`].
#[must_use]
pub fn pem_from_base64(base64: &str, label: &str) -> String {
    let body: String = base64.split_whitespace().collect();

    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);
    pem.push_str("-----BEGIN ");
    pem.push_str(label);
    pem.push_str("-----\n");

    for (i, c) in body.chars().enumerate() {
        if i > 0 && i % PEM_LINE_WIDTH == 0 {
            pem.push('\n');
        }
        pem.push(c);
    }
    if !body.is_empty() {
        pem.push('\n');
    }

    pem.push_str("-----END ");
    pem.push_str(label);
    pem.push_str("-----\n");
    pem
}

/// Strips PEM armor and line breaks, leaving the standard base64 body
///
/// Input that carries no armor is returned with whitespace removed.
#[must_use]
pub fn base64_from_pem(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|l| !l.starts_with("-----"))
        .collect()
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::jwa::{Curve, PrivateKey};

    #[test]
    fn self_signed_certificate_exports_and_imports() -> Result<()> {
        let key = PrivateKey::generate_rsa()?;
        let cert = Certificate::self_signed(&key, "attestation test signer")?;

        assert_eq!(cert.subject_name(), "CN=attestation test signer");
        assert_eq!(cert.issuer_name(), cert.subject_name());
        assert_eq!(cert.algorithm(), jwa::Algorithm::RS256);
        assert_eq!(cert.key_type(), "RSA");
        assert!(cert.matches_private_key(&key));

        let from_pem = Certificate::import(&cert.to_pem()?)?;
        let from_b64 = Certificate::import(&cert.to_base64()?)?;
        assert_eq!(from_pem.to_der()?, cert.to_der()?);
        assert_eq!(from_b64.to_der()?, cert.to_der()?);
        Ok(())
    }

    #[test]
    fn ec_certificates_report_curve_algorithm() -> Result<()> {
        let p256 = PrivateKey::generate_ec(Curve::P256)?;
        let p384 = PrivateKey::generate_ec(Curve::P384)?;

        let cert = Certificate::self_signed(&p256, "p256")?;
        assert_eq!(cert.algorithm(), jwa::Algorithm::ES256);
        assert_eq!(cert.key_type(), "EC");
        assert!(!cert.matches_private_key(&p384));

        let cert = Certificate::self_signed(&p384, "p384")?;
        assert_eq!(cert.algorithm(), jwa::Algorithm::ES384);
        Ok(())
    }

    #[test]
    fn thumbprint_is_upper_hex_sha1() -> Result<()> {
        let key = PrivateKey::generate_ec(Curve::P256)?;
        let cert = Certificate::self_signed(&key, "thumbprint")?;

        let thumbprint = cert.thumbprint()?;
        assert_eq!(thumbprint.len(), 40);
        assert!(thumbprint
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_eq!(thumbprint, Certificate::import(&cert.to_pem()?)?.thumbprint()?);
        Ok(())
    }

    #[test]
    fn pem_armor_round_trips() -> Result<()> {
        let key = PrivateKey::generate_rsa()?;
        let cert = Certificate::self_signed(&key, "armor")?;
        let b64 = cert.to_base64()?;

        let pem = pem_from_base64(&b64, "CERTIFICATE");
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.ends_with("-----END CERTIFICATE-----\n"));
        assert!(pem.lines().all(|l| l.len() <= PEM_LINE_WIDTH));
        assert_eq!(base64_from_pem(&pem), b64);

        assert_eq!(Certificate::from_pem(&pem)?.to_der()?, cert.to_der()?);
        Ok(())
    }

    #[test]
    fn pem_armor_splits_lines_on_characters() {
        let entry = format!("{}\u{e9}{}", "A".repeat(63), "B".repeat(70));

        let pem = pem_from_base64(&entry, "CERTIFICATE");
        let lines: Vec<&str> = pem.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1].chars().count(), PEM_LINE_WIDTH);
        assert!(lines[1].ends_with('\u{e9}'));
        assert_eq!(lines[2], "B".repeat(64));
        assert_eq!(lines[3], "B".repeat(6));

        assert!(Certificate::from_pem(&pem).is_err());
        assert!(Certificate::import(&entry).is_err());
    }

    #[test]
    fn names_keep_utf8_values() -> Result<()> {
        let key = PrivateKey::generate_ec(Curve::P256)?;
        let cert = Certificate::self_signed(&key, "Soci\u{e9}t\u{e9} attestation")?;

        assert_eq!(cert.subject_name(), "CN=Soci\u{e9}t\u{e9} attestation");
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Certificate::import("not base64 at all!").is_err());
        assert!(Certificate::import("AAAA").is_err());
        assert!(Certificate::import("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n").is_err());
    }
}
