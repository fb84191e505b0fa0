//! JSON Web Algorithms (JWA) used to sign and verify attestation tokens
//!
//! The specifications for these algorithms can be found in [RFC7518][].
//! Keys are imported and generated through OpenSSL, while the signature
//! primitives themselves are provided by `ring`.
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518

use std::{convert::TryFrom, fmt, str::FromStr};

use openssl::pkey::{HasPublic, Id, PKey, PKeyRef, Private};
use serde::{Deserialize, Serialize};

use crate::{error, jws};

pub mod ec;
pub mod rsa;

pub use ec::Curve;

/// JSON Web Signature algorithms supported for attestation tokens
///
/// This list may be expanded in the future.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
#[non_exhaustive]
pub enum Algorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256
    PS256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384
    PS384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512
    PS512,
    /// ECDSA using P-256 and SHA-256
    ES256,
    /// ECDSA using P-384 and SHA-384
    ES384,
}

impl Algorithm {
    /// The literal `alg` value of an unsecured token
    pub const NONE: &'static str = "none";

    /// The name of the algorithm as used in a JWS header
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
        }
    }

    /// The curve required by an ECDSA algorithm, if any
    #[must_use]
    pub fn curve(self) -> Option<Curve> {
        match self {
            Self::ES256 => Some(Curve::P256),
            Self::ES384 => Some(Curve::P384),
            _ => None,
        }
    }

    /// Whether the algorithm uses an RSA key
    #[must_use]
    pub fn is_rsa(self) -> bool {
        self.curve().is_none()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&'_ str> for Algorithm {
    type Error = error::UnknownAlgorithm;

    #[inline]
    fn try_from(value: &'_ str) -> Result<Self, Self::Error> {
        match value {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "PS256" => Ok(Self::PS256),
            "PS384" => Ok(Self::PS384),
            "PS512" => Ok(Self::PS512),
            "ES256" => Ok(Self::ES256),
            "ES384" => Ok(Self::ES384),
            _ => Err(error::unknown_algorithm(value.to_string())),
        }
    }
}

impl FromStr for Algorithm {
    type Err = error::UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// A public key extracted from a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PublicKey {
    /// RSA public key
    Rsa(rsa::PublicKey),

    /// Elliptic curve public key
    EllipticCurve(ec::PublicKey),
}

impl PublicKey {
    /// Extracts the public components of an OpenSSL key
    ///
    /// # Errors
    ///
    /// The key is neither RSA nor an elliptic curve key on a supported curve.
    pub fn from_openssl<T: HasPublic>(key: &PKeyRef<T>) -> Result<Self, error::KeyRejected> {
        match key.id() {
            Id::RSA => {
                let rsa = key.rsa().map_err(error::key_rejected)?;
                Ok(Self::Rsa(rsa::PublicKey::from_openssl_rsa(&rsa)))
            }
            Id::EC => {
                let ec = key.ec_key().map_err(error::key_rejected)?;
                Ok(Self::EllipticCurve(ec::PublicKey::from_openssl_eckey(&ec)?))
            }
            _ => Err(error::key_rejected("unsupported key type")),
        }
    }

    /// Imports a PEM-encoded public key
    ///
    /// # Errors
    ///
    /// The provided PEM is not a supported public key.
    pub fn from_pem(pem: &str) -> Result<Self, error::KeyRejected> {
        let key = PKey::public_key_from_pem(pem.as_bytes()).map_err(error::key_rejected)?;
        Self::from_openssl(&*key)
    }

    /// The JSON Web Key type of this key, either `RSA` or `EC`
    #[must_use]
    pub fn key_type(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::EllipticCurve(_) => "EC",
        }
    }

    /// The algorithm used when signing tokens with this kind of key
    #[must_use]
    pub fn default_algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa(_) => Algorithm::RS256,
            Self::EllipticCurve(p) => p.curve().algorithm(),
        }
    }
}

impl jws::Verifier for PublicKey {
    type Algorithm = Algorithm;
    type Error = error::KeyVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        match self {
            Self::Rsa(_) => alg.is_rsa(),
            Self::EllipticCurve(p) => alg.curve() == Some(p.curve()),
        }
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        if !self.can_verify(alg) {
            return Err(error::incompatible_algorithm(alg).into());
        }

        match self {
            Self::Rsa(p) => p.verify(alg, data, signature)?,
            Self::EllipticCurve(p) => p.verify(alg, data, signature)?,
        }

        Ok(())
    }
}

/// A private key able to sign attestation tokens
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
#[non_exhaustive]
pub enum PrivateKey {
    /// RSA key pair
    Rsa(rsa::PrivateKey),

    /// Elliptic curve key pair
    EllipticCurve(ec::PrivateKey),
}

impl PrivateKey {
    /// Generates a new 2048-bit RSA key pair
    ///
    /// # Errors
    ///
    /// Unable to generate a private key.
    pub fn generate_rsa() -> Result<Self, error::Unexpected> {
        Ok(Self::Rsa(rsa::PrivateKey::generate()?))
    }

    /// Generates a new elliptic curve key pair on the specified curve
    ///
    /// # Errors
    ///
    /// Unable to generate a private key.
    pub fn generate_ec(curve: Curve) -> Result<Self, error::Unexpected> {
        Ok(Self::EllipticCurve(ec::PrivateKey::generate(curve)?))
    }

    /// Imports a PEM-encoded private key, either RSA or elliptic curve
    ///
    /// Both traditional (`BEGIN RSA PRIVATE KEY`, `BEGIN EC PRIVATE KEY`) and
    /// PKCS#8 (`BEGIN PRIVATE KEY`) encodings are accepted.
    ///
    /// # Errors
    ///
    /// The provided PEM is not a supported private key.
    pub fn from_pem(pem: &str) -> Result<Self, error::KeyRejected> {
        let key = PKey::private_key_from_pem(pem.as_bytes()).map_err(error::key_rejected)?;
        match key.id() {
            Id::RSA => {
                let rsa = key.rsa().map_err(error::key_rejected)?;
                Ok(Self::Rsa(rsa::PrivateKey::from_openssl_rsa(&rsa)?))
            }
            Id::EC => {
                let ec = key.ec_key().map_err(error::key_rejected)?;
                Ok(Self::EllipticCurve(ec::PrivateKey::from_openssl_eckey(ec)?))
            }
            _ => Err(error::key_rejected("unsupported key type")),
        }
    }

    /// Exports the key pair as PEM
    ///
    /// # Errors
    ///
    /// The key could not be re-encoded.
    pub fn to_pem(&self) -> Result<String, error::Unexpected> {
        let pem = self
            .to_openssl()?
            .private_key_to_pem_pkcs8()
            .map_err(error::unexpected)?;
        String::from_utf8(pem).map_err(error::unexpected)
    }

    /// The public half of the key pair
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Rsa(p) => PublicKey::Rsa(p.public_key().clone()),
            Self::EllipticCurve(p) => PublicKey::EllipticCurve(p.public_key().clone()),
        }
    }

    /// The algorithm used when signing tokens with this key
    #[must_use]
    pub fn default_algorithm(&self) -> Algorithm {
        self.public_key().default_algorithm()
    }

    pub(crate) fn to_openssl(&self) -> Result<PKey<Private>, error::Unexpected> {
        match self {
            Self::Rsa(p) => p.to_openssl(),
            Self::EllipticCurve(p) => p.to_openssl(),
        }
    }
}

impl jws::Signer for PrivateKey {
    type Algorithm = Algorithm;
    type Error = error::SigningError;

    fn can_sign(&self, alg: Self::Algorithm) -> bool {
        match self {
            Self::Rsa(_) => alg.is_rsa(),
            Self::EllipticCurve(p) => alg.curve() == Some(p.public_key().curve()),
        }
    }

    fn sign(&self, alg: Self::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        if !self.can_sign(alg) {
            return Err(error::incompatible_algorithm(alg).into());
        }

        match self {
            Self::Rsa(p) => p.sign(alg, data),
            Self::EllipticCurve(p) => p.sign(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::jws::{Signer, Verifier};

    #[test]
    fn algorithm_names_round_trip() -> Result<()> {
        for alg in [
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
            Algorithm::ES256,
            Algorithm::ES384,
        ] {
            assert_eq!(alg.as_str().parse::<Algorithm>()?, alg);
        }

        assert!(Algorithm::NONE.parse::<Algorithm>().is_err());
        assert!("HS256".parse::<Algorithm>().is_err());
        Ok(())
    }

    #[test]
    fn rsa_signs_with_every_rsa_algorithm() -> Result<()> {
        let key = PrivateKey::generate_rsa()?;
        let public = key.public_key();
        assert_eq!(public.key_type(), "RSA");
        assert_eq!(key.default_algorithm(), Algorithm::RS256);

        for alg in [
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
        ] {
            let signature = key.sign(alg, b"header.body")?;
            public.verify(alg, b"header.body", &signature)?;
            assert!(public.verify(alg, b"header.bodx", &signature).is_err());
        }

        assert!(key.sign(Algorithm::ES256, b"header.body").is_err());
        Ok(())
    }

    #[test]
    fn ec_keys_pick_algorithm_from_curve() -> Result<()> {
        let p256 = PrivateKey::generate_ec(Curve::P256)?;
        let p384 = PrivateKey::generate_ec(Curve::P384)?;

        assert_eq!(p256.default_algorithm(), Algorithm::ES256);
        assert_eq!(p384.default_algorithm(), Algorithm::ES384);
        assert_eq!(p256.public_key().key_type(), "EC");

        let signature = p384.sign(Algorithm::ES384, b"header.body")?;
        p384.public_key()
            .verify(Algorithm::ES384, b"header.body", &signature)?;

        let err = p256
            .public_key()
            .verify(Algorithm::ES384, b"header.body", &signature)
            .unwrap_err();
        assert!(err.is_incompatible_alg());

        let err = p384
            .public_key()
            .verify(Algorithm::ES384, b"other.body", &signature)
            .unwrap_err();
        assert!(err.is_signature_mismatch());
        Ok(())
    }

    #[test]
    fn private_keys_survive_pem_export() -> Result<()> {
        for key in [
            PrivateKey::generate_rsa()?,
            PrivateKey::generate_ec(Curve::P256)?,
        ] {
            let pem = key.to_pem()?;
            let imported = PrivateKey::from_pem(&pem)?;
            assert_eq!(imported.public_key(), key.public_key());
        }

        assert!(PrivateKey::from_pem("not a key").is_err());
        Ok(())
    }
}
