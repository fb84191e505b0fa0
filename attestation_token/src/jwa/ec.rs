//! Elliptic curve keys

use std::{fmt, sync::Arc};

use aliri_base64::Base64;
use openssl::{
    bn::BigNumContext,
    ec::{EcGroup, EcGroupRef, EcKey, EcKeyRef, PointConversionForm},
    nid::Nid,
    pkey::{HasPublic, PKey, Private},
};
use ring::signature::EcdsaKeyPair;
use serde::{Deserialize, Serialize};

use super::Algorithm;
use crate::error;

/// A named ECC curve
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Curve {
    /// The P-256 curve (prime256v1/secp256r1)
    #[serde(rename = "P-256")]
    P256,

    /// The P-384 curve (secp384r1)
    #[serde(rename = "P-384")]
    P384,
}

impl Curve {
    fn nid(self) -> Nid {
        match self {
            Self::P256 => Nid::X9_62_PRIME256V1,
            Self::P384 => Nid::SECP384R1,
        }
    }

    fn from_group(group: &EcGroupRef) -> Option<Self> {
        let nid = group.curve_name()?;
        if nid == Self::P256.nid() {
            Some(Self::P256)
        } else if nid == Self::P384.nid() {
            Some(Self::P384)
        } else {
            None
        }
    }

    /// The ECDSA algorithm that signs on this curve
    #[must_use]
    pub fn algorithm(self) -> Algorithm {
        match self {
            Self::P256 => Algorithm::ES256,
            Self::P384 => Algorithm::ES384,
        }
    }

    fn verification_algorithm(self) -> &'static ring::signature::EcdsaVerificationAlgorithm {
        match self {
            Self::P256 => &ring::signature::ECDSA_P256_SHA256_FIXED,
            Self::P384 => &ring::signature::ECDSA_P384_SHA384_FIXED,
        }
    }

    fn signing_algorithm(self) -> &'static ring::signature::EcdsaSigningAlgorithm {
        match self {
            Self::P256 => &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
            Self::P384 => &ring::signature::ECDSA_P384_SHA384_FIXED_SIGNING,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
        };

        f.write_str(s)
    }
}

/// Elliptic curve public key
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PublicKey {
    curve: Curve,
    uncompressed_point: Vec<u8>,
}

impl PublicKey {
    /// The curve of the key
    #[must_use]
    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// The public point in uncompressed SEC1 form
    #[must_use]
    pub fn uncompressed_point(&self) -> &[u8] {
        &self.uncompressed_point
    }

    pub(crate) fn from_openssl_eckey<T: HasPublic>(
        key: &EcKeyRef<T>,
    ) -> Result<Self, error::KeyRejected> {
        let group = key.group();
        let curve = Curve::from_group(group)
            .ok_or_else(|| error::key_rejected("unsupported elliptic curve"))?;

        let mut ctx = BigNumContext::new().map_err(error::key_rejected)?;
        let uncompressed_point = key
            .public_key()
            .to_bytes(group, PointConversionForm::UNCOMPRESSED, &mut ctx)
            .map_err(error::key_rejected)?;

        Ok(Self {
            curve,
            uncompressed_point,
        })
    }

    pub(crate) fn verify(
        &self,
        alg: Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        if alg.curve() != Some(self.curve) {
            return Err(error::signature_mismatch());
        }

        let pk = ring::signature::UnparsedPublicKey::new(
            self.curve.verification_algorithm(),
            &self.uncompressed_point,
        );

        pk.verify(data, signature)
            .map_err(|_| error::signature_mismatch())
    }
}

/// Elliptic curve key pair
#[derive(Clone)]
#[must_use]
pub struct PrivateKey {
    public_key: PublicKey,
    pkcs8: Base64,
    ring_cache: Arc<EcdsaKeyPair>,
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.pkcs8 == other.pkcs8
    }
}

impl Eq for PrivateKey {}

impl PrivateKey {
    /// Generates a new key pair on the specified curve
    ///
    /// # Errors
    ///
    /// Unable to generate a private key.
    pub fn generate(curve: Curve) -> Result<Self, error::Unexpected> {
        let group = EcGroup::from_curve_name(curve.nid()).map_err(error::unexpected)?;
        let key = EcKey::generate(&group).map_err(error::unexpected)?;

        Self::from_openssl_eckey(key).map_err(error::unexpected)
    }

    pub(crate) fn from_openssl_eckey(key: EcKey<Private>) -> Result<Self, error::KeyRejected> {
        let public_key = PublicKey::from_openssl_eckey(&key)?;

        let pkey = PKey::from_ec_key(key).map_err(error::key_rejected)?;
        let pkcs8_bytes = pkey
            .private_key_to_pem_pkcs8()
            .map_err(error::key_rejected)?;
        let pkcs8_pem = String::from_utf8(pkcs8_bytes).map_err(error::key_rejected)?;

        let pkcs8_str: String = pkcs8_pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();

        let pkcs8 = Base64::from_encoded(pkcs8_str).map_err(error::key_rejected)?;

        let ring_cache = Arc::new(
            EcdsaKeyPair::from_pkcs8(
                public_key.curve.signing_algorithm(),
                pkcs8.as_slice(),
                &ring::rand::SystemRandom::new(),
            )
            .map_err(|e| error::key_rejected(e.to_string()))?,
        );

        Ok(Self {
            public_key,
            pkcs8,
            ring_cache,
        })
    }

    pub(crate) fn to_openssl(&self) -> Result<PKey<Private>, error::Unexpected> {
        PKey::private_key_from_pkcs8(self.pkcs8.as_slice()).map_err(error::unexpected)
    }

    /// Provides access to the public key parameters
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub(crate) fn sign(&self, data: &[u8]) -> Result<Vec<u8>, error::SigningError> {
        let signature = self
            .ring_cache
            .sign(&ring::rand::SystemRandom::new(), data)
            .map_err(|e| error::unexpected(e.to_string()))?;

        Ok(signature.as_ref().to_owned())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
