//! RSA keys

use std::{fmt, sync::Arc};

use aliri_base64::{Base64Url, Base64UrlRef};
use openssl::{
    pkey::{HasPublic, PKey, Private},
    rsa::{Rsa, RsaRef},
};
use ring::signature::RsaKeyPair;

use super::Algorithm;
use crate::error;

/// RSA public key components
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PublicKey {
    modulus: Base64Url,
    exponent: Base64Url,
}

impl PublicKey {
    /// The public key's modulus
    pub fn modulus(&self) -> &Base64UrlRef {
        &self.modulus
    }

    /// The public key's exponent
    pub fn exponent(&self) -> &Base64UrlRef {
        &self.exponent
    }

    pub(crate) fn from_openssl_rsa<T: HasPublic>(rsa: &RsaRef<T>) -> Self {
        Self {
            modulus: Base64Url::from_raw(rsa.n().to_vec()),
            exponent: Base64Url::from_raw(rsa.e().to_vec()),
        }
    }

    pub(crate) fn verify(
        &self,
        alg: Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        let params = verification_params(alg).ok_or_else(error::signature_mismatch)?;
        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(params, data, signature)
            .map_err(|_| error::signature_mismatch())
    }
}

fn verification_params(alg: Algorithm) -> Option<&'static ring::signature::RsaParameters> {
    match alg {
        Algorithm::RS256 => Some(&ring::signature::RSA_PKCS1_2048_8192_SHA256),
        Algorithm::RS384 => Some(&ring::signature::RSA_PKCS1_2048_8192_SHA384),
        Algorithm::RS512 => Some(&ring::signature::RSA_PKCS1_2048_8192_SHA512),
        Algorithm::PS256 => Some(&ring::signature::RSA_PSS_2048_8192_SHA256),
        Algorithm::PS384 => Some(&ring::signature::RSA_PSS_2048_8192_SHA384),
        Algorithm::PS512 => Some(&ring::signature::RSA_PSS_2048_8192_SHA512),
        _ => None,
    }
}

fn signing_params(alg: Algorithm) -> Option<&'static dyn ring::signature::RsaEncoding> {
    match alg {
        Algorithm::RS256 => Some(&ring::signature::RSA_PKCS1_SHA256),
        Algorithm::RS384 => Some(&ring::signature::RSA_PKCS1_SHA384),
        Algorithm::RS512 => Some(&ring::signature::RSA_PKCS1_SHA512),
        Algorithm::PS256 => Some(&ring::signature::RSA_PSS_SHA256),
        Algorithm::PS384 => Some(&ring::signature::RSA_PSS_SHA384),
        Algorithm::PS512 => Some(&ring::signature::RSA_PSS_SHA512),
        _ => None,
    }
}

/// RSA key pair
#[derive(Clone)]
#[must_use]
pub struct PrivateKey {
    public_key: PublicKey,
    der: Vec<u8>,
    ring_cache: Arc<RsaKeyPair>,
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for PrivateKey {}

impl PrivateKey {
    /// Generates a new 2048-bit RSA key pair
    ///
    /// # Errors
    ///
    /// Unable to generate a private key.
    pub fn generate() -> Result<Self, error::Unexpected> {
        let rsa = Rsa::generate(2048).map_err(error::unexpected)?;
        Self::from_openssl_rsa(&rsa).map_err(error::unexpected)
    }

    pub(crate) fn from_openssl_rsa(rsa: &RsaRef<Private>) -> Result<Self, error::KeyRejected> {
        let der = rsa.private_key_to_der().map_err(error::key_rejected)?;
        let public_key = PublicKey::from_openssl_rsa(rsa);

        let ring_cache =
            Arc::new(RsaKeyPair::from_der(&der).map_err(|e| error::key_rejected(e.to_string()))?);

        Ok(Self {
            public_key,
            der,
            ring_cache,
        })
    }

    pub(crate) fn to_openssl(&self) -> Result<PKey<Private>, error::Unexpected> {
        let rsa = Rsa::private_key_from_der(&self.der).map_err(error::unexpected)?;
        PKey::from_rsa(rsa).map_err(error::unexpected)
    }

    /// Provides access to the public key parameters
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub(crate) fn sign(&self, alg: Algorithm, data: &[u8]) -> Result<Vec<u8>, error::SigningError> {
        let params = signing_params(alg).ok_or_else(|| error::incompatible_algorithm(alg))?;

        let mut buf = vec![0; self.ring_cache.public().modulus_len()];
        self.ring_cache
            .sign(params, &ring::rand::SystemRandom::new(), data, &mut buf)
            .map_err(|e| error::unexpected(e.to_string()))?;

        Ok(buf)
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
