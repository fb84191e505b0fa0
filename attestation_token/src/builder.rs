//! Creation of signed and unsecured attestation tokens

use std::fmt;

use aliri_base64::Base64Url;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error, jwa,
    jws::{Header, Signer},
    signer::AttestationSigner,
    token::{AttestationToken, BodyCodec, JsonBody},
    x509::Certificate,
};

/// A private key paired with the certificate for its public key
///
/// The certificate is embedded in the `x5c` header of every token signed
/// with this key, and the signing algorithm follows from the certificate's
/// key: `RS256` for RSA, `ES256` for P-256, and `ES384` for P-384.
#[derive(Clone)]
#[must_use]
pub struct SigningKey {
    private_key: jwa::PrivateKey,
    certificate: Certificate,
}

impl SigningKey {
    /// Pairs a private key with its certificate
    ///
    /// # Errors
    ///
    /// The private key is not the private half of the certificate's key.
    pub fn new(
        private_key: jwa::PrivateKey,
        certificate: Certificate,
    ) -> Result<Self, error::KeyMismatch> {
        if !certificate.matches_private_key(&private_key) {
            return Err(error::key_mismatch());
        }

        Ok(Self {
            private_key,
            certificate,
        })
    }

    /// Imports a PEM private key and a PEM certificate
    ///
    /// # Errors
    ///
    /// Either document could not be imported, or they do not belong together.
    pub fn from_pem(
        private_key_pem: &str,
        certificate_pem: &str,
    ) -> Result<Self, error::TokenCreationError> {
        let private_key = jwa::PrivateKey::from_pem(private_key_pem)?;
        let certificate = Certificate::from_pem(certificate_pem)?;
        Ok(Self::new(private_key, certificate)?)
    }

    /// Pairs a private key with a new self-signed certificate for it
    ///
    /// # Errors
    ///
    /// The certificate could not be created.
    pub fn self_signed(
        private_key: jwa::PrivateKey,
        subject: &str,
    ) -> Result<Self, error::Unexpected> {
        let certificate = Certificate::self_signed(&private_key, subject)?;
        Ok(Self {
            private_key,
            certificate,
        })
    }

    /// The certificate of the signing key
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The algorithm used to sign tokens with this key
    #[must_use]
    pub fn algorithm(&self) -> jwa::Algorithm {
        self.certificate.algorithm()
    }

    /// A signer able to verify tokens signed with this key
    ///
    /// # Errors
    ///
    /// The certificate could not be re-encoded.
    pub fn signer(&self) -> Result<AttestationSigner, error::Unexpected> {
        AttestationSigner::from_certificate(&self.certificate)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm())
            .field("subject", &self.certificate.subject_name())
            .field("private_key", &self.private_key)
            .finish()
    }
}

impl<T> AttestationToken<T> {
    /// Creates a token, encoding its body with `codec`
    ///
    /// Without a signing key, the token is unsecured: its header is
    /// `{"alg":"none"}` and its signature segment is empty. Without a body,
    /// the body segment is empty.
    ///
    /// The returned token is parsed from the produced text.
    ///
    /// # Errors
    ///
    /// The body could not be encoded, or the signature could not be produced.
    pub fn create_with<C>(
        codec: &C,
        body: Option<&T>,
        key: Option<&SigningKey>,
    ) -> Result<Self, error::TokenCreationError>
    where
        C: BodyCodec<T> + ?Sized,
    {
        let header = match key {
            Some(key) => Header::new()
                .with_algorithm(key.algorithm().as_str())
                .with_certificate_chain(vec![key.certificate.to_base64()?]),
            None => Header::unsecured(),
        };

        let h_json = serde_json::to_vec(&header).map_err(error::malformed_token_header)?;

        let b_raw = match body {
            Some(body) => {
                let value = codec.encode(body).map_err(error::malformed_token_body)?;
                let b_json = serde_json::to_vec(&value).map_err(error::malformed_token_body)?;
                Base64Url::from_raw(b_json).to_string()
            }
            None => String::new(),
        };

        let mut raw = format!("{}.{}", Base64Url::from_raw(h_json), b_raw);

        let signature = match key {
            Some(key) => key.private_key.sign(key.algorithm(), raw.as_bytes())?,
            None => Vec::new(),
        };

        raw.push('.');
        raw.push_str(&Base64Url::from_raw(signature).to_string());

        tracing::debug!(
            token.alg = header.algorithm().unwrap_or(jwa::Algorithm::NONE),
            token.has_body = body.is_some(),
            "created attestation token"
        );

        Ok(Self::parse_with(raw, codec)?)
    }
}

impl<T> AttestationToken<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a token whose body is encoded with the body type's `serde`
    /// implementation
    ///
    /// # Errors
    ///
    /// See [`create_with()`][Self::create_with()].
    pub fn create(
        body: Option<&T>,
        key: Option<&SigningKey>,
    ) -> Result<Self, error::TokenCreationError> {
        Self::create_with(&JsonBody, body, key)
    }
}
