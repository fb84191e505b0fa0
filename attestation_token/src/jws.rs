//! Compact JSON Web Signature (JWS) serialization
//!
//! The specifications for this standard can be found in [RFC7515][].
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515

use std::{error::Error as StdError, fmt};

use aliri_base64::Base64Url;
use serde::{Deserialize, Serialize};

use crate::{
    error,
    jwa,
    jwk::{JsonWebKey, KeyId, KeyIdRef},
};

/// A JWS signer
pub trait Signer {
    /// The usable signature algorithms
    type Algorithm;

    /// The error returned on failure to sign
    type Error: fmt::Debug + fmt::Display + Sync + Send + 'static;

    /// Whether the specific algorithm provided is compatible
    /// with this signer
    fn can_sign(&self, alg: Self::Algorithm) -> bool;

    /// Attempts to sign the data provided using the specified algorithm
    fn sign(&self, alg: Self::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error>;
}

/// A JWS verifier
pub trait Verifier {
    /// The verifiable signature algorithms
    type Algorithm;

    /// The error returned on a failure to verify
    type Error: StdError + Send + Sync + 'static;

    /// Whether the specific algorithm provided is compatible
    /// with this verifier
    fn can_verify(&self, alg: Self::Algorithm) -> bool;

    /// Attempts to verify the data against the signature using the
    /// specified algorithm
    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error>;
}

/// The JOSE header of an attestation token
///
/// Registered header parameters are mapped by name; any other members are
/// ignored when parsing. When serialized, only the parameters that are set
/// are written, always in the same order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<KeyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jwk: Option<JsonWebKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x5u: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x5c: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x5t: Option<String>,
    #[serde(
        rename = "x5t#S256",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    x5t_s256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crit: Option<Vec<String>>,
}

impl Header {
    /// Constructs an empty header
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs the header of an unsecured token, `{"alg":"none"}`
    pub fn unsecured() -> Self {
        Self::new().with_algorithm(jwa::Algorithm::NONE)
    }

    /// The `alg` parameter
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    /// Whether the token declares itself unsecured (`"alg": "none"`)
    #[must_use]
    pub fn is_unsecured(&self) -> bool {
        self.algorithm() == Some(jwa::Algorithm::NONE)
    }

    /// The `kid` parameter
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.kid.as_deref()
    }

    /// The `typ` parameter
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.typ.as_deref()
    }

    /// The `cty` parameter
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.cty.as_deref()
    }

    /// The `jku` parameter
    #[must_use]
    pub fn key_url(&self) -> Option<&str> {
        self.jku.as_deref()
    }

    /// The embedded `jwk` parameter
    #[must_use]
    pub fn key(&self) -> Option<&JsonWebKey> {
        self.jwk.as_ref()
    }

    /// The `x5u` parameter
    #[must_use]
    pub fn certificate_url(&self) -> Option<&str> {
        self.x5u.as_deref()
    }

    /// The `x5c` parameter, standard base64 DER certificates with the leaf first
    #[must_use]
    pub fn certificate_chain(&self) -> Option<&[String]> {
        self.x5c.as_deref()
    }

    /// The `x5t` parameter (SHA-1 thumbprint)
    #[must_use]
    pub fn certificate_thumbprint(&self) -> Option<&str> {
        self.x5t.as_deref()
    }

    /// The `x5t#S256` parameter (SHA-256 thumbprint)
    #[must_use]
    pub fn certificate_sha256_thumbprint(&self) -> Option<&str> {
        self.x5t_s256.as_deref()
    }

    /// The `crit` parameter
    #[must_use]
    pub fn critical(&self) -> Option<&[String]> {
        self.crit.as_deref()
    }

    /// Sets the `alg` parameter
    pub fn with_algorithm(self, alg: impl Into<String>) -> Self {
        Self {
            alg: Some(alg.into()),
            ..self
        }
    }

    /// Sets the `kid` parameter
    pub fn with_key_id(self, kid: impl Into<KeyId>) -> Self {
        Self {
            kid: Some(kid.into()),
            ..self
        }
    }

    /// Sets the `typ` parameter
    pub fn with_token_type(self, typ: impl Into<String>) -> Self {
        Self {
            typ: Some(typ.into()),
            ..self
        }
    }

    /// Sets the `cty` parameter
    pub fn with_content_type(self, cty: impl Into<String>) -> Self {
        Self {
            cty: Some(cty.into()),
            ..self
        }
    }

    /// Sets the `jku` parameter
    pub fn with_key_url(self, jku: impl Into<String>) -> Self {
        Self {
            jku: Some(jku.into()),
            ..self
        }
    }

    /// Embeds a key in the `jwk` parameter
    pub fn with_key(self, jwk: JsonWebKey) -> Self {
        Self {
            jwk: Some(jwk),
            ..self
        }
    }

    /// Sets the `x5u` parameter
    pub fn with_certificate_url(self, x5u: impl Into<String>) -> Self {
        Self {
            x5u: Some(x5u.into()),
            ..self
        }
    }

    /// Sets the `x5c` parameter
    pub fn with_certificate_chain(self, x5c: Vec<String>) -> Self {
        Self {
            x5c: Some(x5c),
            ..self
        }
    }

    /// Sets the `x5t` parameter
    pub fn with_certificate_thumbprint(self, x5t: impl Into<String>) -> Self {
        Self {
            x5t: Some(x5t.into()),
            ..self
        }
    }

    /// Sets the `x5t#S256` parameter
    pub fn with_certificate_sha256_thumbprint(self, x5t: impl Into<String>) -> Self {
        Self {
            x5t_s256: Some(x5t.into()),
            ..self
        }
    }

    /// Sets the `crit` parameter
    pub fn with_critical(self, crit: Vec<String>) -> Self {
        Self {
            crit: Some(crit),
            ..self
        }
    }
}

/// A compact JWS split into its segments
///
/// `message` is the exact `header "." body` substring of the original text,
/// which is what the signature covers.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Decomposed<'a> {
    pub(crate) header: Header,
    pub(crate) message: &'a str,
    pub(crate) body: &'a str,
    pub(crate) signature: Base64Url,
}

impl<'a> Decomposed<'a> {
    pub(crate) fn decompose(raw: &'a str) -> Result<Self, error::TokenParseError> {
        let mut segments = raw.splitn(3, '.');
        let (h_str, body, s_str) = match (segments.next(), segments.next(), segments.next()) {
            (Some(h), Some(b), Some(s)) => (h, b, s),
            (Some(_), Some(_), None) => {
                return Err(error::missing_separator("signature").into())
            }
            _ => return Err(error::missing_separator("body").into()),
        };

        let message = &raw[..h_str.len() + 1 + body.len()];

        let h_raw = Base64Url::from_encoded(h_str).map_err(error::malformed_token_header)?;
        let h_value: serde_json::Value =
            serde_json::from_slice(h_raw.as_slice()).map_err(error::malformed_token_header)?;
        if !h_value.is_object() {
            return Err(error::malformed_token_header("header is not a JSON object").into());
        }
        let header = Header::deserialize(h_value).map_err(error::malformed_token_header)?;
        let signature = Base64Url::from_encoded(s_str).map_err(error::malformed_token_signature)?;

        tracing::trace!(
            token.alg = ?header.algorithm(),
            token.kid = ?header.key_id(),
            "decomposed compact JWS"
        );

        Ok(Self {
            header,
            message,
            body,
            signature,
        })
    }
}
