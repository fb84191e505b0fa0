//! Token signers and the resolution of candidate signers for verification
//!
//! A signer is identified by an optional key ID and carries the certificate
//! chain whose leaf certifies the signing key. Candidates are taken either
//! from a set supplied by the caller, usually the attestation service's
//! published signing certificates, or from the token header itself.

use serde::{Deserialize, Serialize};

use crate::{
    error, jwa,
    jwk::{JsonWebKey, KeyId, KeyIdRef},
    jws::{Header, Verifier},
    x509::{self, Certificate},
};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// An entity capable of signing attestation tokens
///
/// The certificate chain is held as PEM documents with the leaf certificate
/// first. When serialized, the chain is written as the `x5c` member in
/// standard base64 DER, alongside the `kid`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SignerDto", into = "SignerDto")]
#[must_use]
pub struct AttestationSigner {
    key_id: Option<KeyId>,
    certificate_chain: Vec<String>,
}

impl AttestationSigner {
    /// Constructs a signer from a key ID and a leaf-first chain of PEM certificates
    pub fn new(key_id: Option<KeyId>, certificate_chain: Vec<String>) -> Self {
        Self {
            key_id,
            certificate_chain,
        }
    }

    /// Constructs a signer without a key ID whose chain is the given certificate
    ///
    /// # Errors
    ///
    /// The certificate could not be re-encoded.
    pub fn from_certificate(certificate: &Certificate) -> Result<Self, error::Unexpected> {
        Ok(Self::new(None, vec![certificate.to_pem()?]))
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: impl Into<KeyId>) -> Self {
        Self {
            key_id: Some(kid.into()),
            ..self
        }
    }

    /// The key ID of this signer
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The PEM certificate chain, leaf first
    #[must_use]
    pub fn certificate_chain(&self) -> &[String] {
        &self.certificate_chain
    }

    /// Imports the leaf certificate of the chain
    ///
    /// # Errors
    ///
    /// The chain is empty or its first entry is not a supported certificate.
    pub fn leaf_certificate(&self) -> Result<Certificate, error::CertificateRejected> {
        let leaf = self
            .certificate_chain
            .first()
            .ok_or_else(|| error::certificate_rejected("signer has no certificates"))?;

        Certificate::import(leaf)
    }

    /// Verifies `signature` over `data` with the key of the leaf certificate
    ///
    /// # Errors
    ///
    /// The leaf certificate could not be imported, its key is not compatible
    /// with `alg`, or the signature does not match.
    pub fn verify(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignerVerifyError> {
        let leaf = self.leaf_certificate()?;
        leaf.public_key().verify(alg, data, signature)?;
        Ok(())
    }

    /// Verifies `signature` over `data` when the token names the key type
    /// (`RSA` or `EC`) in place of a signature algorithm
    ///
    /// The algorithm is the one the leaf certificate's key signs with.
    ///
    /// # Errors
    ///
    /// The leaf certificate could not be imported, its key is of a different
    /// type, or the signature does not match.
    pub fn verify_with_key_type(
        &self,
        key_type: &str,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignerVerifyError> {
        let leaf = self.leaf_certificate()?;
        if leaf.key_type() != key_type {
            return Err(error::KeyVerifyError::from(error::signature_mismatch()).into());
        }

        leaf.public_key().verify(leaf.algorithm(), data, signature)?;
        Ok(())
    }
}

impl From<&'_ JsonWebKey> for AttestationSigner {
    fn from(jwk: &JsonWebKey) -> Self {
        Self {
            key_id: jwk.key_id().map(|k| k.to_owned()),
            certificate_chain: jwk
                .certificate_chain()
                .iter()
                .map(|c| x509::pem_from_base64(c, CERTIFICATE_LABEL))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SignerDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<KeyId>,
    #[serde(default)]
    x5c: Vec<String>,
}

impl From<SignerDto> for AttestationSigner {
    fn from(dto: SignerDto) -> Self {
        Self {
            key_id: dto.kid,
            certificate_chain: dto
                .x5c
                .iter()
                .map(|c| x509::pem_from_base64(c, CERTIFICATE_LABEL))
                .collect(),
        }
    }
}

impl From<AttestationSigner> for SignerDto {
    fn from(signer: AttestationSigner) -> Self {
        Self {
            kid: signer.key_id,
            x5c: signer
                .certificate_chain
                .iter()
                .map(|pem| x509::base64_from_pem(pem))
                .collect(),
        }
    }
}

/// The signing key material a token header offers
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum KeyMaterial {
    /// The header carries neither an embedded key nor a certificate chain
    None,

    /// The header embeds a JSON Web Key (`jwk`)
    EmbeddedKey(AttestationSigner),

    /// The header carries a certificate chain (`x5c`)
    CertificateChain(AttestationSigner),

    /// The header carries both an embedded key and a certificate chain
    Both {
        /// The signer derived from the embedded key
        embedded: AttestationSigner,
        /// The signer derived from the certificate chain
        chain: AttestationSigner,
    },
}

impl KeyMaterial {
    /// Determines the key material offered by `header`
    pub fn from_header(header: &Header) -> Self {
        let embedded = header.key().map(AttestationSigner::from);
        let chain = header.certificate_chain().map(|x5c| {
            AttestationSigner::new(
                None,
                x5c.iter()
                    .map(|c| x509::pem_from_base64(c, CERTIFICATE_LABEL))
                    .collect(),
            )
        });

        match (embedded, chain) {
            (None, None) => Self::None,
            (Some(embedded), None) => Self::EmbeddedKey(embedded),
            (None, Some(chain)) => Self::CertificateChain(chain),
            (Some(embedded), Some(chain)) => Self::Both { embedded, chain },
        }
    }

    /// Whether the header offered no key material
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The candidate signers in resolution order: embedded key first, then chain
    #[must_use]
    pub fn into_candidates(self) -> Vec<AttestationSigner> {
        match self {
            Self::None => Vec::new(),
            Self::EmbeddedKey(s) | Self::CertificateChain(s) => vec![s],
            Self::Both { embedded, chain } => vec![embedded, chain],
        }
    }
}

/// Determines the signers that may have signed a token with the given header
///
/// When `external` is not empty, it is authoritative: if the header names a
/// `kid`, only signers with that key ID are returned, otherwise every signer
/// is. When `external` is empty, the candidates come from the key material
/// in the header. An empty result is not an error here; verification reports
/// the failure.
#[must_use]
pub fn resolve_candidates(
    header: &Header,
    external: &[AttestationSigner],
) -> Vec<AttestationSigner> {
    let candidates: Vec<AttestationSigner> = if external.is_empty() {
        KeyMaterial::from_header(header).into_candidates()
    } else if let Some(kid) = header.key_id() {
        external
            .iter()
            .filter(|s| s.key_id() == Some(kid))
            .cloned()
            .collect()
    } else {
        external.to_vec()
    };

    tracing::trace!(
        token.kid = ?header.key_id(),
        external = external.len(),
        candidates = candidates.len(),
        "resolved candidate signers"
    );

    candidates
}
