//! Common errors

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use aliri_clock::UnixTime;
use thiserror::Error;

use crate::jwa;

/// A boxed error, as returned by body codecs and validation callbacks
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The key cannot be used with the requested algorithm
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key incompatible with algorithm '{alg}'")]
pub struct IncompatibleAlgorithm {
    alg: jwa::Algorithm,
}

#[inline]
pub(crate) fn incompatible_algorithm(alg: jwa::Algorithm) -> IncompatibleAlgorithm {
    IncompatibleAlgorithm { alg }
}

/// The provided name could not be matched with supported algorithms
#[derive(Debug, Error)]
#[error("'{alg}' does not match supported algorithms")]
pub struct UnknownAlgorithm {
    alg: String,
}

#[inline]
pub(crate) fn unknown_algorithm(alg: String) -> UnknownAlgorithm {
    UnknownAlgorithm { alg }
}

/// The token does not contain one of its two required `.` separators
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("malformed token: could not find the required '.' separator before the {segment} segment")]
pub struct MissingSeparator {
    segment: &'static str,
}

impl MissingSeparator {
    /// The segment that should have followed the missing separator
    #[must_use]
    pub fn segment(&self) -> &'static str {
        self.segment
    }
}

pub(crate) const fn missing_separator(segment: &'static str) -> MissingSeparator {
    MissingSeparator { segment }
}

/// The token header segment is malformed
#[derive(Debug, Error)]
#[error("malformed token header")]
pub struct MalformedTokenHeader {
    #[from]
    source: BoxError,
}

pub(crate) fn malformed_token_header(source: impl Into<BoxError>) -> MalformedTokenHeader {
    MalformedTokenHeader {
        source: source.into(),
    }
}

/// The token body segment is malformed
#[derive(Debug, Error)]
#[error("malformed token body")]
pub struct MalformedTokenBody {
    #[from]
    source: BoxError,
}

pub(crate) fn malformed_token_body(source: impl Into<BoxError>) -> MalformedTokenBody {
    MalformedTokenBody {
        source: source.into(),
    }
}

/// The token signature segment is malformed
#[derive(Debug, Error)]
#[error("malformed token signature")]
pub struct MalformedTokenSignature {
    #[from]
    source: BoxError,
}

pub(crate) fn malformed_token_signature(source: impl Into<BoxError>) -> MalformedTokenSignature {
    MalformedTokenSignature {
        source: source.into(),
    }
}

/// The signature did not match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// The key was rejected
#[derive(Debug, Error)]
#[error("key rejected")]
pub struct KeyRejected {
    #[from]
    source: BoxError,
}

pub(crate) fn key_rejected(source: impl Into<BoxError>) -> KeyRejected {
    KeyRejected {
        source: source.into(),
    }
}

/// The X.509 certificate was rejected
#[derive(Debug, Error)]
#[error("certificate rejected")]
pub struct CertificateRejected {
    #[from]
    source: BoxError,
}

pub(crate) fn certificate_rejected(source: impl Into<BoxError>) -> CertificateRejected {
    CertificateRejected {
        source: source.into(),
    }
}

/// The private key does not belong to the certificate it was paired with
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("private key does not match the public key of the signing certificate")]
pub struct KeyMismatch {
    _p: (),
}

pub(crate) const fn key_mismatch() -> KeyMismatch {
    KeyMismatch { _p: () }
}

/// Unexpected error (possibly a bug)
#[derive(Debug, Error)]
#[error("unexpected error")]
pub struct Unexpected {
    #[from]
    source: BoxError,
}

pub(crate) fn unexpected(source: impl Into<BoxError>) -> Unexpected {
    Unexpected {
        source: source.into(),
    }
}

/// No candidate signer was able to verify the token signature
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("Unable to verify the attestation token signature.")]
pub struct UnverifiedSignature {
    candidates: usize,
}

impl UnverifiedSignature {
    /// The number of candidate signers that were tried
    #[must_use]
    pub fn candidates(&self) -> usize {
        self.candidates
    }

    /// Whether verification failed because no signer material was available at all
    #[must_use]
    pub fn no_signer_material(&self) -> bool {
        self.candidates == 0
    }
}

pub(crate) const fn unverified_signature(candidates: usize) -> UnverifiedSignature {
    UnverifiedSignature { candidates }
}

/// The token expiration time has passed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("Attestation token has expired. Token expiration time: {expires_at}. Current time: {now}")]
pub struct TokenExpired {
    expires_at: u64,
    now: u64,
}

impl TokenExpired {
    /// The `exp` claim of the token
    #[must_use]
    pub fn expires_at(&self) -> UnixTime {
        UnixTime(self.expires_at)
    }

    /// The time at which the token was checked
    #[must_use]
    pub fn now(&self) -> UnixTime {
        UnixTime(self.now)
    }
}

pub(crate) const fn token_expired(expires_at: UnixTime, now: UnixTime) -> TokenExpired {
    TokenExpired {
        expires_at: expires_at.0,
        now: now.0,
    }
}

/// The token is not valid until some time in the future
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("Attestation token is not yet valid. Token becomes valid at time: {not_before}. Current time: {now}")]
pub struct TokenNotYetValid {
    not_before: u64,
    now: u64,
}

impl TokenNotYetValid {
    /// The `nbf` claim of the token
    #[must_use]
    pub fn not_before(&self) -> UnixTime {
        UnixTime(self.not_before)
    }

    /// The time at which the token was checked
    #[must_use]
    pub fn now(&self) -> UnixTime {
        UnixTime(self.now)
    }
}

pub(crate) const fn token_not_yet_valid(not_before: UnixTime, now: UnixTime) -> TokenNotYetValid {
    TokenNotYetValid {
        not_before: not_before.0,
        now: now.0,
    }
}

/// Issuer validation was requested but the token has no `iss` claim
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("Attestation token issuer validation requested but token has no issuer.")]
pub struct MissingIssuer {
    _p: (),
}

pub(crate) const fn missing_issuer() -> MissingIssuer {
    MissingIssuer { _p: () }
}

/// The token issuer is not the expected issuer
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("Expected issuer ({expected}) does not match actual issuer of token ({actual})")]
pub struct IssuerMismatch {
    expected: String,
    actual: String,
}

impl IssuerMismatch {
    /// The issuer the caller required
    #[must_use]
    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// The issuer found in the token
    #[must_use]
    pub fn actual(&self) -> &str {
        &self.actual
    }
}

pub(crate) fn issuer_mismatch(expected: &str, actual: &str) -> IssuerMismatch {
    IssuerMismatch {
        expected: expected.to_owned(),
        actual: actual.to_owned(),
    }
}

/// An error occurring while creating a signature
#[derive(Debug, Error)]
pub enum SigningError {
    /// The key cannot be used with this algorithm
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// An unexpected error
    #[error(transparent)]
    Unexpected(#[from] Unexpected),
}

/// An error occurring while verifying a signature with a public key
#[derive(Debug, Error)]
pub enum KeyVerifyError {
    /// The key cannot be used with this algorithm
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// Signature is invalid
    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatch),
}

impl KeyVerifyError {
    /// Whether the error is due to an incompatible algorithm
    #[must_use]
    pub fn is_incompatible_alg(&self) -> bool {
        matches!(self, Self::IncompatibleAlgorithm(_))
    }

    /// Whether the error is due to a signature mismatch
    #[must_use]
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, Self::SignatureMismatch(_))
    }
}

/// An error occurring while verifying a signature with a candidate signer
#[derive(Debug, Error)]
pub enum SignerVerifyError {
    /// The signer's leaf certificate could not be imported
    #[error(transparent)]
    CertificateRejected(#[from] CertificateRejected),

    /// The leaf certificate's key rejected the signature
    #[error(transparent)]
    KeyVerifyError(#[from] KeyVerifyError),
}

/// An error occurring while parsing a compact JWS
#[derive(Debug, Error)]
pub enum TokenParseError {
    /// The token is missing one of its separators
    #[error(transparent)]
    MissingSeparator(#[from] MissingSeparator),

    /// The token header is malformed
    #[error(transparent)]
    MalformedTokenHeader(#[from] MalformedTokenHeader),

    /// The token body is malformed
    #[error(transparent)]
    MalformedTokenBody(#[from] MalformedTokenBody),

    /// The token signature is malformed
    #[error(transparent)]
    MalformedTokenSignature(#[from] MalformedTokenSignature),
}

impl TokenParseError {
    /// Whether the error is due to a missing separator
    #[must_use]
    pub fn is_missing_separator(&self) -> bool {
        matches!(self, Self::MissingSeparator(_))
    }

    /// Whether the error is due to a malformed header
    #[must_use]
    pub fn is_malformed_header(&self) -> bool {
        matches!(self, Self::MalformedTokenHeader(_))
    }

    /// Whether the error is due to a malformed body
    #[must_use]
    pub fn is_malformed_body(&self) -> bool {
        matches!(self, Self::MalformedTokenBody(_))
    }

    /// Whether the error is due to a malformed signature
    #[must_use]
    pub fn is_malformed_signature(&self) -> bool {
        matches!(self, Self::MalformedTokenSignature(_))
    }
}

/// An error occurring while validating an attestation token
#[derive(Debug, Error)]
pub enum TokenValidationError {
    /// No candidate signer verified the token signature
    #[error(transparent)]
    UnverifiedSignature(#[from] UnverifiedSignature),

    /// The token has expired
    #[error(transparent)]
    TokenExpired(#[from] TokenExpired),

    /// The token is not yet valid
    #[error(transparent)]
    TokenNotYetValid(#[from] TokenNotYetValid),

    /// The token has no issuer but one was required
    #[error(transparent)]
    MissingIssuer(#[from] MissingIssuer),

    /// The token issuer is not the expected one
    #[error(transparent)]
    IssuerMismatch(#[from] IssuerMismatch),

    /// The validation callback rejected the token
    #[error(transparent)]
    Rejected(BoxError),
}

impl TokenValidationError {
    /// Whether the error is due to a failure to verify the signature
    #[must_use]
    pub fn is_signature_failure(&self) -> bool {
        matches!(self, Self::UnverifiedSignature(_))
    }

    /// Whether the error is due to the token being expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::TokenExpired(_))
    }

    /// Whether the error is due to the token not being valid yet
    #[must_use]
    pub fn is_not_yet_valid(&self) -> bool {
        matches!(self, Self::TokenNotYetValid(_))
    }

    /// Whether the error is due to the token being expired or not yet valid
    #[must_use]
    pub fn is_time_failure(&self) -> bool {
        matches!(self, Self::TokenExpired(_) | Self::TokenNotYetValid(_))
    }

    /// Whether the error is due to a missing or mismatched issuer
    #[must_use]
    pub fn is_issuer_failure(&self) -> bool {
        matches!(self, Self::MissingIssuer(_) | Self::IssuerMismatch(_))
    }

    /// Whether the error was raised by the validation callback
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// An error occurring while creating an attestation token
#[derive(Debug, Error)]
pub enum TokenCreationError {
    /// The signing certificate could not be imported
    #[error(transparent)]
    CertificateRejected(#[from] CertificateRejected),

    /// The signing key could not be imported
    #[error(transparent)]
    KeyRejected(#[from] KeyRejected),

    /// The signing key and certificate do not belong together
    #[error(transparent)]
    KeyMismatch(#[from] KeyMismatch),

    /// The header could not be serialized
    #[error(transparent)]
    MalformedTokenHeader(#[from] MalformedTokenHeader),

    /// The body could not be serialized
    #[error(transparent)]
    MalformedTokenBody(#[from] MalformedTokenBody),

    /// The signature could not be produced
    #[error(transparent)]
    SigningError(#[from] SigningError),

    /// The produced token could not be read back
    #[error(transparent)]
    TokenParseError(#[from] TokenParseError),

    /// An unexpected error
    #[error(transparent)]
    Unexpected(#[from] Unexpected),
}
