//! Registered JSON Web Token (JWT) claims
//!
//! The specifications for this standard can be found in [RFC7519][].
//!
//! [RFC7519]: https://tools.ietf.org/html/rfc7519

use aliri_braid::braid;
use aliri_clock::{Clock, System, UnixTime};
use serde::{Deserialize, Serialize};

/// The issuer of a token (`iss`)
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a token (`sub`)
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// The intended audience of a token (`aud`)
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// The unique identifier of a token (`jti`)
#[braid(serde, ref_doc = "A borrowed reference to a [`TokenId`]")]
pub struct TokenId;

/// The registered claims found in the body of an attestation token
///
/// Time claims are whole seconds since the Unix epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct RegisteredClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<TokenId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
}

impl RegisteredClaims {
    /// An empty set of claims
    pub const fn new() -> Self {
        Self {
            iss: None,
            sub: None,
            aud: None,
            jti: None,
            iat: None,
            nbf: None,
            exp: None,
        }
    }

    /// The `iss` claim
    #[must_use]
    pub fn issuer(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    /// The `sub` claim
    #[must_use]
    pub fn subject(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }

    /// The `aud` claim
    #[must_use]
    pub fn audience(&self) -> Option<&AudienceRef> {
        self.aud.as_deref()
    }

    /// The `jti` claim
    #[must_use]
    pub fn token_id(&self) -> Option<&TokenIdRef> {
        self.jti.as_deref()
    }

    /// The `iat` claim
    #[must_use]
    pub fn issued_at(&self) -> Option<UnixTime> {
        self.iat
    }

    /// The `nbf` claim
    #[must_use]
    pub fn not_before(&self) -> Option<UnixTime> {
        self.nbf
    }

    /// The `exp` claim
    #[must_use]
    pub fn expiration(&self) -> Option<UnixTime> {
        self.exp
    }

    /// Sets the issuer
    pub fn with_issuer(mut self, iss: impl Into<Issuer>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the subject
    pub fn with_subject(mut self, sub: impl Into<Subject>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets the audience
    pub fn with_audience(mut self, aud: impl Into<Audience>) -> Self {
        self.aud = Some(aud.into());
        self
    }

    /// Sets the unique token identifier
    pub fn with_token_id(mut self, jti: impl Into<TokenId>) -> Self {
        self.jti = Some(jti.into());
        self
    }

    /// Sets the issued-at time
    pub fn with_issued_at(mut self, time: UnixTime) -> Self {
        self.iat = Some(time);
        self
    }

    /// Sets the not-before time
    pub fn with_not_before(mut self, time: UnixTime) -> Self {
        self.nbf = Some(time);
        self
    }

    /// Sets the expiration time
    pub fn with_expiration(mut self, time: UnixTime) -> Self {
        self.exp = Some(time);
        self
    }

    /// Sets the expiration time to `secs` seconds in the future
    pub fn with_future_expiration(self, secs: u64) -> Self {
        self.with_future_expiration_from_clock(secs, &System)
    }

    /// Sets the expiration time to `secs` seconds after the clock's current time
    pub fn with_future_expiration_from_clock<C: Clock>(mut self, secs: u64, clock: &C) -> Self {
        let n = clock.now();
        self.exp = Some(UnixTime(n.0 + secs));
        self
    }
}
