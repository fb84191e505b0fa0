//! Validation of attestation tokens
//!
//! Validation proceeds through a fixed sequence of checks, stopping at the
//! first failure:
//!
//! 1. the signature, verified against the candidate signers resolved for the
//!    token header (skipped for unsecured tokens);
//! 2. the `exp` and `nbf` time claims, with a configurable slack;
//! 3. the `iss` claim, if an issuer is required;
//! 4. a caller-supplied callback, which sees the token and the signer that
//!    verified it.

use std::{fmt, sync::Arc, time::Duration};

use aliri_clock::{Clock, System, UnixTime};
use serde::{Deserialize, Deserializer};

use crate::{
    error::{self, BoxError},
    jwa,
    jwt::{Issuer, IssuerRef},
    signer::{self, AttestationSigner},
    token::AttestationToken,
};

const KEY_TYPE_NAMES: [&str; 2] = ["RSA", "EC"];

/// A callback invoked once every other validation check has passed
///
/// The callback receives the token without its decoded body, and the signer
/// that verified the signature, which is empty if signature verification was
/// skipped. An error returned by the callback rejects the token and is
/// reported unchanged as [`TokenValidationError::Rejected`][error::TokenValidationError::Rejected].
pub type ValidationCallback =
    Arc<dyn Fn(&AttestationToken, &AttestationSigner) -> Result<(), BoxError> + Send + Sync>;

/// The checks to apply when validating an attestation token
///
/// By default, the signature and the `exp` and `nbf` claims are validated
/// with no slack, and the issuer is not checked.
///
/// Options may also be read from configuration. The slack is given in whole
/// seconds as `time_slack_secs`; the callback can only be set in code.
///
/// ```
/// use attestation_token::{jwt, ValidationOptions};
///
/// let options = ValidationOptions::new()
///     .with_leeway_secs(30)
///     .require_issuer(jwt::Issuer::from_static("https://attest.example.test"));
///
/// assert!(options.validate_issuer());
/// assert_eq!(options.time_slack().as_secs(), 30);
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
#[must_use]
pub struct ValidationOptions {
    validate_token: bool,
    validate_signer: bool,
    validate_expiration: bool,
    validate_not_before: bool,
    validate_issuer: bool,
    expected_issuer: Option<Issuer>,
    #[serde(rename = "time_slack_secs", deserialize_with = "duration_from_secs")]
    time_slack: Duration,
    #[serde(skip)]
    callback: Option<ValidationCallback>,
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl Default for ValidationOptions {
    #[inline]
    fn default() -> Self {
        Self {
            validate_token: true,
            validate_signer: true,
            validate_expiration: true,
            validate_not_before: true,
            validate_issuer: false,
            expected_issuer: None,
            time_slack: Duration::default(),
            callback: None,
        }
    }
}

impl fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ValidationOptions")
            .field("validate_token", &self.validate_token)
            .field("validate_signer", &self.validate_signer)
            .field("validate_expiration", &self.validate_expiration)
            .field("validate_not_before", &self.validate_not_before)
            .field("validate_issuer", &self.validate_issuer)
            .field("expected_issuer", &self.expected_issuer)
            .field("time_slack", &self.time_slack)
            .field("callback", &self.callback.as_ref().map(|_| "Fn"))
            .finish()
    }
}

impl ValidationOptions {
    /// The default set of checks
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips validation entirely; every token is accepted
    #[inline]
    pub fn skip_validation(self) -> Self {
        Self {
            validate_token: false,
            ..self
        }
    }

    /// Skips signature verification
    #[inline]
    pub fn ignore_signer(self) -> Self {
        Self {
            validate_signer: false,
            ..self
        }
    }

    /// Enforces signature verification
    #[inline]
    pub fn check_signer(self) -> Self {
        Self {
            validate_signer: true,
            ..self
        }
    }

    /// Skips expiration checks
    #[inline]
    pub fn ignore_expiration(self) -> Self {
        Self {
            validate_expiration: false,
            ..self
        }
    }

    /// Enforces expiration checks
    #[inline]
    pub fn check_expiration(self) -> Self {
        Self {
            validate_expiration: true,
            ..self
        }
    }

    /// Skips "not valid before" checks
    #[inline]
    pub fn ignore_not_before(self) -> Self {
        Self {
            validate_not_before: false,
            ..self
        }
    }

    /// Enforces "not valid before" checks
    #[inline]
    pub fn check_not_before(self) -> Self {
        Self {
            validate_not_before: true,
            ..self
        }
    }

    /// Requires that the `iss` claim exists and exactly matches `issuer`
    #[inline]
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            validate_issuer: true,
            expected_issuer: Some(issuer),
            ..self
        }
    }

    /// Allows a grace period for token validation
    ///
    /// Applies on either side of the "not before" and "expires" claims.
    /// Only whole seconds are considered.
    #[inline]
    pub fn with_leeway(self, time_slack: Duration) -> Self {
        Self { time_slack, ..self }
    }

    /// Allows a grace period (in seconds) for token validation
    ///
    /// Applies on either side of the "not before" and "expires" claims.
    #[inline]
    pub fn with_leeway_secs(self, secs: u64) -> Self {
        Self {
            time_slack: Duration::from_secs(secs),
            ..self
        }
    }

    /// Adds a callback to run after every other check has passed
    pub fn with_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&AttestationToken, &AttestationSigner) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
            ..self
        }
    }

    /// Whether any validation is performed
    #[must_use]
    pub fn validate_token(&self) -> bool {
        self.validate_token
    }

    /// Whether the signature is verified
    #[must_use]
    pub fn validate_signer(&self) -> bool {
        self.validate_signer
    }

    /// Whether the `exp` claim is checked
    #[must_use]
    pub fn validate_expiration(&self) -> bool {
        self.validate_expiration
    }

    /// Whether the `nbf` claim is checked
    #[must_use]
    pub fn validate_not_before(&self) -> bool {
        self.validate_not_before
    }

    /// Whether the `iss` claim is checked
    #[must_use]
    pub fn validate_issuer(&self) -> bool {
        self.validate_issuer
    }

    /// The issuer required when the `iss` claim is checked
    #[must_use]
    pub fn expected_issuer(&self) -> Option<&IssuerRef> {
        self.expected_issuer.as_deref()
    }

    /// The grace period applied to the time claims
    #[must_use]
    pub fn time_slack(&self) -> Duration {
        self.time_slack
    }
}

impl<T> AttestationToken<T> {
    /// Validates the token against the current system time
    ///
    /// `signers` are the trusted signers of the attestation service. When
    /// empty, the key material in the token header is used instead.
    ///
    /// Returns the signer that verified the signature, or `None` when
    /// signature verification did not take place.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub fn validate(
        &self,
        options: &ValidationOptions,
        signers: &[AttestationSigner],
    ) -> Result<Option<AttestationSigner>, error::TokenValidationError> {
        self.validate_with_clock(options, signers, &System)
    }

    /// Validates the token against the time given by `clock`
    ///
    /// # Errors
    ///
    /// See [`validate()`][Self::validate()].
    pub fn validate_with_clock<C: Clock>(
        &self,
        options: &ValidationOptions,
        signers: &[AttestationSigner],
        clock: &C,
    ) -> Result<Option<AttestationSigner>, error::TokenValidationError> {
        if !options.validate_token {
            tracing::trace!("token validation disabled");
            return Ok(None);
        }

        let signer = match self.header().algorithm() {
            _ if !options.validate_signer => {
                tracing::trace!("signature verification disabled");
                None
            }
            None => {
                tracing::trace!("token has no algorithm, skipping signature verification");
                None
            }
            Some(alg) if alg == jwa::Algorithm::NONE => {
                tracing::trace!("token is unsecured, skipping signature verification");
                None
            }
            Some(alg) => Some(self.verify_signature(alg, signers)?),
        };

        self.check_timing(options, clock.now())?;
        self.check_issuer(options)?;

        if let Some(callback) = &options.callback {
            let empty = AttestationSigner::default();
            callback(&self.to_untyped(), signer.as_ref().unwrap_or(&empty)).map_err(|err| {
                tracing::debug!(error = %err, "token rejected by validation callback");
                error::TokenValidationError::Rejected(err)
            })?;
        }

        tracing::debug!(
            token.alg = self.header().algorithm().unwrap_or_default(),
            token.kid = ?self.header().key_id(),
            "validated attestation token"
        );

        Ok(signer)
    }

    fn verify_signature(
        &self,
        alg: &str,
        signers: &[AttestationSigner],
    ) -> Result<AttestationSigner, error::UnverifiedSignature> {
        let candidates = signer::resolve_candidates(self.header(), signers);
        let count = candidates.len();

        // `RSA` and `EC` name the key type; the key then decides the algorithm
        let named: Option<jwa::Algorithm> = match alg.parse() {
            Ok(named) => Some(named),
            Err(_) if KEY_TYPE_NAMES.contains(&alg) => None,
            Err(err) => {
                tracing::debug!(token.alg = alg, error = %err, "unsupported signature algorithm");
                return Err(error::unverified_signature(count));
            }
        };

        let data = self.signed_elements().as_bytes();
        let signature = self.signature().as_slice();

        for candidate in candidates {
            let verified = match named {
                Some(named) => candidate.verify(named, data, signature),
                None => candidate.verify_with_key_type(alg, data, signature),
            };

            match verified {
                Ok(()) => {
                    tracing::trace!(
                        token.alg = alg,
                        signer.kid = ?candidate.key_id(),
                        "signature verified"
                    );
                    return Ok(candidate);
                }
                Err(err) => tracing::debug!(
                    token.alg = alg,
                    signer.kid = ?candidate.key_id(),
                    error = %err,
                    "candidate signer rejected signature"
                ),
            }
        }

        tracing::debug!(
            token.alg = alg,
            candidates = count,
            "no candidate signer verified the token signature"
        );
        Err(error::unverified_signature(count))
    }

    fn check_timing(
        &self,
        options: &ValidationOptions,
        now: UnixTime,
    ) -> Result<(), error::TokenValidationError> {
        let slack = options.time_slack.as_secs();

        if options.validate_expiration {
            if let Some(exp) = self.claims().expiration() {
                if now.0 > exp.0 && now.0 - exp.0 > slack {
                    tracing::debug!(token.exp = exp.0, now = now.0, slack, "token expired");
                    return Err(error::token_expired(exp, now).into());
                }
            }
        }

        if options.validate_not_before {
            if let Some(nbf) = self.claims().not_before() {
                if now.0 < nbf.0 && nbf.0 - now.0 > slack {
                    tracing::debug!(token.nbf = nbf.0, now = now.0, slack, "token not yet valid");
                    return Err(error::token_not_yet_valid(nbf, now).into());
                }
            }
        }

        Ok(())
    }

    fn check_issuer(&self, options: &ValidationOptions) -> Result<(), error::TokenValidationError> {
        if !options.validate_issuer {
            return Ok(());
        }

        let actual = self.claims().issuer().ok_or_else(|| {
            tracing::debug!("token has no issuer");
            error::missing_issuer()
        })?;

        let expected = options
            .expected_issuer()
            .map(IssuerRef::as_str)
            .unwrap_or_default();

        if actual.as_str() != expected {
            tracing::debug!(
                token.iss = actual.as_str(),
                expected,
                "token issuer mismatch"
            );
            return Err(error::issuer_mismatch(expected, actual.as_str()).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use aliri_base64::Base64Url;
    use aliri_clock::TestClock;
    use color_eyre::Result;
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        builder::SigningKey,
        jwa::{Curve, PrivateKey},
        jwk::KeyId,
        jws::{Header, Signer},
        x509::{self, Certificate},
    };

    const NOW: u64 = 1_700_000_000;

    fn clock(secs: u64) -> TestClock {
        TestClock::new(UnixTime(secs))
    }

    fn unsecured(body: serde_json::Value) -> Result<AttestationToken<serde_json::Value>> {
        Ok(AttestationToken::create(Some(&body), None)?)
    }

    fn rsa_key() -> Result<SigningKey> {
        Ok(SigningKey::self_signed(PrivateKey::generate_rsa()?, "validation")?)
    }

    fn signed_with_header(key: &PrivateKey, header: &Header) -> Result<AttestationToken> {
        let message = format!(
            "{}.{}",
            Base64Url::from_raw(serde_json::to_vec(header)?),
            Base64Url::from_raw(b"{}".to_vec())
        );
        let signature = key.sign(key.default_algorithm(), message.as_bytes())?;

        Ok(AttestationToken::parse_untyped(format!(
            "{}.{}",
            message,
            Base64Url::from_raw(signature)
        ))?)
    }

    fn leaf_base64(signer: &AttestationSigner) -> Option<String> {
        signer
            .certificate_chain()
            .first()
            .map(|pem| x509::base64_from_pem(pem))
    }

    #[test]
    fn expiration_honors_slack_boundary() -> Result<()> {
        let token = unsecured(json!({ "exp": NOW }))?;
        let options = ValidationOptions::new().with_leeway_secs(10);

        token.validate_with_clock(&options, &[], &clock(NOW + 10))?;

        let err = token
            .validate_with_clock(&options, &[], &clock(NOW + 11))
            .unwrap_err();
        assert!(err.is_expired());
        assert_eq!(
            err.to_string(),
            format!(
                "Attestation token has expired. Token expiration time: {}. Current time: {}",
                NOW,
                NOW + 11
            )
        );
        Ok(())
    }

    #[test]
    fn not_before_honors_slack_boundary() -> Result<()> {
        let token = unsecured(json!({ "nbf": NOW }))?;
        let options = ValidationOptions::new().with_leeway(Duration::from_secs(5));

        token.validate_with_clock(&options, &[], &clock(NOW - 5))?;

        let err = token
            .validate_with_clock(&options, &[], &clock(NOW - 6))
            .unwrap_err();
        assert!(err.is_not_yet_valid());
        assert!(err.is_time_failure());
        Ok(())
    }

    #[test]
    fn zero_slack_fails_one_second_late() -> Result<()> {
        let token = unsecured(json!({ "exp": NOW, "nbf": NOW - 60 }))?;
        let options = ValidationOptions::new();

        token.validate_with_clock(&options, &[], &clock(NOW))?;
        assert!(token
            .validate_with_clock(&options, &[], &clock(NOW + 1))
            .unwrap_err()
            .is_expired());
        Ok(())
    }

    #[test]
    fn time_checks_can_be_disabled() -> Result<()> {
        let token = unsecured(json!({ "exp": NOW, "nbf": NOW }))?;

        let options = ValidationOptions::new().ignore_expiration();
        token.validate_with_clock(&options, &[], &clock(NOW + 3600))?;
        assert!(token
            .validate_with_clock(&options, &[], &clock(NOW - 3600))
            .is_err());

        let options = ValidationOptions::new().ignore_not_before();
        token.validate_with_clock(&options, &[], &clock(NOW - 3600))?;

        let options = ValidationOptions::new().skip_validation();
        token.validate_with_clock(&options, &[], &clock(NOW + 3600))?;
        Ok(())
    }

    #[test]
    fn unsecured_token_skips_signature_but_not_claims() -> Result<()> {
        let token = unsecured(json!({ "policy": "v1", "iss": "Fred", "exp": NOW }))?;
        assert_eq!(token.header().algorithm(), Some("none"));
        assert_eq!(token.body().map(|b| &b["policy"]), Some(&json!("v1")));

        let options = ValidationOptions::new().require_issuer(Issuer::from_static("Fred"));
        let signer = token.validate_with_clock(&options, &[], &clock(NOW))?;
        assert!(signer.is_none());

        let err = token
            .validate_with_clock(&options, &[], &clock(NOW + 1))
            .unwrap_err();
        assert!(err.is_expired());
        Ok(())
    }

    #[test]
    fn issuer_must_match_exactly() -> Result<()> {
        let token = unsecured(json!({ "iss": "Fred" }))?;

        let options = ValidationOptions::new().require_issuer(Issuer::from_static("George"));
        let err = token.validate_with_clock(&options, &[], &clock(NOW)).unwrap_err();
        assert!(err.is_issuer_failure());
        assert_eq!(
            err.to_string(),
            "Expected issuer (George) does not match actual issuer of token (Fred)"
        );

        let options = ValidationOptions::new().require_issuer(Issuer::from_static("fred"));
        assert!(token.validate_with_clock(&options, &[], &clock(NOW)).is_err());
        Ok(())
    }

    #[test]
    fn required_issuer_must_be_present() -> Result<()> {
        let token = unsecured(json!({ "sub": "enclave" }))?;
        let options = ValidationOptions::new().require_issuer(Issuer::from_static("Fred"));

        let err = token.validate_with_clock(&options, &[], &clock(NOW)).unwrap_err();
        assert!(matches!(err, error::TokenValidationError::MissingIssuer(_)));
        Ok(())
    }

    #[test]
    fn secured_token_verifies_with_its_certificate() -> Result<()> {
        for key in [
            PrivateKey::generate_rsa()?,
            PrivateKey::generate_ec(Curve::P256)?,
            PrivateKey::generate_ec(Curve::P384)?,
        ] {
            let key = SigningKey::self_signed(key, "validation")?;
            let token = AttestationToken::create(Some(&json!({ "exp": NOW })), Some(&key))?;
            let trusted = key.signer()?.with_key_id(KeyId::from_static("trusted"));

            let signer = token.validate_with_clock(
                &ValidationOptions::new(),
                &[trusted.clone()],
                &clock(NOW),
            )?;
            assert_eq!(signer, Some(trusted));

            let signer = token.validate_with_clock(&ValidationOptions::new(), &[], &clock(NOW))?;
            assert_eq!(
                signer.as_ref().and_then(leaf_base64),
                Some(key.certificate().to_base64()?)
            );
        }
        Ok(())
    }

    #[test]
    fn unrelated_certificate_fails_verification() -> Result<()> {
        let token = AttestationToken::create(Some(&json!({})), Some(&rsa_key()?))?;
        let unrelated = rsa_key()?.signer()?;

        let err = token
            .validate_with_clock(&ValidationOptions::new(), &[unrelated], &clock(NOW))
            .unwrap_err();
        assert!(err.is_signature_failure());
        match err {
            error::TokenValidationError::UnverifiedSignature(e) => assert_eq!(e.candidates(), 1),
            _ => unreachable!(),
        }
        Ok(())
    }

    #[test]
    fn corrupted_signature_passes_only_without_signer_check() -> Result<()> {
        let key = rsa_key()?;
        let token = AttestationToken::create(Some(&json!({ "exp": NOW })), Some(&key))?;
        let mut signature = token.signature().as_slice().to_vec();
        signature[0] ^= 0xff;
        let corrupted = AttestationToken::parse_untyped(format!(
            "{}.{}",
            token.signed_elements(),
            Base64Url::from_raw(signature)
        ))?;

        let err = corrupted
            .validate_with_clock(&ValidationOptions::new(), &[], &clock(NOW))
            .unwrap_err();
        assert!(err.is_signature_failure());

        let options = ValidationOptions::new().ignore_signer();
        assert_eq!(corrupted.validate_with_clock(&options, &[], &clock(NOW))?, None);
        Ok(())
    }

    #[test]
    fn missing_signer_material_is_reported() -> Result<()> {
        // {"alg":"RS256"} . {} . "signature"
        let token = AttestationToken::parse_untyped("eyJhbGciOiJSUzI1NiJ9.e30.c2lnbmF0dXJl")?;

        let err = token
            .validate_with_clock(&ValidationOptions::new(), &[], &clock(NOW))
            .unwrap_err();
        match err {
            error::TokenValidationError::UnverifiedSignature(e) => assert!(e.no_signer_material()),
            _ => unreachable!(),
        }
        Ok(())
    }

    #[test]
    fn unknown_algorithm_fails_verification() -> Result<()> {
        let key = rsa_key()?;
        // {"alg":"HS256"} . {} . "signature"
        let token = AttestationToken::parse_untyped("eyJhbGciOiJIUzI1NiJ9.e30.c2lnbmF0dXJl")?;

        let err = token
            .validate_with_clock(&ValidationOptions::new(), &[key.signer()?], &clock(NOW))
            .unwrap_err();
        assert!(err.is_signature_failure());
        Ok(())
    }

    #[test]
    fn first_verifying_candidate_is_returned() -> Result<()> {
        let key = rsa_key()?;
        let token = AttestationToken::create(Some(&json!({})), Some(&key))?;
        let other = rsa_key()?.signer()?.with_key_id(KeyId::from_static("A"));
        let right = key.signer()?.with_key_id(KeyId::from_static("B"));

        let signer = token.validate_with_clock(
            &ValidationOptions::new(),
            &[other, right.clone()],
            &clock(NOW),
        )?;
        assert_eq!(signer, Some(right));
        Ok(())
    }

    #[test]
    fn every_signer_sharing_the_kid_is_tried() -> Result<()> {
        let key = PrivateKey::generate_rsa()?;
        let cert = Certificate::self_signed(&key, "shared kid")?;
        let header = Header::new()
            .with_algorithm("RS256")
            .with_key_id(KeyId::from_static("A"));
        let token = signed_with_header(&key, &header)?;

        let stale = rsa_key()?.signer()?.with_key_id(KeyId::from_static("A"));
        let current = AttestationSigner::from_certificate(&cert)?
            .with_key_id(KeyId::from_static("A"));
        let unrelated = AttestationSigner::from_certificate(&cert)?
            .with_key_id(KeyId::from_static("B"));

        let signer = token.validate_with_clock(
            &ValidationOptions::new(),
            &[stale.clone(), unrelated, current.clone()],
            &clock(NOW),
        )?;
        assert_eq!(signer, Some(current));

        let err = token
            .validate_with_clock(&ValidationOptions::new(), &[stale], &clock(NOW))
            .unwrap_err();
        assert!(err.is_signature_failure());
        Ok(())
    }

    #[test]
    fn non_ascii_certificate_chain_fails_verification() -> Result<()> {
        let header = json!({ "alg": "RS256", "x5c": [format!("{}\u{e9}", "A".repeat(63))] });
        let token = AttestationToken::parse_untyped(format!(
            "{}.e30.c2ln",
            Base64Url::from_raw(serde_json::to_vec(&header)?)
        ))?;

        let err = token
            .validate_with_clock(&ValidationOptions::new(), &[], &clock(NOW))
            .unwrap_err();
        match err {
            error::TokenValidationError::UnverifiedSignature(e) => assert_eq!(e.candidates(), 1),
            _ => unreachable!(),
        }
        Ok(())
    }

    #[test]
    fn key_type_algorithm_names_are_verified_by_key() -> Result<()> {
        for (key, key_type) in [
            (PrivateKey::generate_rsa()?, "RSA"),
            (PrivateKey::generate_ec(Curve::P256)?, "EC"),
            (PrivateKey::generate_ec(Curve::P384)?, "EC"),
        ] {
            let cert = Certificate::self_signed(&key, "key type")?;
            let header = Header::new()
                .with_algorithm(key_type)
                .with_certificate_chain(vec![cert.to_base64()?]);
            let token = signed_with_header(&key, &header)?;

            let signer = token.validate_with_clock(&ValidationOptions::new(), &[], &clock(NOW))?;
            assert_eq!(
                signer.as_ref().and_then(leaf_base64),
                Some(cert.to_base64()?)
            );
        }

        let key = PrivateKey::generate_ec(Curve::P256)?;
        let cert = Certificate::self_signed(&key, "wrong key type")?;
        let header = Header::new()
            .with_algorithm("RSA")
            .with_certificate_chain(vec![cert.to_base64()?]);
        let err = signed_with_header(&key, &header)?
            .validate_with_clock(&ValidationOptions::new(), &[], &clock(NOW))
            .unwrap_err();
        assert!(err.is_signature_failure());
        Ok(())
    }

    #[test]
    fn callback_sees_signer_and_can_reject() -> Result<()> {
        let key = rsa_key()?;
        let token = AttestationToken::create(Some(&json!({ "x-ms-ver": "1.0" })), Some(&key))?;
        let seen = Arc::new(Mutex::new(None));

        let record = Arc::clone(&seen);
        let options = ValidationOptions::new().with_callback(move |token, signer| {
            if let Ok(mut seen) = record.lock() {
                *seen = Some((token.raw_token().to_owned(), leaf_base64(signer)));
            }
            Ok(())
        });
        token.validate_with_clock(&options, &[], &clock(NOW))?;

        let seen = seen.lock().map_err(|_| color_eyre::eyre::eyre!("poisoned"))?.clone();
        assert_eq!(
            seen,
            Some((token.raw_token().to_owned(), Some(key.certificate().to_base64()?)))
        );

        let options = ValidationOptions::new().with_callback(|_, _| Err("policy says no".into()));
        let err = token.validate_with_clock(&options, &[], &clock(NOW)).unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(err.to_string(), "policy says no");
        Ok(())
    }

    #[test]
    fn callback_gets_empty_signer_when_signature_skipped() -> Result<()> {
        let token = unsecured(json!({}))?;
        let options = ValidationOptions::new().with_callback(|_, signer| {
            if signer == &AttestationSigner::default() {
                Ok(())
            } else {
                Err("expected an empty signer".into())
            }
        });

        token.validate_with_clock(&options, &[], &clock(NOW))?;
        Ok(())
    }

    #[test]
    fn callback_runs_after_other_checks() -> Result<()> {
        let token = unsecured(json!({ "exp": NOW }))?;
        let options = ValidationOptions::new().with_callback(|_, _| Err("callback ran".into()));

        let err = token
            .validate_with_clock(&options, &[], &clock(NOW + 1))
            .unwrap_err();
        assert!(err.is_expired());
        Ok(())
    }

    #[test]
    #[traced_test]
    fn rejected_candidates_are_logged() -> Result<()> {
        let token = AttestationToken::create(Some(&json!({})), Some(&rsa_key()?))?;
        let unrelated = rsa_key()?.signer()?;

        let _ = token.validate_with_clock(&ValidationOptions::new(), &[unrelated], &clock(NOW));

        assert!(logs_contain("candidate signer rejected signature"));
        assert!(logs_contain("no candidate signer verified the token signature"));
        Ok(())
    }

    #[test]
    fn options_deserialize_from_configuration() -> Result<()> {
        let options: ValidationOptions = serde_json::from_str(
            r#"{
                "validate_expiration": false,
                "validate_issuer": true,
                "expected_issuer": "https://attest.example.test",
                "time_slack_secs": 45
            }"#,
        )?;

        assert!(options.validate_token());
        assert!(options.validate_signer());
        assert!(!options.validate_expiration());
        assert!(options.validate_not_before());
        assert!(options.validate_issuer());
        assert_eq!(
            options.expected_issuer().map(IssuerRef::as_str),
            Some("https://attest.example.test")
        );
        assert_eq!(options.time_slack(), Duration::from_secs(45));

        let options: ValidationOptions = serde_json::from_str("{}")?;
        assert!(!options.validate_issuer());
        assert_eq!(options.time_slack(), Duration::default());
        Ok(())
    }
}
