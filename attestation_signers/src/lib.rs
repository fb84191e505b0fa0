//! Caching of the signers trusted to issue attestation tokens
//!
//! An attestation service publishes the certificates it signs tokens with.
//! Fetching them is comparatively expensive, so clients fetch them once and
//! reuse them for every token they validate. [`SignerCache`] holds that set:
//! at most one fetch is in flight at any time, and readers only ever observe
//! a complete set.
//!
//! The signers are fetched by a caller-supplied function, so the cache is
//! independent of how the service is reached.
//!
//! ```
//! use attestation_signers::SignerCache;
//! use attestation_token::{jwa, AttestationToken, NoBody, SigningKey, ValidationOptions};
//!
//! let key = jwa::PrivateKey::generate_ec(jwa::Curve::P256).unwrap();
//! let key = SigningKey::self_signed(key, "service signer").unwrap();
//! let token = AttestationToken::<()>::create_with(&NoBody, None, Some(&key)).unwrap();
//!
//! let cache = SignerCache::new();
//! let fetch = || key.signer().map(|s| vec![s]);
//!
//! let signer = cache
//!     .validate_token(&token, &ValidationOptions::new(), fetch)
//!     .expect("token was invalid");
//! assert!(signer.is_some());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use aliri_clock::{Clock, System, UnixTime};
use arc_swap::ArcSwapOption;
use attestation_token::{
    error::TokenValidationError, AttestationSigner, AttestationToken, ValidationOptions,
};
use thiserror::Error;

/// The signers could not be fetched
#[derive(Debug, Error)]
#[error("unable to fetch attestation signers")]
pub struct SignerFetchError<E> {
    #[source]
    source: E,
}

impl<E> SignerFetchError<E> {
    /// The error returned by the fetch function
    pub fn into_inner(self) -> E {
        self.source
    }
}

/// An error occurring while validating a token against cached signers
#[derive(Debug, Error)]
pub enum CachedValidationError<E> {
    /// The signers could not be fetched
    #[error(transparent)]
    Fetch(#[from] SignerFetchError<E>),

    /// The token was not valid
    #[error(transparent)]
    Validation(#[from] TokenValidationError),
}

impl<E> CachedValidationError<E> {
    /// Whether the error is due to a failure to fetch the signers
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    /// Whether the error is due to the token failing validation
    #[must_use]
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// The default minimum time between two refreshes of the signers
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Default)]
struct FetchState {
    last_fetch: Option<UnixTime>,
}

#[derive(Debug, Default)]
struct Inner {
    signers: ArcSwapOption<Vec<AttestationSigner>>,
    fetching: Mutex<FetchState>,
}

/// A lazily populated set of trusted attestation signers
///
/// Clones share the same set.
#[derive(Debug, Clone)]
#[must_use]
pub struct SignerCache {
    inner: Arc<Inner>,
    min_refresh_interval: Duration,
}

impl Default for SignerCache {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }
}

impl SignerCache {
    /// Constructs an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a cache already holding `signers`
    pub fn with_signers(signers: Vec<AttestationSigner>) -> Self {
        let cache = Self::new();
        cache.inner.signers.store(Some(Arc::new(signers)));
        cache
    }

    /// Sets the minimum time between two refreshes triggered by a token
    /// whose signature could not be verified
    pub fn with_min_refresh_interval(self, interval: Duration) -> Self {
        Self {
            min_refresh_interval: interval,
            ..self
        }
    }

    /// The minimum time between two refreshes triggered by validation
    #[must_use]
    pub fn min_refresh_interval(&self) -> Duration {
        self.min_refresh_interval
    }

    /// The cached signers, if the cache has been populated
    #[must_use]
    pub fn cached(&self) -> Option<Arc<Vec<AttestationSigner>>> {
        self.inner.signers.load_full()
    }

    /// Returns the cached signers, calling `fetch` to populate the cache if
    /// it is empty
    ///
    /// Concurrent callers wait for a fetch in progress instead of starting
    /// their own. If the fetch fails, the cache remains empty and a later
    /// call will try again.
    ///
    /// # Errors
    ///
    /// The cache was empty and `fetch` failed.
    pub fn get_or_fetch<F, E>(
        &self,
        fetch: F,
    ) -> Result<Arc<Vec<AttestationSigner>>, SignerFetchError<E>>
    where
        F: FnOnce() -> Result<Vec<AttestationSigner>, E>,
    {
        self.load_or_fetch(fetch, &System).map(|(signers, _)| signers)
    }

    /// Replaces the cached signers with a new set from `fetch`
    ///
    /// If the fetch fails, the cached signers are left unchanged.
    ///
    /// # Errors
    ///
    /// `fetch` failed.
    pub fn refresh<F, E>(
        &self,
        fetch: F,
    ) -> Result<Arc<Vec<AttestationSigner>>, SignerFetchError<E>>
    where
        F: FnOnce() -> Result<Vec<AttestationSigner>, E>,
    {
        let mut state = self.lock_state();
        self.fetch_and_store(&mut state, fetch, &System)
    }

    /// Empties the cache, so the next use fetches the signers again
    pub fn clear(&self) {
        self.inner.signers.store(None);
        tracing::debug!("attestation signer cache cleared");
    }

    /// Validates `token` against the cached signers
    ///
    /// If the signature cannot be verified with signers that were already
    /// cached, the signers may have been rotated by the service, and the
    /// cache is refreshed once before validation is retried. No refresh
    /// happens when the token's `kid` names a cached signer, or when the
    /// signers were fetched less than the
    /// [minimum refresh interval][Self::with_min_refresh_interval()] ago.
    /// Concurrent failures share a single refresh.
    ///
    /// # Errors
    ///
    /// The signers could not be fetched, or the token is not valid.
    pub fn validate_token<T, F, E>(
        &self,
        token: &AttestationToken<T>,
        options: &ValidationOptions,
        fetch: F,
    ) -> Result<Option<AttestationSigner>, CachedValidationError<E>>
    where
        F: FnMut() -> Result<Vec<AttestationSigner>, E>,
    {
        self.validate_token_with_clock(token, options, fetch, &System)
    }

    /// Validates `token` against the cached signers at the time given by `clock`
    ///
    /// # Errors
    ///
    /// See [`validate_token()`][Self::validate_token()].
    pub fn validate_token_with_clock<T, F, E, C>(
        &self,
        token: &AttestationToken<T>,
        options: &ValidationOptions,
        mut fetch: F,
        clock: &C,
    ) -> Result<Option<AttestationSigner>, CachedValidationError<E>>
    where
        F: FnMut() -> Result<Vec<AttestationSigner>, E>,
        C: Clock,
    {
        let (signers, fresh) = self.load_or_fetch(&mut fetch, clock)?;

        match token.validate_with_clock(options, &signers, clock) {
            Err(err) if err.is_signature_failure() && !fresh => {
                if let Some(kid) = token.header().key_id() {
                    if signers.iter().any(|s| s.key_id() == Some(kid)) {
                        tracing::debug!(token.kid = ?kid, "signer is cached, not refreshing");
                        return Err(err.into());
                    }
                }

                match self.refresh_stale(&signers, &mut fetch, clock)? {
                    Some(signers) => Ok(token.validate_with_clock(options, &signers, clock)?),
                    None => Err(err.into()),
                }
            }
            result => Ok(result?),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, FetchState> {
        self.inner
            .fetching
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn load_or_fetch<F, E, C>(
        &self,
        fetch: F,
        clock: &C,
    ) -> Result<(Arc<Vec<AttestationSigner>>, bool), SignerFetchError<E>>
    where
        F: FnOnce() -> Result<Vec<AttestationSigner>, E>,
        C: Clock,
    {
        if let Some(signers) = self.inner.signers.load_full() {
            return Ok((signers, false));
        }

        let mut state = self.lock_state();

        if let Some(signers) = self.inner.signers.load_full() {
            tracing::trace!("attestation signers populated while waiting");
            return Ok((signers, false));
        }

        Ok((self.fetch_and_store(&mut state, fetch, clock)?, true))
    }

    /// Refreshes the signers that failed to verify a token, unless another
    /// caller has already replaced them or the last fetch is too recent
    fn refresh_stale<F, E, C>(
        &self,
        stale: &Arc<Vec<AttestationSigner>>,
        fetch: F,
        clock: &C,
    ) -> Result<Option<Arc<Vec<AttestationSigner>>>, SignerFetchError<E>>
    where
        F: FnOnce() -> Result<Vec<AttestationSigner>, E>,
        C: Clock,
    {
        let mut state = self.lock_state();

        if let Some(current) = self.inner.signers.load_full() {
            if !Arc::ptr_eq(&current, stale) {
                tracing::trace!("attestation signers refreshed while waiting");
                return Ok(Some(current));
            }
        }

        let now = clock.now();
        if let Some(last_fetch) = state.last_fetch {
            let elapsed = now.0.saturating_sub(last_fetch.0);
            if elapsed < self.min_refresh_interval.as_secs() {
                tracing::debug!(
                    elapsed,
                    min_interval = self.min_refresh_interval.as_secs(),
                    "attestation signers fetched recently, not refreshing"
                );
                return Ok(None);
            }
        }

        tracing::info!("token signature not verified by cached signers, refreshing");
        self.fetch_and_store(&mut state, fetch, clock).map(Some)
    }

    fn fetch_and_store<F, E, C>(
        &self,
        state: &mut FetchState,
        fetch: F,
        clock: &C,
    ) -> Result<Arc<Vec<AttestationSigner>>, SignerFetchError<E>>
    where
        F: FnOnce() -> Result<Vec<AttestationSigner>, E>,
        C: Clock,
    {
        state.last_fetch = Some(clock.now());

        let signers = match fetch() {
            Ok(signers) => Arc::new(signers),
            Err(source) => {
                tracing::warn!("attestation signer fetch failed");
                return Err(SignerFetchError { source });
            }
        };

        self.inner.signers.store(Some(Arc::clone(&signers)));
        tracing::info!(signers = signers.len(), "attestation signers fetched");

        Ok(signers)
    }
}
