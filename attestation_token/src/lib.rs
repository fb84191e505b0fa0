//! This crate parses, validates, and creates the tokens issued by an
//! attestation service. Tokens are JSON Web Tokens in the compact JSON Web
//! Signature serialization:
//!
//! * JSON Web Signature (JWS): [RFC7515][]
//! * JSON Web Key (JWK): [RFC7517][]
//! * JSON Web Algorithms (JWA): [RFC7518][]
//! * JSON Web Token (JWT): [RFC7519][]
//!
//! Tokens are signed with RSA or elliptic curve keys certified by X.509
//! certificates. The signer of a token is identified either by the trusted
//! signing certificates published by the service or by the certificate chain
//! carried in the token header. Unsecured tokens (`"alg": "none"`) are
//! supported, as used when submitting unsigned attestation policies.
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use attestation_token::{jwa, jwt, AttestationToken, SigningKey, ValidationOptions};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct PolicyBody {
//!     iss: String,
//!     #[serde(rename = "x-ms-policy")]
//!     policy: String,
//! }
//!
//! let key = jwa::PrivateKey::generate_ec(jwa::Curve::P256).unwrap();
//! let key = SigningKey::self_signed(key, "policy signer").unwrap();
//!
//! let body = PolicyBody {
//!     iss: "https://attest.example.test".into(),
//!     policy: "version=1.0; authorizationrules{=> permit();};".into(),
//! };
//!
//! let token = AttestationToken::create(Some(&body), Some(&key)).unwrap();
//! assert_eq!(token.header().algorithm(), Some("ES256"));
//!
//! let received: AttestationToken<PolicyBody> =
//!     AttestationToken::parse(token.raw_token()).unwrap();
//!
//! let options = ValidationOptions::new()
//!     .require_issuer(jwt::Issuer::from_static("https://attest.example.test"));
//! let signer = received
//!     .validate(&options, &[key.signer().unwrap()])
//!     .expect("token was invalid");
//!
//! assert!(signer.is_some());
//! assert_eq!(received.body(), Some(&body));
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

mod builder;
pub mod error;
pub mod jwa;
pub mod jwk;
pub mod jws;
pub mod jwt;
pub mod signer;
mod token;
mod validate;
pub mod x509;

#[doc(inline)]
pub use builder::SigningKey;
#[doc(inline)]
pub use signer::{AttestationSigner, KeyMaterial};
#[doc(inline)]
pub use token::{AttestationToken, BodyCodec, JsonBody, NoBody};
#[doc(inline)]
pub use validate::{ValidationCallback, ValidationOptions};
