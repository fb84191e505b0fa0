//! Attestation tokens and the codecs for their bodies

use std::fmt;

use aliri_base64::{Base64Url, Base64UrlRef};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{self, BoxError},
    jws::{Decomposed, Header},
    jwt::RegisteredClaims,
};

/// Converts between a token body and its JSON representation
///
/// The whole body object is handed to the codec, including the registered
/// claims, which are also extracted separately into [`RegisteredClaims`].
pub trait BodyCodec<T> {
    /// Produces the typed body from the JSON body object
    fn decode(&self, body: &serde_json::Value) -> Result<T, BoxError>;

    /// Produces the JSON body object from the typed body
    fn encode(&self, body: &T) -> Result<serde_json::Value, BoxError>;
}

/// A body codec backed by the type's `serde` implementations
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonBody;

impl<T> BodyCodec<T> for JsonBody
where
    T: Serialize + DeserializeOwned,
{
    fn decode(&self, body: &serde_json::Value) -> Result<T, BoxError> {
        Ok(T::deserialize(body)?)
    }

    fn encode(&self, body: &T) -> Result<serde_json::Value, BoxError> {
        Ok(serde_json::to_value(body)?)
    }
}

/// A body codec for tokens whose body is not needed beyond the registered claims
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBody;

impl BodyCodec<()> for NoBody {
    fn decode(&self, _: &serde_json::Value) -> Result<(), BoxError> {
        Ok(())
    }

    fn encode(&self, _: &()) -> Result<serde_json::Value, BoxError> {
        Ok(serde_json::Value::Object(serde_json::Map::new()))
    }
}

/// A parsed attestation token
///
/// The token retains its original compact serialization, so the signed
/// elements are exactly the text that was signed. The body, if present, has
/// been decoded by a [`BodyCodec`]; tokens with an empty body segment have
/// neither body nor claims.
///
/// Parsing does not validate the token. See
/// [`validate()`][AttestationToken::validate()].
#[derive(Clone)]
#[must_use]
pub struct AttestationToken<T = ()> {
    raw: String,
    message_len: usize,
    header: Header,
    claims: RegisteredClaims,
    signature: Base64Url,
    body: Option<T>,
}

impl<T> AttestationToken<T> {
    /// Parses a compact JWS, decoding its body with `codec`
    ///
    /// # Errors
    ///
    /// The token does not have three segments, or one of the segments is
    /// not valid base64url or does not contain a JSON object. Errors from
    /// the codec are reported as a malformed body.
    pub fn parse_with<C>(raw: impl Into<String>, codec: &C) -> Result<Self, error::TokenParseError>
    where
        C: BodyCodec<T> + ?Sized,
    {
        let raw = raw.into();
        let Decomposed {
            header,
            message,
            body,
            signature,
        } = Decomposed::decompose(&raw)?;

        let (claims, body) = if body.is_empty() {
            (RegisteredClaims::new(), None)
        } else {
            let decoded = Base64Url::from_encoded(body).map_err(error::malformed_token_body)?;
            let value: serde_json::Value =
                serde_json::from_slice(decoded.as_slice()).map_err(error::malformed_token_body)?;

            if !value.is_object() {
                return Err(error::malformed_token_body("token body is not a JSON object").into());
            }

            let claims = RegisteredClaims::deserialize(&value).map_err(error::malformed_token_body)?;
            let body = codec.decode(&value).map_err(error::malformed_token_body)?;
            (claims, Some(body))
        };

        let message_len = message.len();

        Ok(Self {
            raw,
            message_len,
            header,
            claims,
            signature,
            body,
        })
    }

    /// The original compact serialization of the token
    #[must_use]
    pub fn raw_token(&self) -> &str {
        &self.raw
    }

    /// The signed elements of the token, the original `header.body` text
    #[must_use]
    pub fn signed_elements(&self) -> &str {
        &self.raw[..self.message_len]
    }

    /// The decoded signature, empty for an unsecured token
    pub fn signature(&self) -> &Base64UrlRef {
        &self.signature
    }

    /// The token header
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The registered claims of the token body
    #[must_use]
    pub fn claims(&self) -> &RegisteredClaims {
        &self.claims
    }

    /// The decoded body, if the token has one
    #[must_use]
    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    /// Takes the decoded body, discarding the rest of the token
    #[must_use]
    pub fn into_body(self) -> Option<T> {
        self.body
    }

    /// Separates the decoded body from the rest of the token
    #[must_use]
    pub fn into_parts(self) -> (AttestationToken<()>, Option<T>) {
        self.replace_body(None)
    }

    /// Reassembles a token from its parts
    ///
    /// This is the inverse of [`into_parts()`][Self::into_parts()].
    pub fn from_parts(token: AttestationToken<()>, body: Option<T>) -> Self {
        token.replace_body(body).0
    }

    /// Discards the decoded body
    pub fn without_body(self) -> AttestationToken<()> {
        self.into_parts().0
    }

    /// Replaces the decoded body, which is not re-encoded into the token text
    pub fn with_body<U>(self, body: Option<U>) -> AttestationToken<U> {
        self.replace_body(body).0
    }

    /// Transforms the decoded body, if any
    pub fn map_body<U, F>(self, f: F) -> AttestationToken<U>
    where
        F: FnOnce(T) -> U,
    {
        let (token, body) = self.into_parts();
        token.replace_body(body.map(f)).0
    }

    /// A copy of the token without its decoded body
    pub fn to_untyped(&self) -> AttestationToken<()> {
        AttestationToken {
            raw: self.raw.clone(),
            message_len: self.message_len,
            header: self.header.clone(),
            claims: self.claims.clone(),
            signature: self.signature.clone(),
            body: None,
        }
    }

    /// The SHA-256 hash of the compact serialization
    ///
    /// This is the value the attestation service reports for a policy
    /// token that has been applied.
    pub fn policy_token_hash(&self) -> Base64Url {
        let digest = ring::digest::digest(&ring::digest::SHA256, self.raw.as_bytes());
        Base64Url::from_raw(digest.as_ref())
    }

    fn replace_body<U>(self, body: Option<U>) -> (AttestationToken<U>, Option<T>) {
        let Self {
            raw,
            message_len,
            header,
            claims,
            signature,
            body: old,
        } = self;

        let token = AttestationToken {
            raw,
            message_len,
            header,
            claims,
            signature,
            body,
        };

        (token, old)
    }
}

impl<T> AttestationToken<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Parses a compact JWS, decoding its body with the body type's
    /// `serde` implementation
    ///
    /// # Errors
    ///
    /// See [`parse_with()`][Self::parse_with()].
    pub fn parse(raw: impl Into<String>) -> Result<Self, error::TokenParseError> {
        Self::parse_with(raw, &JsonBody)
    }
}

impl AttestationToken<()> {
    /// Parses a compact JWS, keeping only the header and registered claims
    ///
    /// # Errors
    ///
    /// See [`parse_with()`][Self::parse_with()].
    pub fn parse_untyped(raw: impl Into<String>) -> Result<Self, error::TokenParseError> {
        Self::parse_with(raw, &NoBody)
    }
}

impl<T> fmt::Debug for AttestationToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.debug_struct("AttestationToken")
                .field("signed_elements", &format_args!("{}.", self.signed_elements()))
                .field("header", &self.header)
                .field("claims", &self.claims)
                .field("has_body", &self.body.is_some())
                .finish()
        } else {
            f.write_str("***AttestationToken***")
        }
    }
}

#[cfg(test)]
mod tests {
    use aliri_clock::UnixTime;
    use color_eyre::Result;

    use super::*;
    use crate::jwt::IssuerRef;

    // {"alg":"none"}
    const UNSECURED_HEADER: &str = "eyJhbGciOiJub25lIn0";

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Quote {
        #[serde(rename = "x-ms-sgx-mrsigner")]
        mr_signer: String,
        #[serde(rename = "x-ms-sgx-svn")]
        svn: u32,
    }

    fn encode_body(json: &str) -> String {
        Base64Url::from_raw(json.as_bytes()).to_string()
    }

    #[test]
    fn parses_typed_body_and_claims() -> Result<()> {
        let body = encode_body(
            r#"{"iss":"https://attest.example.test","exp":1700,"x-ms-sgx-mrsigner":"abcd","x-ms-sgx-svn":2}"#,
        );
        let raw = format!("{}.{}.", UNSECURED_HEADER, body);

        let token: AttestationToken<Quote> = AttestationToken::parse(raw.as_str())?;
        assert_eq!(token.raw_token(), raw);
        assert_eq!(token.signed_elements(), format!("{}.{}", UNSECURED_HEADER, body));
        assert!(token.signature().as_slice().is_empty());
        assert!(token.header().is_unsecured());
        assert_eq!(
            token.claims().issuer().map(IssuerRef::as_str),
            Some("https://attest.example.test")
        );
        assert_eq!(token.claims().expiration(), Some(UnixTime(1700)));
        assert_eq!(
            token.body(),
            Some(&Quote {
                mr_signer: "abcd".into(),
                svn: 2,
            })
        );
        Ok(())
    }

    #[test]
    fn empty_body_segment_leaves_body_and_claims_empty() -> Result<()> {
        let token: AttestationToken<Quote> =
            AttestationToken::parse(format!("{}..", UNSECURED_HEADER))?;

        assert!(token.body().is_none());
        assert_eq!(token.claims(), &RegisteredClaims::new());
        assert_eq!(token.signed_elements(), format!("{}.", UNSECURED_HEADER));
        Ok(())
    }

    #[test]
    fn body_must_be_a_json_object() {
        for body in [r#"[1,2]"#, r#""text""#, "not json"] {
            let raw = format!("{}.{}.", UNSECURED_HEADER, encode_body(body));
            let err = AttestationToken::parse_untyped(raw).unwrap_err();
            assert!(err.is_malformed_body());
        }

        let err = AttestationToken::parse_untyped(format!("{}.***.", UNSECURED_HEADER)).unwrap_err();
        assert!(err.is_malformed_body());
    }

    #[test]
    fn codec_failures_are_malformed_bodies() {
        let raw = format!("{}.{}.", UNSECURED_HEADER, encode_body(r#"{"x-ms-sgx-svn":2}"#));
        let err = AttestationToken::<Quote>::parse(raw.as_str()).unwrap_err();
        assert!(err.is_malformed_body());

        assert!(AttestationToken::parse_untyped(raw).is_ok());
    }

    #[test]
    fn body_conversions_keep_the_token() -> Result<()> {
        let raw = format!(
            "{}.{}.",
            UNSECURED_HEADER,
            encode_body(r#"{"x-ms-sgx-mrsigner":"abcd","x-ms-sgx-svn":2}"#)
        );
        let token: AttestationToken<Quote> = AttestationToken::parse(raw.as_str())?;

        let (untyped, body) = token.clone().into_parts();
        assert_eq!(untyped.raw_token(), raw);
        assert!(untyped.body().is_none());

        let rebuilt = AttestationToken::from_parts(untyped, body);
        assert_eq!(rebuilt.body(), token.body());

        let svn = token.clone().map_body(|q| q.svn);
        assert_eq!(svn.body(), Some(&2));
        assert_eq!(svn.raw_token(), raw);

        assert!(token.to_untyped().body().is_none());
        assert_eq!(token.without_body().with_body(Some("x")).into_body(), Some("x"));
        Ok(())
    }

    #[test]
    fn policy_token_hash_is_sha256_of_text() -> Result<()> {
        let token = AttestationToken::parse_untyped(format!("{}..", UNSECURED_HEADER))?;
        let hash = token.policy_token_hash();

        assert_eq!(hash.as_slice().len(), 32);
        let same = AttestationToken::parse_untyped(token.raw_token())?;
        assert_eq!(same.policy_token_hash(), hash);

        let other = AttestationToken::parse_untyped(format!(
            "{}.{}.",
            UNSECURED_HEADER,
            encode_body("{}")
        ))?;
        assert_ne!(other.policy_token_hash(), hash);
        Ok(())
    }

    #[test]
    fn debug_hides_token_text() -> Result<()> {
        let raw = format!("{}.{}.c2lnbmF0dXJl", UNSECURED_HEADER, encode_body(r#"{"a":1}"#));
        let token = AttestationToken::parse_untyped(raw)?;

        assert_eq!(format!("{:?}", token), "***AttestationToken***");

        let alternate = format!("{:#?}", token);
        assert!(alternate.contains(token.signed_elements()));
        assert!(!alternate.contains("c2lnbmF0dXJl"));
        Ok(())
    }
}
