//! JSON Web Keys (JWK) carried by attestation tokens and signing certificate sets
//!
//! The specifications for JSON Web Keys can be found in [RFC7517][].
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::signer::AttestationSigner;

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to JWK identifier ([`KeyId`])")]
pub struct KeyId;

/// A JSON Web Key as published by the attestation service
///
/// Only the members needed to identify the key and its certificate chain are
/// mapped; all other key parameters are retained verbatim. The `kty` member is
/// required.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct JsonWebKey {
    #[serde(rename = "kty")]
    key_type: String,
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    key_id: Option<KeyId>,
    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    usage: Option<String>,
    #[serde(rename = "x5c", default, skip_serializing_if = "Vec::is_empty")]
    certificate_chain: Vec<String>,
    #[serde(flatten)]
    parameters: serde_json::Map<String, serde_json::Value>,
}

impl JsonWebKey {
    /// Constructs a key of the given type with no other members
    pub fn new(key_type: impl Into<String>) -> Self {
        Self {
            key_type: key_type.into(),
            key_id: None,
            algorithm: None,
            usage: None,
            certificate_chain: Vec::new(),
            parameters: serde_json::Map::new(),
        }
    }

    /// The key type (`kty`), such as `RSA` or `EC`
    #[must_use]
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// The key ID (`kid`)
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The algorithm intended for use with the key (`alg`)
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// The intended usage of the key (`use`)
    #[must_use]
    pub fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    /// The certificate chain (`x5c`), standard base64 DER with the leaf first
    #[must_use]
    pub fn certificate_chain(&self) -> &[String] {
        &self.certificate_chain
    }

    /// Any other members of the key, such as the public key parameters
    #[must_use]
    pub fn parameters(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.parameters
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: impl Into<KeyId>) -> Self {
        Self {
            key_id: Some(kid.into()),
            ..self
        }
    }

    /// Sets the intended algorithm
    pub fn with_algorithm(self, alg: impl Into<String>) -> Self {
        Self {
            algorithm: Some(alg.into()),
            ..self
        }
    }

    /// Sets the certificate chain
    pub fn with_certificate_chain(self, x5c: Vec<String>) -> Self {
        Self {
            certificate_chain: x5c,
            ..self
        }
    }
}

/// A JSON Web Key Set, as returned by the attestation service's signing
/// certificates endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct JsonWebKeySet {
    keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// The keys in the set
    #[must_use]
    pub fn keys(&self) -> &[JsonWebKey] {
        &self.keys
    }

    /// Adds a key to the set
    pub fn add_key(&mut self, key: JsonWebKey) {
        self.keys.push(key);
    }

    /// Converts each key into a signer, preserving order
    #[must_use]
    pub fn signers(&self) -> Vec<AttestationSigner> {
        self.keys.iter().map(AttestationSigner::from).collect()
    }
}

impl From<Vec<JsonWebKey>> for JsonWebKeySet {
    fn from(keys: Vec<JsonWebKey>) -> Self {
        Self { keys }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn key_requires_key_type() {
        let result = serde_json::from_str::<JsonWebKey>(r#"{"kid":"abc","x5c":["AAAA"]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn key_retains_unmapped_parameters() -> Result<()> {
        const DATA: &str = r#"{
            "kty": "RSA",
            "kid": "abc",
            "use": "sig",
            "n": "sXch",
            "e": "AQAB",
            "x5c": ["AAAA", "BBBB"]
        }"#;

        let key: JsonWebKey = serde_json::from_str(DATA)?;
        assert_eq!(key.key_type(), "RSA");
        assert_eq!(key.key_id().map(KeyIdRef::as_str), Some("abc"));
        assert_eq!(key.usage(), Some("sig"));
        assert_eq!(key.certificate_chain(), ["AAAA", "BBBB"]);
        assert_eq!(key.parameters()["e"], "AQAB");
        assert!(!key.parameters().contains_key("kty"));

        let reserialized: serde_json::Value = serde_json::to_value(&key)?;
        assert_eq!(reserialized["n"], "sXch");
        Ok(())
    }

    #[test]
    fn key_set_requires_key_array() -> Result<()> {
        assert!(serde_json::from_str::<JsonWebKeySet>(r#"{"keys":{"kty":"RSA"}}"#).is_err());
        assert!(serde_json::from_str::<JsonWebKeySet>(r#"{}"#).is_err());

        let set: JsonWebKeySet = serde_json::from_str(
            r#"{"keys":[{"kty":"RSA","kid":"one"},{"kty":"EC","kid":"two","x5c":["AAAA"]}]}"#,
        )?;

        let signers = set.signers();
        assert_eq!(signers.len(), 2);
        assert_eq!(signers[0].key_id().map(KeyIdRef::as_str), Some("one"));
        assert!(signers[0].certificate_chain().is_empty());
        assert_eq!(signers[1].certificate_chain().len(), 1);
        Ok(())
    }
}
