//! JWT bundle types.
//!
//! A [`JwtBundle`] holds the JWT authorities of one trust domain, indexed by
//! key ID. Authorities keep the JWK JSON as received; the key material is
//! only interpreted when a token signature is verified.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::bundle::BundleSource;
use crate::spiffe_id::TrustDomain;

/// A JWT signing authority: a JWK and its key ID.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JwtAuthority {
    kid: Arc<str>,
    jwk_json: Arc<[u8]>,
}

impl JwtAuthority {
    /// Parses a single JWK object (not a JWKS document).
    ///
    /// # Errors
    ///
    /// [`JwtBundleError::Deserialize`] if the bytes are not JSON,
    /// [`JwtBundleError::MissingKeyId`] if there is no string `kid`.
    pub fn from_jwk_json(jwk_json: &[u8]) -> Result<Self, JwtBundleError> {
        Self::from_jwk_value(&serde_json::from_slice(jwk_json)?)
    }

    fn from_jwk_value(jwk: &Value) -> Result<Self, JwtBundleError> {
        let Some(kid) = jwk.get("kid").and_then(Value::as_str) else {
            return Err(JwtBundleError::MissingKeyId);
        };

        Ok(Self {
            kid: kid.into(),
            jwk_json: serde_json::to_vec(jwk)?.into(),
        })
    }

    /// The key ID (`kid`).
    pub fn key_id(&self) -> &str {
        &self.kid
    }

    /// The JWK as JSON bytes.
    pub fn jwk_json(&self) -> &[u8] {
        &self.jwk_json
    }
}

/// Errors building a [`JwtBundle`] or a [`JwtAuthority`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JwtBundleError {
    /// A JWK has no `kid`.
    #[error("missing key ID")]
    MissingKeyId,
    /// The document is not a JWKS object with a `keys` array.
    #[error("JWKS document must contain a 'keys' array")]
    MissingKeys,
    /// The bytes are not valid JSON.
    #[error("cannot deserialize json jwk set")]
    Deserialize(#[from] serde_json::Error),
}

/// The JWT authorities of one [`TrustDomain`], keyed by `kid`.
///
/// Used to verify [`JwtSvid`](crate::svid::jwt::JwtSvid) signatures.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JwtBundle {
    trust_domain: TrustDomain,
    authorities: HashMap<Arc<str>, Arc<JwtAuthority>>,
}

impl JwtBundle {
    /// An empty bundle for `trust_domain`.
    pub fn new(trust_domain: TrustDomain) -> Self {
        Self {
            trust_domain,
            authorities: HashMap::new(),
        }
    }

    /// Parses an RFC 7517 JWKS document, the format the Workload API uses
    /// for JWT bundles.
    ///
    /// A later key with an already seen `kid` replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not JSON, there is no `keys` array, or a key has no `kid`.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiffe_workload::{JwtBundle, TrustDomain};
    ///
    /// let jwks = br#"{"keys": [
    ///     {"kty": "OKP", "crv": "Ed25519", "kid": "signer-1",
    ///      "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"},
    ///     {"kty": "oct", "kid": "signer-2"}
    /// ]}"#;
    /// let bundle = JwtBundle::from_jwt_authorities(TrustDomain::new("acme.io")?, jwks)?;
    ///
    /// assert_eq!(bundle.jwt_authorities().count(), 2);
    /// assert!(bundle.find_jwt_authority("signer-1").is_some());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_jwt_authorities(
        trust_domain: TrustDomain,
        jwks: &[u8],
    ) -> Result<Self, JwtBundleError> {
        let document: Value = serde_json::from_slice(jwks)?;
        let Some(Value::Array(keys)) = document.as_object().and_then(|o| o.get("keys")) else {
            return Err(JwtBundleError::MissingKeys);
        };

        let mut bundle = Self::new(trust_domain);
        for jwk in keys {
            bundle.add_jwt_authority(JwtAuthority::from_jwk_value(jwk)?);
        }
        Ok(bundle)
    }

    /// The bundle's trust domain.
    pub const fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Looks up an authority by key ID.
    pub fn find_jwt_authority(&self, key_id: &str) -> Option<&Arc<JwtAuthority>> {
        self.authorities.get(key_id)
    }

    /// Adds `authority`, replacing one with the same key ID.
    pub fn add_jwt_authority(&mut self, authority: JwtAuthority) {
        self.authorities.insert(Arc::clone(&authority.kid), Arc::new(authority));
    }

    /// All authorities, in no particular order.
    pub fn jwt_authorities(&self) -> impl Iterator<Item = &Arc<JwtAuthority>> {
        self.authorities.values()
    }
}

/// [`JwtBundle`]s keyed by [`TrustDomain`].
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct JwtBundleSet {
    bundles: BTreeMap<TrustDomain, Arc<JwtBundle>>,
}

impl JwtBundleSet {
    /// An empty set.
    pub const fn new() -> Self {
        Self {
            bundles: BTreeMap::new(),
        }
    }

    /// Adds `bundle`, replacing the bundle of the same trust domain.
    pub fn add_bundle(&mut self, bundle: JwtBundle) {
        self.bundles.insert(bundle.trust_domain.clone(), Arc::new(bundle));
    }

    /// The bundle of `trust_domain`, if any.
    pub fn get(&self, trust_domain: &TrustDomain) -> Option<Arc<JwtBundle>> {
        self.bundles.get(trust_domain).map(Arc::clone)
    }

    /// Iterates over the bundles in trust domain order.
    pub fn iter(&self) -> impl Iterator<Item = (&TrustDomain, &Arc<JwtBundle>)> {
        self.bundles.iter()
    }

    /// Number of trust domains in the set.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Whether the set holds no bundle.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

impl BundleSource for JwtBundleSet {
    type Item = JwtBundle;
    type Error = Infallible;

    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<Self::Item>>, Self::Error> {
        Ok(self.get(trust_domain))
    }
}

impl Extend<JwtBundle> for JwtBundleSet {
    fn extend<I: IntoIterator<Item = JwtBundle>>(&mut self, bundles: I) {
        bundles.into_iter().for_each(|b| self.add_bundle(b));
    }
}

impl FromIterator<JwtBundle> for JwtBundleSet {
    fn from_iter<I: IntoIterator<Item = JwtBundle>>(bundles: I) -> Self {
        let mut set = Self::new();
        set.extend(bundles);
        set
    }
}
