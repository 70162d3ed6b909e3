//! JWT-SVID parsing and verification.
//!
//! Two entry points:
//! 1) [`JwtSvid::parse_and_validate`] verifies the signature against a JWT
//!    bundle looked up by the token's trust domain, then checks the claims.
//! 2) [`JwtSvid::parse_insecure`] runs the same structural and claim checks
//!    without the signature. It is meant for diagnostics and for tokens handed
//!    out by the Workload API; it must never be used to establish trust.
//!
//! Time based claims are checked with a fixed leeway of
//! [`CLOCK_SKEW_LEEWAY_SECS`] seconds.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use zeroize::Zeroize;

use crate::bundle::jwt::{JwtAuthority, JwtBundle};
use crate::bundle::BundleSource;
use crate::spiffe_id::{SpiffeId, SpiffeIdError, TrustDomain};

/// Clock skew tolerated when checking `exp`, `nbf` and `iat`.
pub const CLOCK_SKEW_LEEWAY_SECS: i64 = 60;

/// Maximum number of audience values accepted in a JWT `aud` claim.
const MAX_JWT_AUDIENCE_COUNT: usize = 32;

/// Maximum size for a JWT segment (header or claims) after base64url decoding.
const MAX_JWT_SEGMENT_SIZE: usize = 64 * 1024;

/// The `alg` values a JWT-SVID may carry: the RSA, ECDSA and RSA-PSS families
/// at 256, 384 and 512 bits. `none` and the HMAC family are never accepted.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum JwtAlg {
    /// RSA PKCS#1 v1.5, SHA-256.
    RS256,
    /// RSA PKCS#1 v1.5, SHA-384.
    RS384,
    /// RSA PKCS#1 v1.5, SHA-512.
    RS512,
    /// P-256 curve, SHA-256.
    ES256,
    /// P-384 curve, SHA-384.
    ES384,
    /// P-521 curve, SHA-512.
    ES512,
    /// RSA-PSS, SHA-256.
    PS256,
    /// RSA-PSS, SHA-384.
    PS384,
    /// RSA-PSS, SHA-512.
    PS512,
}

const ALGORITHMS: [(JwtAlg, &str); 9] = [
    (JwtAlg::RS256, "RS256"),
    (JwtAlg::RS384, "RS384"),
    (JwtAlg::RS512, "RS512"),
    (JwtAlg::ES256, "ES256"),
    (JwtAlg::ES384, "ES384"),
    (JwtAlg::ES512, "ES512"),
    (JwtAlg::PS256, "PS256"),
    (JwtAlg::PS384, "PS384"),
    (JwtAlg::PS512, "PS512"),
];

impl JwtAlg {
    /// Looks up an `alg` header value. Matching is case sensitive.
    pub fn parse(s: &str) -> Option<Self> {
        ALGORITHMS
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(alg, _)| *alg)
    }

    /// The `alg` header value.
    pub fn as_str(self) -> &'static str {
        ALGORITHMS
            .iter()
            .find(|(alg, _)| *alg == self)
            .map_or("", |&(_, name)| name)
    }

    // jsonwebtoken has no P-521 backend; ES512 goes through `p521`.
    fn to_jsonwebtoken(self) -> Option<jsonwebtoken::Algorithm> {
        match self {
            Self::ES512 => None,
            other => other.as_str().parse().ok(),
        }
    }
}

impl fmt::Display for JwtAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A SPIFFE JWT-SVID.
///
/// The serialized token is zeroized on drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtSvid {
    spiffe_id: SpiffeId,
    hint: Option<Arc<str>>,
    expiry: OffsetDateTime,
    audience: BTreeSet<String>,
    claims: Map<String, Value>,
    kid: Option<String>,
    alg: JwtAlg,
    token: Token,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
struct Header {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    typ: Option<String>,
    alg: String,
}

/// Why a token was refused as a [`JwtSvid`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JwtSvidError {
    /// The `sub` claim is missing or empty.
    #[error("token is missing the 'sub' claim")]
    MissingSubject,

    /// `sub` does not parse as a SPIFFE ID.
    #[error("token 'sub' is not a SPIFFE ID: {0}")]
    InvalidSubject(#[from] SpiffeIdError),

    /// The `exp` claim is missing.
    #[error("token is missing the 'exp' claim")]
    MissingExpiration,

    /// The header has no `kid`, so no bundle key can be chosen.
    #[error("token header has no 'kid'")]
    MissingKeyId,

    /// `typ` is present but neither `JWT` nor `JOSE`.
    #[error("token header 'typ' must be 'JWT' or 'JOSE'")]
    InvalidTyp,

    /// A numeric date claim is not a valid timestamp.
    #[error("invalid token '{0}' claim")]
    InvalidTimestamp(&'static str),

    /// The `aud` claim is neither a string nor an array of strings.
    #[error("invalid token 'aud' claim")]
    InvalidAudienceClaim,

    /// The token algorithm is not allowed for JWT-SVIDs.
    #[error("unsupported token signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Not three dot-separated parts.
    #[error("token is not a compact JWS")]
    InvalidJwtFormat,

    /// The header or claims are not unpadded base64url, or decode too large.
    #[error("token segment is not valid base64url")]
    InvalidBase64,

    /// The header or claims are not a JSON object of the expected shape.
    #[error("token segment is not valid JSON")]
    InvalidJson(#[source] serde_json::Error),

    /// The bundle source has nothing for the token's trust domain.
    #[error("no JWT bundle for trust domain {0}")]
    BundleNotFound(TrustDomain),

    /// The bundle has no key with the token's `kid`.
    #[error("no JWT authority with key ID {0}")]
    AuthorityNotFound(String),

    /// The token audience is not exactly the expected audience.
    #[error("token audience {actual:?} differs from expected {expected:?}")]
    InvalidAudience {
        /// Audience carried by the token.
        actual: Vec<String>,
        /// Audience the caller expected.
        expected: Vec<String>,
    },

    /// The `exp` claim is in the past, beyond the leeway.
    #[error("token has expired")]
    Expired,

    /// The `nbf` claim is in the future, beyond the leeway.
    #[error("token is not valid yet")]
    NotYetValid,

    /// The `iat` claim is in the future, beyond the leeway.
    #[error("token issued in the future")]
    IssuedInTheFuture,

    /// The bundle source failed the lookup.
    #[error("JWT bundle lookup failed")]
    BundleSourceError(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The authority's stored JWK does not decode.
    #[error("authority JWK is invalid: {0}")]
    InvalidAuthorityJwk(#[source] serde_json::Error),

    /// Bad signature, or a key unusable with the token's algorithm.
    #[error("token signature does not verify")]
    InvalidSignature(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone, Eq, PartialEq, Zeroize)]
#[zeroize(drop)]
struct Token {
    inner: String,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl JwtSvid {
    /// Parses a JWT-SVID and checks its claims without verifying the signature.
    ///
    /// The algorithm must be allowed, `sub` must be a SPIFFE ID, `exp` must be
    /// present, and the audience must equal `expected_audience` as a set.
    /// Time claims are checked with the fixed leeway.
    ///
    /// # Errors
    ///
    /// Returns [`JwtSvidError`] if the token is malformed or a claim check fails.
    pub fn parse_insecure<T>(token: &str, expected_audience: &[T]) -> Result<Self, JwtSvidError>
    where
        T: AsRef<str>,
    {
        let svid = Self::decode_unverified(token)?;
        svid.validate_claims(expected_audience, OffsetDateTime::now_utc().unix_timestamp())?;
        Ok(svid)
    }

    /// Parses and verifies a JWT-SVID.
    ///
    /// The signing key is looked up in the JWT bundle of the token's trust
    /// domain by `kid`. After the signature is verified the claims are checked
    /// the same way as in [`JwtSvid::parse_insecure`].
    ///
    /// # Errors
    ///
    /// Returns [`JwtSvidError`] if:
    /// - the token is malformed or uses a disallowed algorithm,
    /// - `sub` or `exp` is missing or invalid,
    /// - no bundle exists for the trust domain or no authority for the `kid`,
    /// - the signature does not verify,
    /// - the audience differs from `expected_audience`, or a time claim is out of range.
    pub fn parse_and_validate<B, T>(
        token: &str,
        bundle_source: &B,
        expected_audience: &[T],
    ) -> Result<Self, JwtSvidError>
    where
        B: BundleSource<Item = JwtBundle>,
        T: AsRef<str>,
    {
        let untrusted = Self::decode_unverified(token)?;

        let authority = find_jwt_authority(
            bundle_source,
            &untrusted.spiffe_id.trust_domain(),
            untrusted.kid.as_deref(),
        )?;

        verify_signature(token, untrusted.alg, &authority)?;

        untrusted.validate_claims(expected_audience, OffsetDateTime::now_utc().unix_timestamp())?;
        Ok(untrusted)
    }

    /// Returns a copy of this JWT-SVID with the given Workload API hint attached.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<Arc<str>>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Returns the serialized token.
    pub fn token(&self) -> &str {
        &self.token.inner
    }

    /// Returns the SPIFFE ID (from the `sub` claim).
    pub const fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// Returns the audience (from the `aud` claim).
    pub fn audience(&self) -> &BTreeSet<String> {
        &self.audience
    }

    /// Returns the token expiration timestamp (from the `exp` claim).
    pub const fn expiry(&self) -> OffsetDateTime {
        self.expiry
    }

    /// Returns the `kid` header, if any.
    pub fn key_id(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Returns the signature algorithm from the header.
    pub const fn algorithm(&self) -> JwtAlg {
        self.alg
    }

    /// Returns all the token claims.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Returns the Workload API hint (if any).
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    fn decode_unverified(token: &str) -> Result<Self, JwtSvidError> {
        let mut it = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(_), None) =
            (it.next(), it.next(), it.next(), it.next())
        else {
            return Err(JwtSvidError::InvalidJwtFormat);
        };

        let header: Header = serde_json::from_slice(&decode_b64url_to_vec(header_b64)?)
            .map_err(JwtSvidError::InvalidJson)?;
        let claims: Map<String, Value> = serde_json::from_slice(&decode_b64url_to_vec(claims_b64)?)
            .map_err(JwtSvidError::InvalidJson)?;

        if let Some(typ) = header.typ.as_deref() {
            if typ != "JWT" && typ != "JOSE" {
                return Err(JwtSvidError::InvalidTyp);
            }
        }

        let alg = JwtAlg::parse(&header.alg)
            .ok_or_else(|| JwtSvidError::UnsupportedAlgorithm(header.alg.clone()))?;

        let sub = match claims.get("sub").and_then(Value::as_str) {
            Some(sub) if !sub.is_empty() => sub,
            _ => return Err(JwtSvidError::MissingSubject),
        };
        let spiffe_id = SpiffeId::new(sub)?;

        let exp = numeric_date(&claims, "exp")?.ok_or(JwtSvidError::MissingExpiration)?;
        let expiry = OffsetDateTime::from_unix_timestamp(exp)
            .map_err(|_| JwtSvidError::InvalidTimestamp("exp"))?;

        let audience = audience_claim(&claims)?;

        Ok(Self {
            spiffe_id,
            hint: None,
            expiry,
            audience,
            claims,
            kid: header.kid,
            alg,
            token: Token {
                inner: token.to_owned(),
            },
        })
    }

    fn validate_claims<T: AsRef<str>>(
        &self,
        expected_audience: &[T],
        now: i64,
    ) -> Result<(), JwtSvidError> {
        let expected: BTreeSet<String> = expected_audience
            .iter()
            .map(|a| a.as_ref().to_owned())
            .collect();
        if self.audience != expected {
            return Err(JwtSvidError::InvalidAudience {
                actual: self.audience.iter().cloned().collect(),
                expected: expected.into_iter().collect(),
            });
        }

        if let Some(nbf) = numeric_date(&self.claims, "nbf")? {
            if nbf > now.saturating_add(CLOCK_SKEW_LEEWAY_SECS) {
                return Err(JwtSvidError::NotYetValid);
            }
        }

        if self.expiry.unix_timestamp() < now.saturating_sub(CLOCK_SKEW_LEEWAY_SECS) {
            return Err(JwtSvidError::Expired);
        }

        if let Some(iat) = numeric_date(&self.claims, "iat")? {
            if iat > now.saturating_add(CLOCK_SKEW_LEEWAY_SECS) {
                return Err(JwtSvidError::IssuedInTheFuture);
            }
        }

        Ok(())
    }
}

fn find_jwt_authority<B>(
    bundle_source: &B,
    trust_domain: &TrustDomain,
    key_id: Option<&str>,
) -> Result<Arc<JwtAuthority>, JwtSvidError>
where
    B: BundleSource<Item = JwtBundle>,
{
    let bundle = bundle_source
        .bundle_for_trust_domain(trust_domain)
        .map_err(|e| JwtSvidError::BundleSourceError(Box::new(e)))?
        .ok_or_else(|| JwtSvidError::BundleNotFound(trust_domain.clone()))?;

    let key_id = key_id.ok_or(JwtSvidError::MissingKeyId)?;
    bundle
        .find_jwt_authority(key_id)
        .cloned()
        .ok_or_else(|| JwtSvidError::AuthorityNotFound(key_id.to_owned()))
}

// Claims are checked separately with the SPIFFE rules; only the signature is
// verified here.
fn verify_signature(
    token: &str,
    alg: JwtAlg,
    authority: &JwtAuthority,
) -> Result<(), JwtSvidError> {
    let Some(alg) = alg.to_jsonwebtoken() else {
        return verify_es512(token, authority);
    };

    let jwk: Jwk =
        serde_json::from_slice(authority.jwk_json()).map_err(JwtSvidError::InvalidAuthorityJwk)?;
    let key = DecodingKey::from_jwk(&jwk)?;

    let mut validation = Validation::new(alg);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    jsonwebtoken::decode::<Value>(token, &key, &validation)?;
    Ok(())
}

fn verify_es512(token: &str, authority: &JwtAuthority) -> Result<(), JwtSvidError> {
    use jsonwebtoken::errors::ErrorKind;
    use p521::ecdsa::signature::Verifier as _;
    use p521::ecdsa::{Signature, VerifyingKey};

    let invalid_key = || JwtSvidError::InvalidSignature(ErrorKind::InvalidEcdsaKey.into());

    let jwk: Value =
        serde_json::from_slice(authority.jwk_json()).map_err(JwtSvidError::InvalidAuthorityJwk)?;
    let field = |name: &str| jwk.get(name).and_then(Value::as_str);
    let (Some("EC"), Some("P-521"), Some(x), Some(y)) =
        (field("kty"), field("crv"), field("x"), field("y"))
    else {
        return Err(invalid_key());
    };

    // uncompressed SEC1 point
    let mut sec1 = vec![0x04];
    sec1.extend(decode_b64url_to_vec(x).map_err(|_| invalid_key())?);
    sec1.extend(decode_b64url_to_vec(y).map_err(|_| invalid_key())?);
    let key = VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| invalid_key())?;

    let (message, signature) = token.rsplit_once('.').ok_or(JwtSvidError::InvalidJwtFormat)?;
    let signature = decode_b64url_to_vec(signature)?;
    let signature = Signature::from_slice(&signature)
        .map_err(|_| JwtSvidError::InvalidSignature(ErrorKind::InvalidSignature.into()))?;

    key.verify(message.as_bytes(), &signature)
        .map_err(|_| JwtSvidError::InvalidSignature(ErrorKind::InvalidSignature.into()))
}

fn numeric_date(
    claims: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<i64>, JwtSvidError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or(JwtSvidError::InvalidTimestamp(name)),
        Some(_) => Err(JwtSvidError::InvalidTimestamp(name)),
    }
}

fn audience_claim(claims: &Map<String, Value>) -> Result<BTreeSet<String>, JwtSvidError> {
    match claims.get("aud") {
        None | Some(Value::Null) => Ok(BTreeSet::new()),
        Some(Value::String(aud)) => Ok(BTreeSet::from([aud.clone()])),
        Some(Value::Array(values)) => {
            if values.len() > MAX_JWT_AUDIENCE_COUNT {
                return Err(JwtSvidError::InvalidAudienceClaim);
            }
            values
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_owned)
                        .ok_or(JwtSvidError::InvalidAudienceClaim)
                })
                .collect()
        }
        Some(_) => Err(JwtSvidError::InvalidAudienceClaim),
    }
}

/// Decode base64url (no padding) into bytes, bounded by [`MAX_JWT_SEGMENT_SIZE`].
fn decode_b64url_to_vec(input: &str) -> Result<Vec<u8>, JwtSvidError> {
    use base64ct::{Base64UrlUnpadded, Encoding as _};

    if input.len() > MAX_JWT_SEGMENT_SIZE * 4 / 3 + 4 {
        return Err(JwtSvidError::InvalidBase64);
    }

    Base64UrlUnpadded::decode_vec(input).map_err(|_| JwtSvidError::InvalidBase64)
}
