//! Trust bundles: X.509 roots and JWT keys, one bundle per trust domain.

use std::error::Error;
use std::sync::Arc;

use crate::spiffe_id::TrustDomain;

pub mod jwt;
pub mod x509;

/// A source of bundles queryable by [`TrustDomain`].
///
/// Bundle sets, the Workload API caches, and any user type can act as the
/// bundle lookup of the X.509 and JWT verifiers.
pub trait BundleSource {
    /// [`x509::X509Bundle`] or [`jwt::JwtBundle`].
    type Item: Send + Sync + 'static;

    /// Lookup failure.
    type Error: Error + Send + Sync + 'static;

    /// The bundle of `trust_domain`, or `Ok(None)` when the source has none.
    ///
    /// # Errors
    ///
    /// Only when the source itself cannot answer.
    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<Self::Item>>, Self::Error>;
}
