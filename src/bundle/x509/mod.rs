//! X.509 bundle types.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use crate::bundle::BundleSource;
use crate::cert::error::CertificateError;
use crate::cert::parsing::to_certificate_vec_unbounded;
use crate::cert::Certificate;
use crate::spiffe_id::TrustDomain;

/// The X.509 authorities (root certificates) of one [`TrustDomain`].
///
/// A bundle may be empty; nothing verifies against an empty bundle.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct X509Bundle {
    trust_domain: TrustDomain,
    authorities: Vec<Certificate>,
}

/// Error building an [`X509Bundle`].
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum X509BundleError {
    /// An authority is not a DER X.509 certificate.
    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

impl X509Bundle {
    /// An empty bundle for `trust_domain`.
    pub fn new(trust_domain: TrustDomain) -> Self {
        Self {
            trust_domain,
            authorities: Vec::new(),
        }
    }

    /// Parses concatenated DER certificates, as the Workload API sends them.
    /// Empty input gives an empty bundle.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not a sequence of DER X.509 certificates.
    pub fn parse_from_der(trust_domain: TrustDomain, der: &[u8]) -> Result<Self, X509BundleError> {
        Ok(Self {
            trust_domain,
            authorities: to_certificate_vec_unbounded(der)?,
        })
    }

    /// Appends one DER authority.
    ///
    /// # Errors
    ///
    /// Fails if `der` is not a DER X.509 certificate.
    pub fn add_authority(&mut self, der: &[u8]) -> Result<(), X509BundleError> {
        self.authorities.push(Certificate::try_from(der)?);
        Ok(())
    }

    /// The bundle's trust domain.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// The authorities, in the order received.
    pub fn authorities(&self) -> &[Certificate] {
        &self.authorities
    }
}

/// [`X509Bundle`]s keyed by [`TrustDomain`].
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct X509BundleSet {
    bundles: BTreeMap<TrustDomain, Arc<X509Bundle>>,
}

impl X509BundleSet {
    /// An empty set.
    pub const fn new() -> Self {
        Self {
            bundles: BTreeMap::new(),
        }
    }

    /// Adds `bundle`, replacing the bundle of the same trust domain.
    pub fn add_bundle(&mut self, bundle: X509Bundle) {
        self.bundles.insert(bundle.trust_domain.clone(), Arc::new(bundle));
    }

    /// The bundle of `trust_domain`, if any.
    pub fn get(&self, trust_domain: &TrustDomain) -> Option<Arc<X509Bundle>> {
        self.bundles.get(trust_domain).map(Arc::clone)
    }

    /// Iterates over the bundles in trust domain order.
    pub fn iter(&self) -> impl Iterator<Item = (&TrustDomain, &Arc<X509Bundle>)> {
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

impl BundleSource for X509BundleSet {
    type Item = X509Bundle;
    type Error = Infallible;

    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<Self::Item>>, Self::Error> {
        Ok(self.get(trust_domain))
    }
}

impl Extend<X509Bundle> for X509BundleSet {
    fn extend<I: IntoIterator<Item = X509Bundle>>(&mut self, bundles: I) {
        bundles.into_iter().for_each(|b| self.add_bundle(b));
    }
}

impl FromIterator<X509Bundle> for X509BundleSet {
    fn from_iter<I: IntoIterator<Item = X509Bundle>>(bundles: I) -> Self {
        let mut set = Self::new();
        set.extend(bundles);
        set
    }
}
