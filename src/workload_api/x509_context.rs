//! The X.509 material handed out by one `FetchX509SVID` message.

use std::sync::Arc;

use crate::bundle::x509::X509BundleSet;
use crate::svid::x509::X509Svid;

/// SVIDs issued to the workload together with the X.509 bundles it trusts.
///
/// The bundle set contains the bundle of every SVID's trust domain plus the
/// federated bundles.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct X509Context {
    svids: Vec<Arc<X509Svid>>,
    bundle_set: Arc<X509BundleSet>,
}

impl X509Context {
    /// Creates a new [`X509Context`].
    #[must_use]
    pub fn new(
        svids: impl IntoIterator<Item = Arc<X509Svid>>,
        bundle_set: impl Into<Arc<X509BundleSet>>,
    ) -> Self {
        Self {
            svids: svids.into_iter().collect(),
            bundle_set: bundle_set.into(),
        }
    }

    /// Returns the default SVID, the first one sent by the agent.
    pub fn default_svid(&self) -> Option<&Arc<X509Svid>> {
        self.svids.first()
    }

    /// Returns all SVIDs, in the order the agent sent them.
    pub fn svids(&self) -> &[Arc<X509Svid>] {
        &self.svids
    }

    /// Returns the X.509 bundles.
    pub fn bundle_set(&self) -> &Arc<X509BundleSet> {
        &self.bundle_set
    }
}
