use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::bundle::jwt::{JwtBundle, JwtBundleSet};
use crate::bundle::x509::{X509Bundle, X509BundleSet};
use crate::prelude::{debug, info};
use crate::source::builder::BundleSourceBuilder;
use crate::source::{wait_until_ready, Lifecycle, SourceError};
use crate::spiffe_id::TrustDomain;
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::{Watcher, WorkloadApiClient};

/// Live X.509 and JWT bundle source backed by the Workload API.
///
/// Watches both bundle streams and is initialized once each has delivered
/// a set. For the verifiers, hand them [`WorkloadBundleSource::get_x509_bundle_set`]
/// or [`WorkloadBundleSource::get_jwt_bundle_set`]: both sets implement
/// [`BundleSource`](crate::bundle::BundleSource).
#[derive(Clone)]
pub struct WorkloadBundleSource {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    x509: ArcSwapOption<X509BundleSet>,
    jwt: ArcSwapOption<JwtBundleSet>,
    lifecycle: Lifecycle,
}

impl fmt::Debug for WorkloadBundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadBundleSource")
            .field("lifecycle", &self.inner.lifecycle)
            .finish_non_exhaustive()
    }
}

impl WorkloadBundleSource {
    /// Returns a builder for a source on the `SPIFFE_ENDPOINT_SOCKET` endpoint.
    pub fn builder() -> BundleSourceBuilder {
        BundleSourceBuilder::new()
    }

    /// Starts watching X.509 and JWT bundles on `client` and waits until
    /// both have arrived.
    ///
    /// Both watches run until `cancel` fires, including when this call fails.
    ///
    /// # Errors
    ///
    /// * [`SourceError::InitializationTimeout`] if either set is missing after `timeout`,
    /// * [`SourceError::InitializationCancelled`] if `cancel` fires first,
    /// * [`SourceError::WorkloadApi`] if a watch stops with a terminal status.
    pub async fn create(
        client: WorkloadApiClient,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<Self, SourceError> {
        let client = client.with_backoff(client.backoff().clone());
        let inner = Arc::new(Inner::new());

        let mut watch_task = {
            let inner = Arc::clone(&inner);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::try_join!(
                    client.watch_x509_bundles(&*inner, &cancel),
                    client.watch_jwt_bundles(&*inner, &cancel),
                )
                .map(|_| ())
            })
        };

        wait_until_ready(&inner.lifecycle, &mut watch_task, timeout, &cancel).await?;
        info!("Bundle source initialized");
        Ok(Self { inner })
    }

    /// Returns the X.509 bundle for `trust_domain`.
    ///
    /// # Errors
    ///
    /// * [`SourceError::InvalidState`] before both sets have arrived,
    /// * [`SourceError::Disposed`] after [`WorkloadBundleSource::dispose`],
    /// * [`SourceError::BundleNotFound`] if there is no bundle for the trust domain.
    pub fn get_x509_bundle(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Arc<X509Bundle>, SourceError> {
        self.get_x509_bundle_set()?
            .get(trust_domain)
            .ok_or_else(|| SourceError::BundleNotFound(trust_domain.clone()))
    }

    /// Returns the JWT bundle for `trust_domain`.
    ///
    /// # Errors
    ///
    /// As for [`WorkloadBundleSource::get_x509_bundle`].
    pub fn get_jwt_bundle(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Arc<JwtBundle>, SourceError> {
        self.get_jwt_bundle_set()?
            .get(trust_domain)
            .ok_or_else(|| SourceError::BundleNotFound(trust_domain.clone()))
    }

    /// Returns the cached X.509 bundle set.
    ///
    /// # Errors
    ///
    /// State errors as for [`WorkloadBundleSource::get_x509_bundle`].
    pub fn get_x509_bundle_set(&self) -> Result<Arc<X509BundleSet>, SourceError> {
        self.inner.lifecycle.check()?;
        self.inner.x509.load_full().ok_or(SourceError::Disposed)
    }

    /// Returns the cached JWT bundle set.
    ///
    /// # Errors
    ///
    /// State errors as for [`WorkloadBundleSource::get_x509_bundle`].
    pub fn get_jwt_bundle_set(&self) -> Result<Arc<JwtBundleSet>, SourceError> {
        self.inner.lifecycle.check()?;
        self.inner.jwt.load_full().ok_or(SourceError::Disposed)
    }

    /// Notifies on every installed bundle set, X.509 or JWT.
    pub fn updated(&self) -> watch::Receiver<u64> {
        self.inner.lifecycle.subscribe()
    }

    /// Marks the source disposed and drops the cached bundles.
    ///
    /// The background watches keep running until their cancellation token fires.
    pub fn dispose(&self) {
        if self.inner.lifecycle.dispose() {
            debug!("Disposing bundle source");
            self.inner.clear();
        }
    }
}

impl Inner {
    fn new() -> Self {
        Self {
            x509: ArcSwapOption::empty(),
            jwt: ArcSwapOption::empty(),
            lifecycle: Lifecycle::new(),
        }
    }

    pub(crate) fn set_x509_bundle_set(&self, bundle_set: X509BundleSet) {
        self.install(&self.x509, bundle_set, "X.509");
    }

    pub(crate) fn set_jwt_bundle_set(&self, bundle_set: JwtBundleSet) {
        self.install(&self.jwt, bundle_set, "JWT");
    }

    fn install<T>(&self, slot: &ArcSwapOption<T>, bundle_set: T, kind: &str) {
        if self.lifecycle.is_disposed() {
            return;
        }

        debug!("Installing {kind} bundle set");
        slot.store(Some(Arc::new(bundle_set)));

        if self.x509.load().is_some() && self.jwt.load().is_some() {
            self.lifecycle.mark_initialized();
        }
        self.lifecycle.publish();

        if self.lifecycle.is_disposed() {
            self.clear();
        }
    }

    fn clear(&self) {
        self.x509.store(None);
        self.jwt.store(None);
    }
}

impl Watcher<X509BundleSet> for Inner {
    fn on_update(&self, bundle_set: X509BundleSet) {
        self.set_x509_bundle_set(bundle_set);
    }

    fn on_error(&self, error: &WorkloadApiError) {
        debug!("Bundle source X.509 watch error: {error}");
    }
}

impl Watcher<JwtBundleSet> for Inner {
    fn on_update(&self, bundle_set: JwtBundleSet) {
        self.set_jwt_bundle_set(bundle_set);
    }

    fn on_error(&self, error: &WorkloadApiError) {
        debug!("Bundle source JWT watch error: {error}");
    }
}
