use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::bundle::jwt::{JwtBundle, JwtBundleSet};
use crate::bundle::BundleSource;
use crate::prelude::{debug, info};
use crate::source::builder::JwtSourceBuilder;
use crate::source::{wait_until_ready, Lifecycle, SourceError};
use crate::spiffe_id::{SpiffeId, TrustDomain};
use crate::svid::jwt::JwtSvid;
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::{Watcher, WorkloadApiClient};

/// Live JWT bundle source backed by the Workload API.
///
/// Bundles are streamed and cached; JWT-SVIDs are fetched on demand for a
/// given audience with [`JwtSource::fetch_jwt_svids`].
///
/// # Examples
///
/// ```no_run
/// use spiffe_workload::source::JwtSource;
/// use spiffe_workload::svid::jwt::JwtSvid;
///
/// # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let source = JwtSource::builder().build().await?;
///
/// let svid = JwtSvid::parse_and_validate(token, &source, &["my-service"])?;
/// println!("caller is {}", svid.spiffe_id());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JwtSource {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    bundle_set: ArcSwapOption<JwtBundleSet>,
    client: WorkloadApiClient,
    lifecycle: Lifecycle,
}

impl fmt::Debug for JwtSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSource")
            .field("lifecycle", &self.inner.lifecycle)
            .finish_non_exhaustive()
    }
}

impl JwtSource {
    /// Returns a builder for a source on the `SPIFFE_ENDPOINT_SOCKET` endpoint.
    pub fn builder() -> JwtSourceBuilder {
        JwtSourceBuilder::new()
    }

    /// Starts watching JWT bundles on `client` and waits for the first set.
    ///
    /// The watch runs until `cancel` fires, including when this call fails.
    ///
    /// # Errors
    ///
    /// * [`SourceError::InitializationTimeout`] if no bundle set arrives within `timeout`,
    /// * [`SourceError::InitializationCancelled`] if `cancel` fires first,
    /// * [`SourceError::WorkloadApi`] if the watch stops with a terminal status.
    pub async fn create(
        client: WorkloadApiClient,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<Self, SourceError> {
        let client = client.with_backoff(client.backoff().clone());
        let inner = Arc::new(Inner::new(client.clone()));

        let mut watch_task = {
            let inner = Arc::clone(&inner);
            let cancel = cancel.clone();
            tokio::spawn(async move { client.watch_jwt_bundles(&*inner, &cancel).await })
        };

        wait_until_ready(&inner.lifecycle, &mut watch_task, timeout, &cancel).await?;
        info!("JWT source initialized");
        Ok(Self { inner })
    }

    /// Returns the JWT bundle for `trust_domain`.
    ///
    /// # Errors
    ///
    /// * [`SourceError::InvalidState`] before the first update,
    /// * [`SourceError::Disposed`] after [`JwtSource::dispose`],
    /// * [`SourceError::BundleNotFound`] if the cached set has no bundle for
    ///   the trust domain.
    pub fn get_jwt_bundle(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Arc<JwtBundle>, SourceError> {
        self.bundle_set()?
            .get(trust_domain)
            .ok_or_else(|| SourceError::BundleNotFound(trust_domain.clone()))
    }

    /// Returns the cached JWT bundle set.
    ///
    /// # Errors
    ///
    /// State errors as for [`JwtSource::get_jwt_bundle`].
    pub fn get_jwt_bundle_set(&self) -> Result<Arc<JwtBundleSet>, SourceError> {
        self.bundle_set()
    }

    /// Fetches JWT-SVIDs for `audience` from the Workload API.
    ///
    /// # Errors
    ///
    /// State errors as for [`JwtSource::get_jwt_bundle`], or
    /// [`SourceError::WorkloadApi`] if the fetch fails.
    pub async fn fetch_jwt_svids<T: AsRef<str>>(
        &self,
        audience: &[T],
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<Vec<JwtSvid>, SourceError> {
        self.inner.lifecycle.check()?;
        Ok(self.inner.client.fetch_jwt_svids(audience, spiffe_id).await?)
    }

    /// Fetches the first JWT-SVID for `audience` from the Workload API.
    ///
    /// # Errors
    ///
    /// See [`JwtSource::fetch_jwt_svids`].
    pub async fn fetch_jwt_svid<T: AsRef<str>>(
        &self,
        audience: &[T],
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<JwtSvid, SourceError> {
        self.inner.lifecycle.check()?;
        Ok(self.inner.client.fetch_jwt_svid(audience, spiffe_id).await?)
    }

    /// Notifies on every installed bundle set with its sequence number.
    pub fn updated(&self) -> watch::Receiver<u64> {
        self.inner.lifecycle.subscribe()
    }

    /// Marks the source disposed and drops the cached bundles.
    ///
    /// The background watch keeps running until its cancellation token fires.
    pub fn dispose(&self) {
        if self.inner.lifecycle.dispose() {
            debug!("Disposing JWT source");
            self.inner.bundle_set.store(None);
        }
    }

    fn bundle_set(&self) -> Result<Arc<JwtBundleSet>, SourceError> {
        self.inner.lifecycle.check()?;
        self.inner.bundle_set.load_full().ok_or(SourceError::Disposed)
    }
}

impl Inner {
    fn new(client: WorkloadApiClient) -> Self {
        Self {
            bundle_set: ArcSwapOption::empty(),
            client,
            lifecycle: Lifecycle::new(),
        }
    }

    pub(crate) fn set_jwt_bundle_set(&self, bundle_set: JwtBundleSet) {
        if self.lifecycle.is_disposed() {
            return;
        }

        debug!("Installing JWT bundle set with {} bundles", bundle_set.len());
        self.bundle_set.store(Some(Arc::new(bundle_set)));
        self.lifecycle.mark_initialized();
        self.lifecycle.publish();

        if self.lifecycle.is_disposed() {
            self.bundle_set.store(None);
        }
    }
}

impl Watcher<JwtBundleSet> for Inner {
    fn on_update(&self, bundle_set: JwtBundleSet) {
        self.set_jwt_bundle_set(bundle_set);
    }

    fn on_error(&self, error: &WorkloadApiError) {
        debug!("JWT source watch error: {error}");
    }
}

impl BundleSource for JwtSource {
    type Item = JwtBundle;
    type Error = SourceError;

    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<JwtBundle>>, SourceError> {
        Ok(self.bundle_set()?.get(trust_domain))
    }
}
