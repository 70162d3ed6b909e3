use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::bundle::x509::{X509Bundle, X509BundleSet};
use crate::bundle::BundleSource;
use crate::prelude::{debug, info, warn};
use crate::source::builder::X509SourceBuilder;
use crate::source::{wait_until_ready, KeyReleaseHook, Lifecycle, SourceError, SvidPicker};
use crate::spiffe_id::TrustDomain;
use crate::svid::x509::X509Svid;
use crate::svid::SvidSource;
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::{Watcher, WorkloadApiClient, X509Context};

/// Live X.509 SVID and bundle source backed by the Workload API.
///
/// Cloning is cheap: clones share the cache and the background task.
///
/// # Examples
///
/// ```no_run
/// use spiffe_workload::source::X509Source;
/// use spiffe_workload::spiffe_id::TrustDomain;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = X509Source::builder().build().await?;
///
/// let svid = source.get_x509_svid()?;
/// let bundle = source.get_x509_bundle(&svid.spiffe_id().trust_domain())?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct X509Source {
    inner: Arc<Inner>,
}

struct Snapshot {
    context: X509Context,
    svid: Option<Arc<X509Svid>>,
}

pub(super) struct Inner {
    snapshot: ArcSwapOption<Snapshot>,
    picker: Arc<dyn SvidPicker>,
    release: Option<Arc<dyn KeyReleaseHook>>,
    lifecycle: Lifecycle,
}

impl fmt::Debug for X509Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509Source")
            .field("lifecycle", &self.inner.lifecycle)
            .finish_non_exhaustive()
    }
}

impl X509Source {
    /// Returns a builder for a source on the `SPIFFE_ENDPOINT_SOCKET` endpoint.
    pub fn builder() -> X509SourceBuilder {
        X509SourceBuilder::new()
    }

    /// Starts watching X.509 contexts on `client` and waits for the first one.
    ///
    /// The watch runs until `cancel` fires, including when this call fails.
    ///
    /// # Errors
    ///
    /// * [`SourceError::InitializationTimeout`] if no context arrives within `timeout`,
    /// * [`SourceError::InitializationCancelled`] if `cancel` fires first,
    /// * [`SourceError::WorkloadApi`] if the watch stops with a terminal status.
    pub async fn create(
        client: WorkloadApiClient,
        picker: impl SvidPicker + 'static,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<Self, SourceError> {
        Self::start(client, Arc::new(picker), None, timeout, cancel).await
    }

    pub(super) async fn start(
        client: WorkloadApiClient,
        picker: Arc<dyn SvidPicker>,
        release: Option<Arc<dyn KeyReleaseHook>>,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<Self, SourceError> {
        let inner = Arc::new(Inner::new(picker, release));
        let client = client.with_backoff(client.backoff().clone());

        let mut watch_task = {
            let inner = Arc::clone(&inner);
            let cancel = cancel.clone();
            tokio::spawn(async move { client.watch_x509_context(&*inner, &cancel).await })
        };

        wait_until_ready(&inner.lifecycle, &mut watch_task, timeout, &cancel).await?;
        info!("X.509 source initialized");
        Ok(Self { inner })
    }

    /// Returns the SVID chosen by the picker from the latest update.
    ///
    /// # Errors
    ///
    /// [`SourceError::InvalidState`] before the first update,
    /// [`SourceError::Disposed`] after [`X509Source::dispose`], and
    /// [`SourceError::NoSuitableSvid`] if the picker chose nothing.
    pub fn get_x509_svid(&self) -> Result<Arc<X509Svid>, SourceError> {
        self.snapshot()?
            .svid
            .clone()
            .ok_or(SourceError::NoSuitableSvid)
    }

    /// Returns the X.509 bundle for `trust_domain`.
    ///
    /// # Errors
    ///
    /// [`SourceError::BundleNotFound`] if the latest update has no bundle for
    /// the trust domain; state errors as for [`X509Source::get_x509_svid`].
    pub fn get_x509_bundle(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Arc<X509Bundle>, SourceError> {
        self.snapshot()?
            .context
            .bundle_set()
            .get(trust_domain)
            .ok_or_else(|| SourceError::BundleNotFound(trust_domain.clone()))
    }

    /// Returns the bundle set of the latest update.
    ///
    /// # Errors
    ///
    /// State errors as for [`X509Source::get_x509_svid`].
    pub fn get_x509_bundle_set(&self) -> Result<Arc<X509BundleSet>, SourceError> {
        Ok(Arc::clone(self.snapshot()?.context.bundle_set()))
    }

    /// Returns the latest X.509 context as received from the agent.
    ///
    /// # Errors
    ///
    /// State errors as for [`X509Source::get_x509_svid`].
    pub fn get_x509_context(&self) -> Result<X509Context, SourceError> {
        Ok(self.snapshot()?.context.clone())
    }

    /// Notifies on every installed update with its sequence number.
    pub fn updated(&self) -> watch::Receiver<u64> {
        self.inner.lifecycle.subscribe()
    }

    /// Marks the source disposed and drops the cached snapshot.
    ///
    /// The background watch keeps running until its cancellation token fires.
    pub fn dispose(&self) {
        if self.inner.lifecycle.dispose() {
            debug!("Disposing X.509 source");
            self.inner.clear();
        }
    }

    #[cfg(test)]
    fn detached(picker: Arc<dyn SvidPicker>, release: Option<Arc<dyn KeyReleaseHook>>) -> Self {
        Self {
            inner: Arc::new(Inner::new(picker, release)),
        }
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>, SourceError> {
        self.inner.lifecycle.check()?;
        self.inner.snapshot.load_full().ok_or(SourceError::Disposed)
    }
}

impl Inner {
    fn new(picker: Arc<dyn SvidPicker>, release: Option<Arc<dyn KeyReleaseHook>>) -> Self {
        Self {
            snapshot: ArcSwapOption::empty(),
            picker,
            release,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Installs the SVID picked from `context`, releasing the one it replaces.
    pub(crate) fn set_x509_context(&self, context: X509Context) {
        if self.lifecycle.is_disposed() {
            return;
        }

        let svid = self.picker.pick(context.svids());
        match &svid {
            Some(svid) => debug!("Installing X.509 context, current SVID {}", svid.spiffe_id()),
            None => warn!(
                "No suitable SVID among the {} received; bundles are still updated",
                context.svids().len()
            ),
        }

        let new_svid = svid.clone();
        let previous = self.snapshot.swap(Some(Arc::new(Snapshot { context, svid })));
        self.release_replaced(previous.as_deref(), new_svid.as_ref());

        self.lifecycle.mark_initialized();
        self.lifecycle.publish();

        // A dispose that raced this install must not leave a snapshot behind.
        if self.lifecycle.is_disposed() {
            self.clear();
        }
    }

    fn release_replaced(&self, previous: Option<&Snapshot>, current: Option<&Arc<X509Svid>>) {
        let (Some(hook), Some(old)) = (&self.release, previous.and_then(|s| s.svid.as_ref())) else {
            return;
        };
        if current.is_some_and(|current| Arc::ptr_eq(current, old) || **current == **old) {
            return;
        }
        hook.release(old);
    }

    fn clear(&self) {
        let previous = self.snapshot.swap(None);
        self.release_replaced(previous.as_deref(), None);
    }
}

impl Watcher<X509Context> for Inner {
    fn on_update(&self, context: X509Context) {
        self.set_x509_context(context);
    }

    fn on_error(&self, error: &WorkloadApiError) {
        debug!("X.509 source watch error: {error}");
    }
}

impl BundleSource for X509Source {
    type Item = X509Bundle;
    type Error = SourceError;

    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<X509Bundle>>, SourceError> {
        Ok(self.snapshot()?.context.bundle_set().get(trust_domain))
    }
}

impl SvidSource for X509Source {
    type Item = X509Svid;
    type Error = SourceError;

    fn svid(&self) -> Result<Arc<X509Svid>, SourceError> {
        self.get_x509_svid()
    }
}
