//! Builders for the Workload API sources.
//!
//! Without an explicit client, `build` connects to the endpoint named by
//! `SPIFFE_ENDPOINT_SOCKET`. Without a cancellation token, a fresh one is
//! created and the background watch lives as long as the runtime.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::source::{
    FirstSvid, JwtSource, KeyReleaseHook, SourceError, SvidPicker, WorkloadBundleSource,
    X509Source,
};
use crate::workload_api::WorkloadApiClient;

/// Settings shared by all source builders.
#[derive(Debug, Default)]
struct Common {
    client: Option<WorkloadApiClient>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl Common {
    async fn resolve(
        self,
    ) -> Result<(WorkloadApiClient, Option<Duration>, CancellationToken), SourceError> {
        let client = match self.client {
            Some(client) => client,
            None => WorkloadApiClient::connect_env().await?,
        };
        Ok((client, self.timeout, self.cancel.unwrap_or_default()))
    }
}

macro_rules! common_setters {
    () => {
        /// Uses `client` instead of connecting to `SPIFFE_ENDPOINT_SOCKET`.
        #[must_use]
        pub fn with_client(mut self, client: WorkloadApiClient) -> Self {
            self.common.client = Some(client);
            self
        }

        /// Fails `build` if the first update takes longer than `timeout`.
        #[must_use]
        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.common.timeout = Some(timeout);
            self
        }

        /// Stops the background watch when `cancel` fires.
        #[must_use]
        pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
            self.common.cancel = Some(cancel);
            self
        }
    };
}

/// Builds an [`X509Source`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use spiffe_workload::source::X509SourceBuilder;
/// use spiffe_workload::svid::x509::X509Svid;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cancel = CancellationToken::new();
/// let source = X509SourceBuilder::new()
///     .with_picker(|svids: &[Arc<X509Svid>]| {
///         svids.iter().find(|s| s.hint() == Some("internal")).cloned()
///     })
///     .with_timeout(Duration::from_secs(10))
///     .with_cancellation_token(cancel.clone())
///     .build()
///     .await?;
///
/// // ...
/// source.dispose();
/// cancel.cancel();
/// # Ok(())
/// # }
/// ```
pub struct X509SourceBuilder {
    common: Common,
    picker: Arc<dyn SvidPicker>,
    release: Option<Arc<dyn KeyReleaseHook>>,
}

impl fmt::Debug for X509SourceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509SourceBuilder")
            .field("common", &self.common)
            .field("release_hook", &self.release.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for X509SourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl X509SourceBuilder {
    /// Creates a builder that serves the first SVID of every update.
    pub fn new() -> Self {
        Self {
            common: Common::default(),
            picker: Arc::new(FirstSvid),
            release: None,
        }
    }

    common_setters!();

    /// Chooses the current SVID with `picker`.
    #[must_use]
    pub fn with_picker(mut self, picker: impl SvidPicker + 'static) -> Self {
        self.picker = Arc::new(picker);
        self
    }

    /// Calls `hook` with every SVID the source stops serving.
    #[must_use]
    pub fn with_key_release_hook(mut self, hook: impl KeyReleaseHook + 'static) -> Self {
        self.release = Some(Arc::new(hook));
        self
    }

    /// Starts the source and waits for its first X.509 context.
    ///
    /// # Errors
    ///
    /// See [`X509Source::create`]; also fails if no client was set and the
    /// default endpoint cannot be reached.
    pub async fn build(self) -> Result<X509Source, SourceError> {
        let (client, timeout, cancel) = self.common.resolve().await?;
        X509Source::start(client, self.picker, self.release, timeout, cancel).await
    }
}

/// Builds a [`JwtSource`].
#[derive(Debug, Default)]
pub struct JwtSourceBuilder {
    common: Common,
}

impl JwtSourceBuilder {
    /// Creates a builder with no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    common_setters!();

    /// Starts the source and waits for its first JWT bundle set.
    ///
    /// # Errors
    ///
    /// See [`JwtSource::create`]; also fails if no client was set and the
    /// default endpoint cannot be reached.
    pub async fn build(self) -> Result<JwtSource, SourceError> {
        let (client, timeout, cancel) = self.common.resolve().await?;
        JwtSource::create(client, timeout, cancel).await
    }
}

/// Builds a [`WorkloadBundleSource`].
#[derive(Debug, Default)]
pub struct BundleSourceBuilder {
    common: Common,
}

impl BundleSourceBuilder {
    /// Creates a builder with no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    common_setters!();

    /// Starts the source and waits for its first X.509 and JWT bundle sets.
    ///
    /// # Errors
    ///
    /// See [`WorkloadBundleSource::create`]; also fails if no client was set
    /// and the default endpoint cannot be reached.
    pub async fn build(self) -> Result<WorkloadBundleSource, SourceError> {
        let (client, timeout, cancel) = self.common.resolve().await?;
        WorkloadBundleSource::create(client, timeout, cancel).await
    }
}
