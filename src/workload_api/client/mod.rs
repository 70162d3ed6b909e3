//! Workload API client for fetching and watching SPIFFE X.509 and JWT material.
//!
//! `WorkloadApiClient` offers one-shot calls (read the first message of a
//! stream, or a unary RPC) and watch loops that keep a stream open,
//! reconnecting with [`Backoff`] until cancelled.
//!
//! A workload may be issued several SVIDs. The agent can attach an optional
//! hint to each to tell them apart; hints carry no security meaning.

pub(crate) mod header;
pub(crate) mod jwt;
pub(crate) mod x509;

use std::fmt;
use std::sync::Arc;

use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::prelude::{debug, error, warn};
use crate::workload_api::endpoint::Endpoint;
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::transport::{GrpcTransport, RpcFuture, RpcStream, WorkloadApiTransport};

pub use header::{SPIFFE_HEADER_KEY, SPIFFE_HEADER_VALUE};

/// Receives the results of a watch loop.
///
/// Callbacks run on the watch task, in the order messages arrive; they should
/// return quickly.
pub trait Watcher<T>: Send + Sync {
    /// Called with every successfully converted message.
    fn on_update(&self, update: T);

    /// Called with every error, before it is classified as terminal or retried.
    fn on_error(&self, error: &WorkloadApiError);
}

/// Client for the SPIFFE Workload API.
///
/// Cloning is cheap; clones share the transport and the reconnect backoff.
#[derive(Clone)]
pub struct WorkloadApiClient {
    transport: Arc<dyn WorkloadApiTransport>,
    backoff: Arc<Backoff>,
}

impl fmt::Debug for WorkloadApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadApiClient")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl WorkloadApiClient {
    /// Creates a client over any transport, with the default backoff.
    pub fn new(transport: impl WorkloadApiTransport) -> Self {
        Self {
            transport: Arc::new(transport),
            backoff: Arc::new(Backoff::default()),
        }
    }

    /// Connects to the Workload API at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the endpoint cannot be reached.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, WorkloadApiError> {
        Ok(Self::new(GrpcTransport::connect(endpoint).await?))
    }

    /// Connects to the Workload API at the given endpoint URI, such as
    /// `unix:///tmp/spire-agent/public/api.sock` or `tcp://127.0.0.1:8081`.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the URI is invalid or the endpoint
    /// cannot be reached.
    pub async fn connect_to(endpoint: &str) -> Result<Self, WorkloadApiError> {
        Self::connect(&Endpoint::parse(endpoint)?).await
    }

    /// Connects to the Workload API named by `SPIFFE_ENDPOINT_SOCKET`.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the variable is unset or invalid, or
    /// the endpoint cannot be reached.
    pub async fn connect_env() -> Result<Self, WorkloadApiError> {
        Self::connect(&Endpoint::from_env()?).await
    }

    /// Returns a client on the same transport that uses `backoff` for its
    /// watch loops.
    #[must_use]
    pub fn with_backoff(&self, backoff: impl Into<Arc<Backoff>>) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            backoff: backoff.into(),
        }
    }

    /// The reconnect backoff shared by this client's watch loops.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    async fn first_message<R>(stream: RpcFuture<'_, RpcStream<R>>) -> Result<R, WorkloadApiError> {
        let mut stream = stream.await?;
        stream
            .next()
            .await
            .transpose()?
            .ok_or(WorkloadApiError::EmptyResponse)
    }

    /// Keeps a stream open, delivering converted messages to `watcher`.
    ///
    /// Returns `Ok(())` once `cancel` fires and `Err` on a terminal status.
    async fn watch_stream<R, T>(
        &self,
        name: &'static str,
        open: for<'a> fn(&'a dyn WorkloadApiTransport) -> RpcFuture<'a, RpcStream<R>>,
        convert: fn(R) -> Result<T, WorkloadApiError>,
        watcher: &dyn Watcher<T>,
        cancel: &CancellationToken,
    ) -> Result<(), WorkloadApiError> {
        while !cancel.is_cancelled() {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.drain_stream(open, convert, watcher) => result,
            };

            let delay = match result {
                // A clean end of stream is not reported, but still paced.
                Ok(()) => {
                    let delay = self.backoff.duration();
                    debug!("{name} stream closed by the agent, reconnecting in {delay:?}");
                    delay
                }
                Err(err) => {
                    watcher.on_error(&err);
                    if err.is_terminal() {
                        error!("{name} watch stopped: {err}");
                        return Err(err);
                    }
                    let delay = self.backoff.duration();
                    warn!("{name} watch failed, retrying in {delay:?}: {err}");
                    delay
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        debug!("{name} watch cancelled");
        Ok(())
    }

    async fn drain_stream<R, T>(
        &self,
        open: for<'a> fn(&'a dyn WorkloadApiTransport) -> RpcFuture<'a, RpcStream<R>>,
        convert: fn(R) -> Result<T, WorkloadApiError>,
        watcher: &dyn Watcher<T>,
    ) -> Result<(), WorkloadApiError> {
        let mut stream = open(self.transport.as_ref()).await?;
        while let Some(message) = stream.next().await {
            let update = convert(message?)?;
            self.backoff.reset();
            watcher.on_update(update);
        }
        Ok(())
    }
}
