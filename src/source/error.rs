use std::time::Duration;

use thiserror::Error;

use crate::spiffe_id::TrustDomain;
use crate::workload_api::error::WorkloadApiError;

/// Errors returned by the Workload API sources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    /// The source has not received its first update yet.
    #[error("source is not initialized")]
    InvalidState,

    /// The source has been disposed.
    #[error("source has been disposed")]
    Disposed,

    /// No update arrived within the initialization timeout.
    #[error("source initialization timed out after {0:?}")]
    InitializationTimeout(Duration),

    /// The cancellation token fired before the first update arrived.
    #[error("source initialization was cancelled")]
    InitializationCancelled,

    /// The cached bundle set has no bundle for the trust domain.
    #[error("no bundle found for trust domain: {0}")]
    BundleNotFound(TrustDomain),

    /// The SVID picker did not select any SVID from the latest update.
    #[error("no suitable X.509 SVID in the latest update")]
    NoSuitableSvid,

    /// The Workload API call failed, or the watch stopped with a terminal
    /// status before the first update.
    #[error("workload api error: {0}")]
    WorkloadApi(#[from] WorkloadApiError),
}
