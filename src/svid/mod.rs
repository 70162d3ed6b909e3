//! X.509-SVID and JWT-SVID types.

use std::error::Error;
use std::sync::Arc;

pub mod jwt;
pub mod x509;

/// Hands out the current SVID.
///
/// Implementations hand out an `Arc` to the current SVID so that rotation
/// never invalidates a reference held by a caller.
pub trait SvidSource {
    /// [`x509::X509Svid`] for the Workload API sources.
    type Item: Send + Sync + 'static;

    /// Why no SVID is available.
    type Error: Error + Send + Sync + 'static;

    /// The SVID in use right now.
    ///
    /// # Errors
    ///
    /// When the source has no usable SVID, for example after it was closed.
    fn svid(&self) -> Result<Arc<Self::Item>, Self::Error>;
}
