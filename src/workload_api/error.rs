//! Errors from talking to the Workload API.

use thiserror::Error;

use crate::bundle::jwt::JwtBundleError;
use crate::bundle::x509::X509BundleError;
use crate::spiffe_id::SpiffeIdError;
use crate::svid::jwt::JwtSvidError;
use crate::svid::x509::X509SvidError;
use crate::workload_api::endpoint::EndpointError;

/// A failed Workload API call or an unusable response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkloadApiError {
    /// The Workload API stream ended, or a response carried no SVID.
    #[error("Workload API response is empty")]
    EmptyResponse,

    /// `SPIFFE_ENDPOINT_SOCKET` or the given address does not parse.
    #[error("bad Workload API endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// This build cannot dial the endpoint's transport.
    #[error("{scheme} endpoints are not supported on this platform")]
    UnsupportedTransport {
        /// `unix` or `npipe`.
        scheme: &'static str,
    },

    /// Failed to establish the gRPC channel.
    #[error("failed to connect to the Workload API: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status returned by the Workload API.
    #[error("Workload API call failed: {0}")]
    Status(#[from] tonic::Status),

    /// None of the returned JWT-SVIDs has the requested hint.
    #[error("no JWT-SVID with hint {0:?}")]
    HintNotFound(String),

    /// An X.509-SVID in the response was refused.
    #[error("response X.509-SVID: {0}")]
    X509Svid(#[from] X509SvidError),

    /// A JWT-SVID in the response was refused.
    #[error("response JWT-SVID: {0}")]
    JwtSvid(#[from] JwtSvidError),

    /// An X.509 bundle in the response does not parse.
    #[error("response X.509 bundle: {0}")]
    X509Bundle(#[from] X509BundleError),

    /// A JWKS in the response does not parse.
    #[error("response JWT bundle: {0}")]
    JwtBundle(#[from] JwtBundleError),

    /// A trust domain or SPIFFE ID in the response does not parse.
    #[error("response SPIFFE ID: {0}")]
    SpiffeId(#[from] SpiffeIdError),
}

impl WorkloadApiError {
    /// Returns the gRPC status code if this error came from the server.
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            Self::Status(status) => Some(status.code()),
            _ => None,
        }
    }

    /// Whether a watch loop must stop instead of reconnecting.
    ///
    /// `Cancelled` and `InvalidArgument` statuses are terminal; everything
    /// else, including malformed responses, is retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.code(),
            Some(tonic::Code::Cancelled | tonic::Code::InvalidArgument)
        )
    }
}
