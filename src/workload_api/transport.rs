//! The RPC seam between [`WorkloadApiClient`](crate::workload_api::WorkloadApiClient)
//! and the agent.
//!
//! [`GrpcTransport`] talks gRPC over a `tonic` channel dialed from an
//! [`Endpoint`]. Tests and embedders can supply any other
//! [`WorkloadApiTransport`].

use std::future::Future;
use std::pin::Pin;

use hyper_util::rt::TokioIo;
use tokio_stream::Stream;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint as TonicEndpoint, Uri};
use tower::service_fn;

use crate::prelude::debug;
use crate::workload_api::client::header::MetadataAdder;
use crate::workload_api::endpoint::Endpoint;
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::pb::spiffe_workload_api_client::SpiffeWorkloadApiClient;
use crate::workload_api::pb::{
    JwtBundlesRequest, JwtBundlesResponse, JwtsvidRequest, JwtsvidResponse, ValidateJwtsvidRequest,
    ValidateJwtsvidResponse, X509BundlesRequest, X509BundlesResponse, X509svidRequest,
    X509svidResponse,
};

// Placeholder authority for connector-based channels; never resolved.
const TONIC_DUMMY_URI: &str = "http://[::]:50051";

/// A pending RPC.
pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, tonic::Status>> + Send + 'a>>;

/// Messages of a server-streaming RPC.
pub type RpcStream<T> = Pin<Box<dyn Stream<Item = Result<T, tonic::Status>> + Send + 'static>>;

/// The five Workload API RPCs.
pub trait WorkloadApiTransport: Send + Sync + 'static {
    /// Opens a `FetchX509SVID` stream.
    fn fetch_x509_svid(&self) -> RpcFuture<'_, RpcStream<X509svidResponse>>;

    /// Opens a `FetchX509Bundles` stream.
    fn fetch_x509_bundles(&self) -> RpcFuture<'_, RpcStream<X509BundlesResponse>>;

    /// Opens a `FetchJWTBundles` stream.
    fn fetch_jwt_bundles(&self) -> RpcFuture<'_, RpcStream<JwtBundlesResponse>>;

    /// Calls `FetchJWTSVID`.
    fn fetch_jwt_svid(&self, request: JwtsvidRequest) -> RpcFuture<'_, JwtsvidResponse>;

    /// Calls `ValidateJWTSVID`.
    fn validate_jwt_svid(
        &self,
        request: ValidateJwtsvidRequest,
    ) -> RpcFuture<'_, ValidateJwtsvidResponse>;
}

type GrpcClient = SpiffeWorkloadApiClient<InterceptedService<Channel, MetadataAdder>>;

/// gRPC transport over a `tonic` channel.
///
/// Every request carries the `workload.spiffe.io: true` metadata.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    client: GrpcClient,
}

impl GrpcTransport {
    /// Wraps an already connected channel.
    pub fn new(channel: Channel) -> Self {
        Self {
            client: SpiffeWorkloadApiClient::with_interceptor(channel, MetadataAdder),
        }
    }

    /// Dials `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadApiError::UnsupportedTransport`] if the endpoint kind
    /// is not available on this platform, or [`WorkloadApiError::Transport`]
    /// if the connection fails.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, WorkloadApiError> {
        debug!("Connecting to Workload API at {endpoint}");
        let channel = match endpoint {
            Endpoint::Unix(path) => connect_unix(path).await?,
            Endpoint::Tcp { host, port } => {
                let authority = std::net::SocketAddr::new(*host, *port);
                TonicEndpoint::try_from(format!("http://{authority}"))?
                    .connect()
                    .await?
            }
            Endpoint::NamedPipe(name) => connect_named_pipe(name).await?,
        };
        Ok(Self::new(channel))
    }
}

impl WorkloadApiTransport for GrpcTransport {
    fn fetch_x509_svid(&self) -> RpcFuture<'_, RpcStream<X509svidResponse>> {
        let mut client = self.client.clone();
        Box::pin(async move {
            let stream = client
                .fetch_x509svid(X509svidRequest::default())
                .await?
                .into_inner();
            Ok(Box::pin(stream) as RpcStream<_>)
        })
    }

    fn fetch_x509_bundles(&self) -> RpcFuture<'_, RpcStream<X509BundlesResponse>> {
        let mut client = self.client.clone();
        Box::pin(async move {
            let stream = client
                .fetch_x509_bundles(X509BundlesRequest::default())
                .await?
                .into_inner();
            Ok(Box::pin(stream) as RpcStream<_>)
        })
    }

    fn fetch_jwt_bundles(&self) -> RpcFuture<'_, RpcStream<JwtBundlesResponse>> {
        let mut client = self.client.clone();
        Box::pin(async move {
            let stream = client
                .fetch_jwt_bundles(JwtBundlesRequest::default())
                .await?
                .into_inner();
            Ok(Box::pin(stream) as RpcStream<_>)
        })
    }

    fn fetch_jwt_svid(&self, request: JwtsvidRequest) -> RpcFuture<'_, JwtsvidResponse> {
        let mut client = self.client.clone();
        Box::pin(async move { Ok(client.fetch_jwtsvid(request).await?.into_inner()) })
    }

    fn validate_jwt_svid(
        &self,
        request: ValidateJwtsvidRequest,
    ) -> RpcFuture<'_, ValidateJwtsvidResponse> {
        let mut client = self.client.clone();
        Box::pin(async move { Ok(client.validate_jwtsvid(request).await?.into_inner()) })
    }
}

#[cfg(unix)]
async fn connect_unix(path: &std::path::Path) -> Result<Channel, WorkloadApiError> {
    use std::sync::Arc;
    use tokio::net::UnixStream;

    let path = Arc::new(path.to_path_buf());
    let channel = TonicEndpoint::try_from(TONIC_DUMMY_URI)?
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = Arc::clone(&path);
            async move {
                let stream = UnixStream::connect(path.as_path()).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await?;
    Ok(channel)
}

#[cfg(not(unix))]
async fn connect_unix(_path: &std::path::Path) -> Result<Channel, WorkloadApiError> {
    Err(WorkloadApiError::UnsupportedTransport { scheme: "unix" })
}

#[cfg(windows)]
async fn connect_named_pipe(name: &str) -> Result<Channel, WorkloadApiError> {
    use std::sync::Arc;
    use tokio::net::windows::named_pipe::ClientOptions;

    let pipe: Arc<str> = Arc::from(format!(r"\\.\pipe\{name}"));
    let channel = TonicEndpoint::try_from(TONIC_DUMMY_URI)?
        .connect_with_connector(service_fn(move |_: Uri| {
            let pipe = Arc::clone(&pipe);
            async move {
                let client = ClientOptions::new().open(&*pipe)?;
                Ok::<_, std::io::Error>(TokioIo::new(client))
            }
        }))
        .await?;
    Ok(channel)
}

#[cfg(not(windows))]
async fn connect_named_pipe(_name: &str) -> Result<Channel, WorkloadApiError> {
    Err(WorkloadApiError::UnsupportedTransport { scheme: "npipe" })
}
