//! A client for the SPIFFE Workload API.
//!
//! [`WorkloadApiClient`] offers one-shot fetches and reconnecting watch loops.
//! The caches in [`crate::source`] build on it.

/// Generated protobuf bindings for the `SpiffeWorkloadAPI` service.
#[allow(
    missing_docs,
    missing_debug_implementations,
    clippy::all,
    clippy::pedantic,
    unreachable_pub
)]
pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/_.rs"));
}

pub mod client;
pub mod endpoint;
pub mod error;
pub mod transport;
pub mod x509_context;

pub use client::{Watcher, WorkloadApiClient};
pub use endpoint::{Endpoint, EndpointError};
pub use error::WorkloadApiError;
pub use transport::{GrpcTransport, WorkloadApiTransport};
pub use x509_context::X509Context;
