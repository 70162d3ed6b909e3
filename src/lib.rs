#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Client core for the [SPIFFE Workload API].
//!
//! The crate parses and validates SPIFFE IDs, verifies X.509-SVID chains and
//! JWT-SVID tokens against trust bundles, talks to the Workload API over gRPC,
//! and keeps live caches of the issued material.
//!
//! ## X.509
//!
//! ```no_run
//! use spiffe_workload::{TrustDomain, X509Source};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Connects using SPIFFE_ENDPOINT_SOCKET.
//! let source = X509Source::builder().build().await?;
//!
//! let svid = source.get_x509_svid()?;
//! let cert_chain = svid.cert_chain();
//!
//! let trust_domain = TrustDomain::new("example.org")?;
//! let bundle = source.get_x509_bundle(&trust_domain)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## JWT
//!
//! ```no_run
//! use spiffe_workload::{JwtSvid, WorkloadApiClient};
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let client = WorkloadApiClient::connect_env().await?;
//!
//! let svid = client.fetch_jwt_svid(&["service-a"], None).await?;
//! println!("token for {}: {}", svid.spiffe_id(), svid.token());
//!
//! let bundles = client.fetch_jwt_bundles().await?;
//! let peer = JwtSvid::parse_and_validate(token, &bundles, &["service-a"])?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`tracing`**: emit log records through `tracing` instead of `log`.
//!
//! [SPIFFE Workload API]: https://github.com/spiffe/spiffe/blob/main/standards/SPIFFE_Workload_API.md

pub mod backoff;
pub mod bundle;
pub mod cert;
pub(crate) mod observability;
pub(crate) mod prelude;
pub mod source;
pub mod spiffe_id;
pub mod svid;
pub mod workload_api;

#[cfg(test)]
mod test_util;

pub use crate::{
    backoff::Backoff,
    bundle::jwt::{JwtAuthority, JwtBundle, JwtBundleError, JwtBundleSet},
    bundle::x509::{X509Bundle, X509BundleError, X509BundleSet},
    bundle::BundleSource,
    source::{JwtSource, SourceError, WorkloadBundleSource, X509Source},
    spiffe_id::{SpiffeId, SpiffeIdError, TrustDomain},
    svid::jwt::{JwtSvid, JwtSvidError},
    svid::x509::{X509Svid, X509SvidError},
    svid::SvidSource,
    workload_api::{WorkloadApiClient, WorkloadApiError, X509Context},
};
