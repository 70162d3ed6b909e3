use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bundle::x509::{X509Bundle, X509BundleSet};
use crate::spiffe_id::TrustDomain;
use crate::svid::x509::X509Svid;
use crate::workload_api::client::{Watcher, WorkloadApiClient};
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::pb::{X509BundlesResponse, X509svid, X509svidResponse};
use crate::workload_api::x509_context::X509Context;

impl WorkloadApiClient {
    /// Fetches the current X.509 context (SVIDs and bundles).
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the call fails, the stream ends
    /// without a message, or the message cannot be parsed.
    pub async fn fetch_x509_context(&self) -> Result<X509Context, WorkloadApiError> {
        let response = Self::first_message(self.transport.fetch_x509_svid()).await?;
        x509_context_from_response(response)
    }

    /// Fetches the default X.509 SVID, the first one in the response.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the call fails, no SVID is returned,
    /// or it cannot be parsed.
    pub async fn fetch_x509_svid(&self) -> Result<X509Svid, WorkloadApiError> {
        let response = Self::first_message(self.transport.fetch_x509_svid()).await?;
        let svid = response
            .svids
            .first()
            .ok_or(WorkloadApiError::EmptyResponse)?;
        parse_svid(svid)
    }

    /// Fetches the X.509 bundles of all trust domains the workload trusts.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the call fails, the stream ends
    /// without a message, or a bundle cannot be parsed.
    pub async fn fetch_x509_bundles(&self) -> Result<X509BundleSet, WorkloadApiError> {
        let response = Self::first_message(self.transport.fetch_x509_bundles()).await?;
        x509_bundle_set_from_response(response)
    }

    /// Watches X.509 context updates until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the loop if the agent answered with a
    /// `Cancelled` or `InvalidArgument` status.
    pub async fn watch_x509_context(
        &self,
        watcher: &dyn Watcher<X509Context>,
        cancel: &CancellationToken,
    ) -> Result<(), WorkloadApiError> {
        self.watch_stream(
            "X.509 context",
            |transport| transport.fetch_x509_svid(),
            x509_context_from_response,
            watcher,
            cancel,
        )
        .await
    }

    /// Watches X.509 bundle updates until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Same as [`WorkloadApiClient::watch_x509_context`].
    pub async fn watch_x509_bundles(
        &self,
        watcher: &dyn Watcher<X509BundleSet>,
        cancel: &CancellationToken,
    ) -> Result<(), WorkloadApiError> {
        self.watch_stream(
            "X.509 bundles",
            |transport| transport.fetch_x509_bundles(),
            x509_bundle_set_from_response,
            watcher,
            cancel,
        )
        .await
    }
}

fn parse_svid(svid: &X509svid) -> Result<X509Svid, WorkloadApiError> {
    Ok(X509Svid::parse_from_der_with_hint(
        &svid.x509_svid,
        &svid.x509_svid_key,
        &svid.hint,
    )?)
}

pub(crate) fn x509_context_from_response(
    response: X509svidResponse,
) -> Result<X509Context, WorkloadApiError> {
    if response.svids.is_empty() {
        return Err(WorkloadApiError::EmptyResponse);
    }

    let mut svids = Vec::with_capacity(response.svids.len());
    let mut bundle_set = X509BundleSet::new();

    for svid in &response.svids {
        let x509_svid = parse_svid(svid)?;
        let trust_domain = x509_svid.spiffe_id().trust_domain();
        bundle_set.add_bundle(X509Bundle::parse_from_der(trust_domain, &svid.bundle)?);
        svids.push(Arc::new(x509_svid));
    }

    for (trust_domain, der) in &response.federated_bundles {
        bundle_set.add_bundle(X509Bundle::parse_from_der(TrustDomain::new(trust_domain)?, der)?);
    }

    Ok(X509Context::new(svids, bundle_set))
}

pub(crate) fn x509_bundle_set_from_response(
    response: X509BundlesResponse,
) -> Result<X509BundleSet, WorkloadApiError> {
    response
        .bundles
        .iter()
        .map(|(trust_domain, der)| {
            Ok(X509Bundle::parse_from_der(TrustDomain::new(trust_domain)?, der)?)
        })
        .collect()
}
