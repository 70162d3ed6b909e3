use tokio_util::sync::CancellationToken;

use crate::bundle::jwt::{JwtBundle, JwtBundleSet};
use crate::spiffe_id::{SpiffeId, TrustDomain};
use crate::svid::jwt::JwtSvid;
use crate::workload_api::client::{Watcher, WorkloadApiClient};
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::pb::{
    JwtBundlesResponse, JwtsvidRequest, JwtsvidResponse, ValidateJwtsvidRequest,
};

impl WorkloadApiClient {
    /// Fetches JWT-SVIDs for `audience`.
    ///
    /// With `spiffe_id` set, only that identity is requested; otherwise the
    /// agent returns one JWT-SVID per identity the workload is entitled to.
    /// Tokens are parsed without signature verification: they come straight
    /// from the agent.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the call fails, no SVID is returned,
    /// or a token cannot be parsed for the requested audience.
    pub async fn fetch_jwt_svids<T: AsRef<str>>(
        &self,
        audience: &[T],
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<Vec<JwtSvid>, WorkloadApiError> {
        let response = self.call_fetch_jwt_svid(audience, spiffe_id).await?;
        jwt_svids_from_response(response, audience)
    }

    /// Fetches the first JWT-SVID returned for `audience`.
    ///
    /// # Errors
    ///
    /// See [`WorkloadApiClient::fetch_jwt_svids`].
    pub async fn fetch_jwt_svid<T: AsRef<str>>(
        &self,
        audience: &[T],
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<JwtSvid, WorkloadApiError> {
        self.fetch_jwt_svids(audience, spiffe_id)
            .await?
            .into_iter()
            .next()
            .ok_or(WorkloadApiError::EmptyResponse)
    }

    /// Fetches the JWT-SVID whose Workload API hint equals `hint`.
    ///
    /// # Errors
    ///
    /// [`WorkloadApiError::HintNotFound`] if no returned SVID carries the
    /// hint, otherwise see [`WorkloadApiClient::fetch_jwt_svids`].
    pub async fn fetch_jwt_svid_by_hint<T: AsRef<str>>(
        &self,
        audience: &[T],
        spiffe_id: Option<&SpiffeId>,
        hint: &str,
    ) -> Result<JwtSvid, WorkloadApiError> {
        self.fetch_jwt_svids(audience, spiffe_id)
            .await?
            .into_iter()
            .find(|svid| svid.hint() == Some(hint))
            .ok_or_else(|| WorkloadApiError::HintNotFound(hint.to_owned()))
    }

    /// Fetches the serialized token of the first JWT-SVID for `audience`.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the call fails or returns no SVID.
    pub async fn fetch_jwt_token<T: AsRef<str>>(
        &self,
        audience: &[T],
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<String, WorkloadApiError> {
        let response = self.call_fetch_jwt_svid(audience, spiffe_id).await?;
        response
            .svids
            .into_iter()
            .next()
            .map(|svid| svid.svid)
            .ok_or(WorkloadApiError::EmptyResponse)
    }

    /// Fetches the JWT bundles of all trust domains the workload trusts.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the call fails, the stream ends
    /// without a message, or a bundle cannot be parsed.
    pub async fn fetch_jwt_bundles(&self) -> Result<JwtBundleSet, WorkloadApiError> {
        let response = Self::first_message(self.transport.fetch_jwt_bundles()).await?;
        jwt_bundle_set_from_response(response)
    }

    /// Watches JWT bundle updates until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the loop if the agent answered with a
    /// `Cancelled` or `InvalidArgument` status.
    pub async fn watch_jwt_bundles(
        &self,
        watcher: &dyn Watcher<JwtBundleSet>,
        cancel: &CancellationToken,
    ) -> Result<(), WorkloadApiError> {
        self.watch_stream(
            "JWT bundles",
            |transport| transport.fetch_jwt_bundles(),
            jwt_bundle_set_from_response,
            watcher,
            cancel,
        )
        .await
    }

    /// Asks the agent to validate `token` for `audience`.
    ///
    /// On success the token is parsed locally for structured access; the
    /// signature check has already been done by the agent.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the agent rejects the token or it
    /// cannot be parsed.
    pub async fn validate_jwt_svid(
        &self,
        audience: &str,
        token: &str,
    ) -> Result<JwtSvid, WorkloadApiError> {
        let request = ValidateJwtsvidRequest {
            audience: audience.to_owned(),
            svid: token.to_owned(),
        };
        self.transport.validate_jwt_svid(request).await?;

        Ok(JwtSvid::parse_insecure(token, &[audience])?)
    }

    async fn call_fetch_jwt_svid<T: AsRef<str>>(
        &self,
        audience: &[T],
        spiffe_id: Option<&SpiffeId>,
    ) -> Result<JwtsvidResponse, WorkloadApiError> {
        let request = JwtsvidRequest {
            audience: audience.iter().map(|a| a.as_ref().to_owned()).collect(),
            spiffe_id: spiffe_id.map(ToString::to_string).unwrap_or_default(),
        };
        Ok(self.transport.fetch_jwt_svid(request).await?)
    }
}

fn jwt_svids_from_response<T: AsRef<str>>(
    response: JwtsvidResponse,
    audience: &[T],
) -> Result<Vec<JwtSvid>, WorkloadApiError> {
    if response.svids.is_empty() {
        return Err(WorkloadApiError::EmptyResponse);
    }

    response
        .svids
        .iter()
        .map(|svid| {
            let parsed = JwtSvid::parse_insecure(&svid.svid, audience)?;
            Ok(if svid.hint.is_empty() {
                parsed
            } else {
                parsed.with_hint(svid.hint.as_str())
            })
        })
        .collect()
}

pub(crate) fn jwt_bundle_set_from_response(
    response: JwtBundlesResponse,
) -> Result<JwtBundleSet, WorkloadApiError> {
    response
        .bundles
        .iter()
        .map(|(trust_domain, jwks)| {
            Ok(JwtBundle::from_jwt_authorities(
                TrustDomain::new(trust_domain)?,
                jwks,
            )?)
        })
        .collect()
}
