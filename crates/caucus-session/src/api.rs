//! Committee resource API: the request/response side of the session.
//!
//! Mutations go through here; their effect is only ever observed through
//! the session channel's broadcast.

use caucus_core::{
    AttendanceEntryType, AttendanceSession, CommitteeId, CommitteeSnapshot, CommitteeUpdate,
    Delegation, DelegationId,
};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

/// Resource operations the session store depends on. Implemented over HTTP
/// by [`HttpResourceApi`]; tests substitute an in-memory fake.
pub trait ResourceApi: Send + Sync + 'static {
    fn fetch_committee(
        &self,
        committee_id: CommitteeId,
    ) -> impl Future<Output = Result<CommitteeSnapshot, ApiError>> + Send;

    /// Latest attendance session of the committee, if one was ever opened.
    fn fetch_attendance(
        &self,
        committee_id: CommitteeId,
    ) -> impl Future<Output = Result<Option<AttendanceSession>, ApiError>> + Send;

    fn update_committee(
        &self,
        update: CommitteeUpdate,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn submit_attendance(
        &self,
        committee_id: CommitteeId,
        delegation_id: DelegationId,
        entry: AttendanceEntryType,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Replace the committee's delegation roster. The effect is observed
    /// by refetching the committee.
    fn update_participants(
        &self,
        committee_id: CommitteeId,
        delegations: Vec<DelegationId>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn list_delegations(&self) -> impl Future<Output = Result<Vec<Delegation>, ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpResourceApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpResourceApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: None,
        }
    }

    /// Bearer token for administrator operations.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|source| ApiError::Http {
                url: url.to_owned(),
                source,
            })?;
        let status = response.status();
        debug!(url, status = status.as_u16(), "resource api response");
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ApiError> {
        response.json::<T>().await.map_err(|source| ApiError::Http {
            url: url.to_owned(),
            source,
        })
    }
}

impl ResourceApi for HttpResourceApi {
    fn fetch_committee(
        &self,
        committee_id: CommitteeId,
    ) -> impl Future<Output = Result<CommitteeSnapshot, ApiError>> + Send {
        async move {
            let url = self.url(&format!("committees/{committee_id}"));
            let response = self.send(&url, self.client.get(&url)).await?;
            Self::json(&url, response).await
        }
    }

    fn fetch_attendance(
        &self,
        committee_id: CommitteeId,
    ) -> impl Future<Output = Result<Option<AttendanceSession>, ApiError>> + Send {
        async move {
            let url = self.url("attendance");
            let request = self
                .client
                .get(&url)
                .query(&[("committee_id", committee_id.0)]);
            let response = self.send(&url, request).await?;
            Self::json(&url, response).await
        }
    }

    fn update_committee(
        &self,
        update: CommitteeUpdate,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        async move {
            let url = self.url(&format!("committees/{}", update.committee_id));
            self.send(&url, self.client.patch(&url).json(&update))
                .await?;
            Ok(())
        }
    }

    fn submit_attendance(
        &self,
        committee_id: CommitteeId,
        delegation_id: DelegationId,
        entry: AttendanceEntryType,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        async move {
            let url = self.url("attendance/submit");
            let request = self.client.post(&url).query(&[
                ("committee_id", committee_id.0),
                ("delegation_id", delegation_id.0),
                ("submission", u32::from(entry.code())),
            ]);
            self.send(&url, request).await?;
            Ok(())
        }
    }

    fn update_participants(
        &self,
        committee_id: CommitteeId,
        delegations: Vec<DelegationId>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        async move {
            let url = self.url(&format!("committees/{committee_id}/participants"));
            self.send(&url, self.client.patch(&url).json(&delegations))
                .await?;
            Ok(())
        }
    }

    fn list_delegations(&self) -> impl Future<Output = Result<Vec<Delegation>, ApiError>> + Send {
        async move {
            let url = self.url("delegations");
            let response = self.send(&url, self.client.get(&url)).await?;
            Self::json(&url, response).await
        }
    }
}
