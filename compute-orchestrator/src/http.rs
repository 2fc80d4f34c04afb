//! `reqwest` implementation of [`ControlPlaneApi`].

use crate::control_plane::{
    ControlPlaneApi, CreateAppRequest, CreateRuntimeRequest, ListFilter, RemoteFailure,
    RemoteResult, UpdateDiskRequest, UpdateRuntimeRequest,
};
use crate::credentials::Credential;
use crate::error::{OrchestratorError, Result};
use crate::model::{App, PersistentDisk, Runtime};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const API_PREFIX: [&str; 3] = ["api", "google", "v1"];

#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: Url,
}

impl HttpControlPlane {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            OrchestratorError::Config(format!("invalid control plane URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(OrchestratorError::Config(format!(
                "control plane URL '{base_url}' cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("compute-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OrchestratorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Base URL joined with the API prefix and `segments`, each segment
    /// percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteFailure::Other(format!("cannot extend URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, credential: &Credential) -> RequestBuilder {
        debug!(%method, %url, principal = credential.principal(), "control plane request");
        self.client
            .request(method, url)
            .bearer_auth(credential.bearer_token())
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> RemoteResult<T> {
        let response = check_status(builder.send().await.map_err(map_transport_error)?).await?;
        response.json::<T>().await.map_err(map_transport_error)
    }

    async fn execute(&self, builder: RequestBuilder) -> RemoteResult<()> {
        check_status(builder.send().await.map_err(map_transport_error)?).await?;
        Ok(())
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        url: Url,
        credential: &Credential,
        body: &B,
    ) -> RemoteResult<()> {
        self.execute(self.request(method, url, credential).json(body))
            .await
    }
}

fn list_query(filter: &ListFilter) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(labels) = &filter.labels {
        query.push(("labels", labels.clone()));
    }
    if filter.include_deleted {
        query.push(("includeDeleted", "true".to_string()));
    }
    if let Some(keys) = &filter.include_labels {
        query.push(("includeLabels", keys.clone()));
    }
    if let Some(role) = &filter.role {
        query.push(("role", role.clone()));
    }
    query
}

async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body
    };
    Err(RemoteFailure::status(status.as_u16(), message))
}

fn map_transport_error(err: reqwest::Error) -> RemoteFailure {
    if err.is_timeout() {
        RemoteFailure::Timeout(err.to_string())
    } else if err.is_connect() {
        RemoteFailure::Connect(err.to_string())
    } else if let Some(status) = err.status() {
        RemoteFailure::status(status.as_u16(), err.to_string())
    } else {
        RemoteFailure::Other(err.to_string())
    }
}

#[async_trait]
impl ControlPlaneApi for HttpControlPlane {
    async fn create_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        request: &CreateRuntimeRequest,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["runtimes", google_project, runtime_name])?;
        self.send_json(Method::POST, url, credential, request).await
    }

    async fn get_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
    ) -> RemoteResult<Runtime> {
        let url = self.endpoint(&["runtimes", google_project, runtime_name])?;
        self.fetch(self.request(Method::GET, url, credential)).await
    }

    async fn update_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        request: &UpdateRuntimeRequest,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["runtimes", google_project, runtime_name])?;
        self.send_json(Method::PATCH, url, credential, request).await
    }

    async fn delete_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        delete_disk: bool,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["runtimes", google_project, runtime_name])?;
        self.execute(
            self.request(Method::DELETE, url, credential)
                .query(&[("deleteDisk", delete_disk)]),
        )
        .await
    }

    async fn stop_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["runtimes", google_project, runtime_name, "stop"])?;
        self.execute(self.request(Method::POST, url, credential))
            .await
    }

    async fn list_runtimes(
        &self,
        credential: &Credential,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<Runtime>> {
        let url = self.endpoint(&["runtimes"])?;
        self.fetch(
            self.request(Method::GET, url, credential)
                .query(&list_query(filter)),
        )
        .await
    }

    async fn list_runtimes_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<Runtime>> {
        let url = self.endpoint(&["runtimes", google_project])?;
        self.fetch(
            self.request(Method::GET, url, credential)
                .query(&list_query(filter)),
        )
        .await
    }

    async fn create_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
        request: &CreateAppRequest,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["apps", google_project, app_name])?;
        self.send_json(Method::POST, url, credential, request).await
    }

    async fn get_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
    ) -> RemoteResult<App> {
        let url = self.endpoint(&["apps", google_project, app_name])?;
        self.fetch(self.request(Method::GET, url, credential)).await
    }

    async fn delete_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
        delete_disk: bool,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["apps", google_project, app_name])?;
        self.execute(
            self.request(Method::DELETE, url, credential)
                .query(&[("deleteDisk", delete_disk)]),
        )
        .await
    }

    async fn list_apps(
        &self,
        credential: &Credential,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<App>> {
        let url = self.endpoint(&["apps"])?;
        self.fetch(
            self.request(Method::GET, url, credential)
                .query(&list_query(filter)),
        )
        .await
    }

    async fn list_apps_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<App>> {
        let url = self.endpoint(&["apps", google_project])?;
        self.fetch(
            self.request(Method::GET, url, credential)
                .query(&list_query(filter)),
        )
        .await
    }

    async fn get_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
    ) -> RemoteResult<PersistentDisk> {
        let url = self.endpoint(&["disks", google_project, disk_name])?;
        self.fetch(self.request(Method::GET, url, credential)).await
    }

    async fn update_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
        request: &UpdateDiskRequest,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["disks", google_project, disk_name])?;
        self.send_json(Method::PATCH, url, credential, request).await
    }

    async fn delete_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["disks", google_project, disk_name])?;
        self.execute(self.request(Method::DELETE, url, credential))
            .await
    }

    async fn list_disks_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<PersistentDisk>> {
        let url = self.endpoint(&["disks", google_project])?;
        self.fetch(
            self.request(Method::GET, url, credential)
                .query(&list_query(filter)),
        )
        .await
    }

    async fn system_status(&self, credential: &Credential) -> RemoteResult<()> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteFailure::Other(format!("cannot extend URL {}", self.base_url)))?
            .pop_if_empty()
            .push("status");
        self.execute(self.request(Method::GET, url, credential))
            .await
    }
}
