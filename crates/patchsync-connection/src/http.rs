use crate::connection::{
    BackendKind, Connection, ConnectionError, ConnectionResult, ValidateOptions,
    report_validation_failure,
};
use crate::rad_cli::ProjectResolver;
use crate::types::{DiffResponse, Patch, PatchStatus, Project, Rid};
use async_trait::async_trait;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;

pub const DEFAULT_HTTPD_BASE_URL: &str = "http://127.0.0.1:8080/api/v1";

/// Page size for per-status patch listings. The node caps pages here.
pub const PATCHES_PER_PAGE: usize = 500;

/// Request/response transport to the node's HTTP API.
#[async_trait]
pub trait NodeHttpClient: Send + Sync {
    /// GET `path` (relative to the API root, query string included) and
    /// decode the body as JSON.
    async fn get_json(&self, path: &str) -> ConnectionResult<Value>;
}

#[async_trait]
impl<T> NodeHttpClient for std::sync::Arc<T>
where
    T: NodeHttpClient + ?Sized,
{
    async fn get_json(&self, path: &str) -> ConnectionResult<Value> {
        (**self).get_json(path).await
    }
}

#[derive(Clone, Debug)]
pub struct ReqwestNodeClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestNodeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl NodeHttpClient for ReqwestNodeClient {
    async fn get_json(&self, path: &str) -> ConnectionResult<Value> {
        let url = self.endpoint(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| ConnectionError::Transport(format!("http get {url} failed: {err}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ConnectionError::Transport(format!("http read body failed: {err}")))?;
        if !status.is_success() {
            return Err(map_http_status(status, path, text));
        }
        serde_json::from_str(&text)
            .map_err(|err| ConnectionError::Decode(format!("http json decode failed: {err}")))
    }
}

fn map_http_status(status: reqwest::StatusCode, path: &str, body: String) -> ConnectionError {
    match status {
        reqwest::StatusCode::NOT_FOUND => ConnectionError::NotFound {
            resource: "resource",
            id: path.to_string(),
        },
        _ => ConnectionError::Transport(format!(
            "http request failed with status {status}: {body}"
        )),
    }
}

/// Wire adapter: every operation is one or more GETs against the node's
/// HTTP API. The current project is resolved locally (normally through the
/// `rad` CLI) since the node does not know the workspace.
#[derive(Clone, Debug)]
pub struct HttpConnection<H, R> {
    http_client: H,
    resolver: R,
    workspace_dir: PathBuf,
}

impl<H, R> HttpConnection<H, R> {
    pub fn new(http_client: H, resolver: R, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            http_client,
            resolver,
            workspace_dir: workspace_dir.into(),
        }
    }

    pub fn http_client(&self) -> &H {
        &self.http_client
    }
}

impl<H, R> HttpConnection<H, R>
where
    H: NodeHttpClient,
{
    async fn get<T: DeserializeOwned>(&self, path: &str) -> ConnectionResult<T> {
        let value = self.http_client.get_json(path).await?;
        serde_json::from_value(value)
            .map_err(|err| ConnectionError::Decode(format!("unexpected payload for {path}: {err}")))
    }

    async fn fetch_patches_with_status(
        &self,
        rid: &Rid,
        status: PatchStatus,
    ) -> ConnectionResult<Vec<Patch>> {
        self.get(&format!(
            "/projects/{rid}/patches?state={status}&perPage={PATCHES_PER_PAGE}"
        ))
        .await
    }
}

#[async_trait]
impl<H, R> Connection for HttpConnection<H, R>
where
    H: NodeHttpClient,
    R: ProjectResolver,
{
    fn kind(&self) -> BackendKind {
        BackendKind::Http
    }

    async fn validate(&self, options: ValidateOptions) -> bool {
        match self.http_client.get_json("/").await {
            Ok(_) => true,
            Err(error) => {
                report_validation_failure(self.kind(), options, &error);
                false
            }
        }
    }

    async fn current_project_id(&self) -> ConnectionResult<Rid> {
        self.resolver.rid_at(&self.workspace_dir).await
    }

    async fn project(&self, rid: &Rid) -> ConnectionResult<Project> {
        self.get(&format!("/projects/{rid}")).await.map_err(|error| match error {
            ConnectionError::NotFound { .. } => ConnectionError::NotFound {
                resource: "project",
                id: rid.clone(),
            },
            other => other,
        })
    }

    async fn projects(&self) -> ConnectionResult<Vec<Project>> {
        self.get("/projects?show=all").await
    }

    async fn fetch_patch(&self, rid: &Rid, patch_id: &str) -> ConnectionResult<Patch> {
        self.get(&format!("/projects/{rid}/patches/{patch_id}"))
            .await
            .map_err(|error| match error {
                ConnectionError::NotFound { .. } => ConnectionError::NotFound {
                    resource: "patch",
                    id: patch_id.to_string(),
                },
                other => other,
            })
    }

    async fn fetch_all_patches(&self, rid: &Rid) -> Vec<ConnectionResult<Vec<Patch>>> {
        // The API has no cross-status listing, so ask for each status at once.
        join_all(
            PatchStatus::ALL
                .into_iter()
                .map(|status| self.fetch_patches_with_status(rid, status)),
        )
        .await
    }

    async fn fetch_diff(
        &self,
        rid: &Rid,
        base: &str,
        oid: &str,
    ) -> ConnectionResult<DiffResponse> {
        self.get(&format!("/projects/{rid}/diff/{base}/{oid}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rad_cli::RadCli;

    #[test]
    fn endpoint_joins_base_and_path_with_one_slash() {
        let client = ReqwestNodeClient::new("http://127.0.0.1:8080/api/v1/");
        assert_eq!(
            client.endpoint("/projects/rad:z1"),
            "http://127.0.0.1:8080/api/v1/projects/rad:z1"
        );
        assert_eq!(client.endpoint("/"), "http://127.0.0.1:8080/api/v1/");
    }

    #[test]
    fn not_found_status_maps_to_not_found() {
        let error = map_http_status(
            reqwest::StatusCode::NOT_FOUND,
            "/projects/rad:z1",
            String::new(),
        );
        assert!(matches!(error, ConnectionError::NotFound { .. }));

        let error = map_http_status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "/",
            "boom".to_string(),
        );
        assert!(matches!(error, ConnectionError::Transport(message) if message.contains("boom")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unreachable_node_fails_validation_quietly() {
        let connection = HttpConnection::new(
            ReqwestNodeClient::new("http://127.0.0.1:9/api/v1"),
            RadCli::default(),
            ".",
        );
        let valid = connection
            .validate(ValidateOptions {
                minimize_user_notifications: true,
            })
            .await;
        assert!(!valid);
    }
}
