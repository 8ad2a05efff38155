use crate::connection::{
    BackendKind, Connection, ConnectionError, ConnectionResult, ValidateOptions,
    report_validation_failure,
};
use crate::types::{DiffResponse, Patch, Project, Rid};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Synchronous surface of a node library linked into the process.
///
/// Implementations block on local storage, so [`BindingConnection`] never
/// calls them on the async executor directly.
pub trait NativeBinding: Send + Sync {
    /// Node id of the local profile. Fails when no profile is set up.
    fn node_id(&self) -> ConnectionResult<String>;

    fn rid_at(&self, path: &Path) -> ConnectionResult<Rid>;

    fn project(&self, rid: &str) -> ConnectionResult<Project>;

    fn projects(&self) -> ConnectionResult<Vec<Project>>;

    /// Every patch of the project regardless of status.
    fn patches(&self, rid: &str) -> ConnectionResult<Vec<Patch>>;

    fn patch(&self, rid: &str, patch_id: &str) -> ConnectionResult<Patch>;

    fn diff(&self, rid: &str, base: &str, oid: &str) -> ConnectionResult<DiffResponse>;
}

impl<T> NativeBinding for Arc<T>
where
    T: NativeBinding + ?Sized,
{
    fn node_id(&self) -> ConnectionResult<String> {
        (**self).node_id()
    }

    fn rid_at(&self, path: &Path) -> ConnectionResult<Rid> {
        (**self).rid_at(path)
    }

    fn project(&self, rid: &str) -> ConnectionResult<Project> {
        (**self).project(rid)
    }

    fn projects(&self) -> ConnectionResult<Vec<Project>> {
        (**self).projects()
    }

    fn patches(&self, rid: &str) -> ConnectionResult<Vec<Patch>> {
        (**self).patches(rid)
    }

    fn patch(&self, rid: &str, patch_id: &str) -> ConnectionResult<Patch> {
        (**self).patch(rid, patch_id)
    }

    fn diff(&self, rid: &str, base: &str, oid: &str) -> ConnectionResult<DiffResponse> {
        (**self).diff(rid, base, oid)
    }
}

/// Binding adapter: same contract as the wire adapter, served by an
/// in-process [`NativeBinding`].
#[derive(Clone)]
pub struct BindingConnection<B> {
    binding: Arc<B>,
    workspace_dir: PathBuf,
}

impl<B> BindingConnection<B>
where
    B: NativeBinding + 'static,
{
    pub fn new(binding: B, workspace_dir: impl Into<PathBuf>) -> Self {
        Self::from_shared(Arc::new(binding), workspace_dir)
    }

    pub fn from_shared(binding: Arc<B>, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            binding,
            workspace_dir: workspace_dir.into(),
        }
    }

    async fn call<T, F>(&self, operation: &'static str, f: F) -> ConnectionResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&B) -> ConnectionResult<T> + Send + 'static,
    {
        let binding = Arc::clone(&self.binding);
        tokio::task::spawn_blocking(move || f(binding.as_ref()))
            .await
            .map_err(|error| {
                ConnectionError::Binding(format!("{operation} did not complete: {error}"))
            })?
    }
}

#[async_trait]
impl<B> Connection for BindingConnection<B>
where
    B: NativeBinding + 'static,
{
    fn kind(&self) -> BackendKind {
        BackendKind::NativeBinding
    }

    async fn validate(&self, options: ValidateOptions) -> bool {
        match self.call("node_id", |binding| binding.node_id()).await {
            Ok(_) => true,
            Err(error) => {
                report_validation_failure(self.kind(), options, &error);
                false
            }
        }
    }

    async fn current_project_id(&self) -> ConnectionResult<Rid> {
        let path = self.workspace_dir.clone();
        self.call("rid_at", move |binding| binding.rid_at(&path))
            .await
            .map_err(|error| match error {
                resolution @ ConnectionError::Resolution(_) => resolution,
                other => ConnectionError::Resolution(other.to_string()),
            })
    }

    async fn project(&self, rid: &Rid) -> ConnectionResult<Project> {
        let rid = rid.clone();
        self.call("project", move |binding| binding.project(&rid)).await
    }

    async fn projects(&self) -> ConnectionResult<Vec<Project>> {
        self.call("projects", |binding| binding.projects()).await
    }

    async fn fetch_patch(&self, rid: &Rid, patch_id: &str) -> ConnectionResult<Patch> {
        let rid = rid.clone();
        let patch_id = patch_id.to_string();
        self.call("patch", move |binding| binding.patch(&rid, &patch_id)).await
    }

    async fn fetch_all_patches(&self, rid: &Rid) -> Vec<ConnectionResult<Vec<Patch>>> {
        let rid = rid.clone();
        vec![self.call("patches", move |binding| binding.patches(&rid)).await]
    }

    async fn fetch_diff(
        &self,
        rid: &Rid,
        base: &str,
        oid: &str,
    ) -> ConnectionResult<DiffResponse> {
        let rid = rid.clone();
        let base = base.to_string();
        let oid = oid.to_string();
        self.call("diff", move |binding| binding.diff(&rid, &base, &oid)).await
    }
}
