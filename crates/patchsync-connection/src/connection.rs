use crate::types::{DiffResponse, Patch, Project, Rid};
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("unable to resolve the current project: {0}")]
    Resolution(String),

    #[error("resource not found: {resource} ({id})")]
    NotFound { resource: &'static str, id: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("native binding failure: {0}")]
    Binding(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Http,
    NativeBinding,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Http => f.pad("http"),
            BackendKind::NativeBinding => f.pad("native-binding"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Failures are only worth a debug log; the caller will not surface them.
    pub minimize_user_notifications: bool,
}

/// What every node backend must support.
///
/// Expected failures are returned as [`ConnectionError`]; no method panics
/// on an unreachable node or a malformed payload.
#[async_trait]
pub trait Connection: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Reachability check. Never fails; any error is reported as `false`.
    async fn validate(&self, options: ValidateOptions) -> bool;

    /// RID of the project the current workspace belongs to.
    async fn current_project_id(&self) -> ConnectionResult<Rid>;

    async fn project(&self, rid: &Rid) -> ConnectionResult<Project>;

    async fn projects(&self) -> ConnectionResult<Vec<Project>>;

    async fn fetch_patch(&self, rid: &Rid, patch_id: &str) -> ConnectionResult<Patch>;

    /// Every patch of a project, as one result per independent request.
    /// Callers must check each element before flattening.
    async fn fetch_all_patches(&self, rid: &Rid) -> Vec<ConnectionResult<Vec<Patch>>>;

    async fn fetch_diff(&self, rid: &Rid, base: &str, oid: &str)
    -> ConnectionResult<DiffResponse>;
}

#[async_trait]
impl<T> Connection for std::sync::Arc<T>
where
    T: Connection + ?Sized,
{
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    async fn validate(&self, options: ValidateOptions) -> bool {
        (**self).validate(options).await
    }

    async fn current_project_id(&self) -> ConnectionResult<Rid> {
        (**self).current_project_id().await
    }

    async fn project(&self, rid: &Rid) -> ConnectionResult<Project> {
        (**self).project(rid).await
    }

    async fn projects(&self) -> ConnectionResult<Vec<Project>> {
        (**self).projects().await
    }

    async fn fetch_patch(&self, rid: &Rid, patch_id: &str) -> ConnectionResult<Patch> {
        (**self).fetch_patch(rid, patch_id).await
    }

    async fn fetch_all_patches(&self, rid: &Rid) -> Vec<ConnectionResult<Vec<Patch>>> {
        (**self).fetch_all_patches(rid).await
    }

    async fn fetch_diff(
        &self,
        rid: &Rid,
        base: &str,
        oid: &str,
    ) -> ConnectionResult<DiffResponse> {
        (**self).fetch_diff(rid, base, oid).await
    }
}

/// Logs a failed validation at a level matching how loudly the caller wants
/// to hear about it.
pub(crate) fn report_validation_failure(
    kind: BackendKind,
    options: ValidateOptions,
    error: &ConnectionError,
) {
    if options.minimize_user_notifications {
        tracing::debug!(backend = %kind, %error, "node validation failed");
    } else {
        tracing::warn!(backend = %kind, %error, "node validation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_error_expected_metadata() {
        let error = ConnectionError::NotFound {
            resource: "patch",
            id: "ab12".to_string(),
        };

        assert!(matches!(
            error,
            ConnectionError::NotFound {
                resource: "patch",
                ..
            }
        ));
        assert_eq!(error.to_string(), "resource not found: patch (ab12)");
    }

    #[test]
    fn backend_kind_display_names() {
        assert_eq!(BackendKind::Http.to_string(), "http");
        assert_eq!(BackendKind::NativeBinding.to_string(), "native-binding");
    }
}
