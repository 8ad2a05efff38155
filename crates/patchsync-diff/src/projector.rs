use crate::node::{FileChangeNode, MaterializedSides, arrange};
use crate::workspace::{DiffWorkspace, write_side};
use futures::future::join_all;
use patchsync_connection::{
    Connection, ConnectionError, ConnectionResult, DiffResponse, FileChange, Patch, Revision, Rid,
};
use std::sync::Arc;

/// Oldest and newest revision of a patch by timestamp.
pub fn edge_revisions(patch: &Patch) -> Option<(&Revision, &Revision)> {
    patch.edge_revisions()
}

/// Turns a patch's latest revision into file-change nodes backed by files
/// an external diff tool can open.
pub struct DiffProjector {
    connection: Arc<dyn Connection>,
    workspace: DiffWorkspace,
}

impl DiffProjector {
    pub fn new(connection: Arc<dyn Connection>, workspace: DiffWorkspace) -> Self {
        Self {
            connection,
            workspace,
        }
    }

    pub fn workspace(&self) -> &DiffWorkspace {
        &self.workspace
    }

    /// Projects `patch` within the workspace's current project.
    pub async fn project(&self, patch: &Patch) -> ConnectionResult<Vec<FileChangeNode>> {
        let rid = self.connection.current_project_id().await?;
        self.project_in(&rid, patch).await
    }

    pub async fn project_in(
        &self,
        rid: &Rid,
        patch: &Patch,
    ) -> ConnectionResult<Vec<FileChangeNode>> {
        let (_, latest) = edge_revisions(patch).ok_or_else(|| ConnectionError::NotFound {
            resource: "revision",
            id: patch.id.clone(),
        })?;
        let base = latest.base.as_str();
        let head = latest.oid.as_str();

        let response = self
            .connection
            .fetch_diff(rid, base, head)
            .await
            .inspect_err(|error| {
                tracing::warn!(rid = %rid, patch_id = %patch.id, %error, "diff fetch failed");
            })?;

        let nodes = join_all(
            response
                .diff
                .files
                .iter()
                .map(|change| self.materialize(change, &response, base, head)),
        )
        .await;
        tracing::debug!(
            patch_id = %patch.id,
            files = nodes.len(),
            "projected patch diff"
        );
        Ok(arrange(nodes))
    }

    async fn materialize(
        &self,
        change: &FileChange,
        response: &DiffResponse,
        base: &str,
        head: &str,
    ) -> FileChangeNode {
        let blob = |oid: &str| response.blob_content(oid).unwrap_or_default();
        let (sides, materialized) = match change {
            FileChange::Added { path, new } => {
                let sides = self.sides_for(base, head, path);
                let (old_written, new_written) = tokio::join!(
                    write_side(&sides.old, ""),
                    write_side(&sides.new, blob(&new.oid))
                );
                (Some(sides), old_written && new_written)
            }
            FileChange::Deleted { path, old } => {
                let sides = self.sides_for(base, head, path);
                let (old_written, new_written) = tokio::join!(
                    write_side(&sides.old, blob(&old.oid)),
                    write_side(&sides.new, "")
                );
                (Some(sides), old_written && new_written)
            }
            FileChange::Modified { path, old, new } => {
                let sides = self.sides_for(base, head, path);
                let (old_written, new_written) = tokio::join!(
                    write_side(&sides.old, blob(&old.oid)),
                    write_side(&sides.new, blob(&new.oid))
                );
                (Some(sides), old_written && new_written)
            }
            FileChange::Moved { .. } | FileChange::Copied { .. } => (None, false),
        };

        FileChangeNode::new(
            change.clone(),
            base.to_string(),
            head.to_string(),
            sides,
            materialized,
        )
    }

    fn sides_for(&self, base: &str, head: &str, path: &str) -> MaterializedSides {
        MaterializedSides {
            old: self.workspace.side_path(base, path),
            new: self.workspace.side_path(head, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchsync_connection::PatchStatus;
    use patchsync_connection::testing::fixtures;

    #[test]
    fn edge_revisions_use_timestamps_not_storage_order() {
        let patch = fixtures::patch(
            "ab12",
            "t",
            PatchStatus::Open,
            vec![
                fixtures::revision("r100", "b100", "o100", 100),
                fixtures::revision("r300", "b300", "o300", 300),
                fixtures::revision("r200", "b200", "o200", 200),
            ],
        );
        let (first, latest) = edge_revisions(&patch).expect("patch has revisions");
        assert_eq!(first.id, "r100");
        assert_eq!(latest.id, "r300");
    }
}
