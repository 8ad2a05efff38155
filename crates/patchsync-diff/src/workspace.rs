use patchsync_connection::short_id;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

pub const SESSION_DIR_PREFIX: &str = "patchsync-diff-";

/// Directory that holds materialized diff sides.
///
/// A session workspace lives in a fresh temporary directory that is removed
/// when the workspace is dropped. A persistent workspace is left alone.
#[derive(Debug)]
pub struct DiffWorkspace {
    root: PathBuf,
    session: Option<TempDir>,
}

impl DiffWorkspace {
    pub fn session() -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(SESSION_DIR_PREFIX)
            .tempdir()?;
        tracing::debug!(root = %dir.path().display(), "diff workspace created");
        Ok(Self {
            root: dir.path().to_path_buf(),
            session: Some(dir),
        })
    }

    pub fn persistent(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            session: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_session(&self) -> bool {
        self.session.is_some()
    }

    /// `{root}/{short commit}/{path}`. Components that would leave the
    /// commit directory are dropped.
    pub fn side_path(&self, commit: &str, path: &str) -> PathBuf {
        let mut resolved = self.root.join(short_id(commit));
        for component in Path::new(path).components() {
            if let Component::Normal(part) = component {
                resolved.push(part);
            }
        }
        resolved
    }
}

/// Writes `contents` to `path`, creating parent directories. Failures are
/// logged and reported as `false`.
pub(crate) async fn write_side(path: &Path, contents: &str) -> bool {
    let result = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await
    }
    .await;

    match result {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to materialize diff side");
            false
        }
    }
}
