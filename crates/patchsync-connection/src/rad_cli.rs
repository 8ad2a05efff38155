use crate::connection::{ConnectionError, ConnectionResult};
use crate::types::Rid;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub const DEFAULT_RAD_PROGRAM: &str = "rad";

/// Maps a working directory to the RID of the project checked out there.
#[async_trait]
pub trait ProjectResolver: Send + Sync {
    async fn rid_at(&self, path: &Path) -> ConnectionResult<Rid>;
}

#[async_trait]
impl<T> ProjectResolver for std::sync::Arc<T>
where
    T: ProjectResolver + ?Sized,
{
    async fn rid_at(&self, path: &Path) -> ConnectionResult<Rid> {
        (**self).rid_at(path).await
    }
}

/// Runs the `rad` command line tool.
#[derive(Clone, Debug)]
pub struct RadCli {
    program: PathBuf,
    home: Option<PathBuf>,
}

impl Default for RadCli {
    fn default() -> Self {
        Self::new(DEFAULT_RAD_PROGRAM)
    }
}

impl RadCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            home: None,
        }
    }

    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub async fn run(&self, args: &[&str], cwd: &Path) -> ConnectionResult<String> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(home) = self.home.as_ref() {
            command.env("RAD_HOME", home);
        }

        tracing::debug!(
            program = %self.program.display(),
            ?args,
            cwd = %cwd.display(),
            "running rad"
        );
        let output = command.output().await.map_err(|error| {
            ConnectionError::Transport(format!(
                "failed to launch '{}': {error}",
                self.program.display()
            ))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(1);
            return Err(ConnectionError::Transport(format!(
                "'{} {}' exited with code {code}: {}",
                self.program.display(),
                args.join(" "),
                if stderr.is_empty() { &stdout } else { &stderr }
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ProjectResolver for RadCli {
    /// Runs `rad .` inside `path`.
    async fn rid_at(&self, path: &Path) -> ConnectionResult<Rid> {
        let output = self
            .run(&["."], path)
            .await
            .map_err(|error| ConnectionError::Resolution(error.to_string()))?;
        parse_rid(&output).ok_or_else(|| {
            ConnectionError::Resolution(format!(
                "{} is not a Radicle repository",
                path.display()
            ))
        })
    }
}

/// First `rad:`-prefixed token in the output.
pub fn parse_rid(output: &str) -> Option<Rid> {
    output
        .split_whitespace()
        .find(|token| token.starts_with("rad:") && token.len() > "rad:".len())
        .map(str::to_string)
}
