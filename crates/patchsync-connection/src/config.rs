use crate::connection::BackendKind;
use crate::http::DEFAULT_HTTPD_BASE_URL;
use crate::rad_cli::{DEFAULT_RAD_PROGRAM, RadCli};
use std::path::PathBuf;

pub const NATIVE_BINDING_ENV: &str = "PATCHSYNC_NATIVE_BINDING";
pub const HTTPD_URL_ENV: &str = "PATCHSYNC_HTTPD_URL";
pub const RAD_PATH_ENV: &str = "PATCHSYNC_RAD_PATH";
pub const RAD_HOME_ENV: &str = "RAD_HOME";
pub const WORKSPACE_ENV: &str = "PATCHSYNC_WORKSPACE";

/// Node connection settings. Read once when the connection is selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub backend: BackendKind,
    pub httpd_base_url: String,
    pub rad_program: PathBuf,
    pub rad_home: Option<PathBuf>,
    pub workspace_dir: PathBuf,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Http,
            httpd_base_url: DEFAULT_HTTPD_BASE_URL.to_string(),
            rad_program: PathBuf::from(DEFAULT_RAD_PROGRAM),
            rad_home: None,
            workspace_dir: PathBuf::from("."),
        }
    }
}

impl ConnectionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let backend = match value(NATIVE_BINDING_ENV).as_deref().map(parse_flag) {
            Some(true) => BackendKind::NativeBinding,
            _ => BackendKind::Http,
        };

        Self {
            backend,
            httpd_base_url: value(HTTPD_URL_ENV).unwrap_or(defaults.httpd_base_url),
            rad_program: value(RAD_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.rad_program),
            rad_home: value(RAD_HOME_ENV).map(PathBuf::from),
            workspace_dir: value(WORKSPACE_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_dir),
        }
    }

    pub fn rad_cli(&self) -> RadCli {
        RadCli::new(&self.rad_program).with_home(self.rad_home.clone())
    }
}

/// Boolean-ish flag: `1`, `true`, `yes` and `on` (any case) are true.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
