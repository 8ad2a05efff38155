use crate::binding::{BindingConnection, NativeBinding};
use crate::config::ConnectionConfig;
use crate::connection::{BackendKind, Connection, ConnectionError, ConnectionResult};
use crate::http::{HttpConnection, ReqwestNodeClient};
use std::sync::{Arc, OnceLock};

/// Builds the configured backend once and hands out that same instance for
/// the rest of its lifetime. Later configuration changes are not observed;
/// construct a new selector (i.e. restart) to switch backends.
pub struct ConnectionSelector {
    config: ConnectionConfig,
    binding: Option<Arc<dyn NativeBinding>>,
    active: OnceLock<Arc<dyn Connection>>,
}

impl ConnectionSelector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            binding: None,
            active: OnceLock::new(),
        }
    }

    /// Registers the in-process node library used when the configuration
    /// asks for the native binding.
    pub fn with_binding(mut self, binding: Arc<dyn NativeBinding>) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn active(&self) -> ConnectionResult<Arc<dyn Connection>> {
        if let Some(connection) = self.active.get() {
            return Ok(Arc::clone(connection));
        }
        let built = self.build()?;
        // A concurrent first call may have won; either way one instance is kept.
        Ok(Arc::clone(self.active.get_or_init(|| built)))
    }

    fn build(&self) -> ConnectionResult<Arc<dyn Connection>> {
        let connection: Arc<dyn Connection> = match self.config.backend {
            BackendKind::Http => {
                let url = self.config.httpd_base_url.trim();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConnectionError::InvalidConfiguration(format!(
                        "node url must start with http:// or https:// (received '{url}')"
                    )));
                }
                Arc::new(HttpConnection::new(
                    ReqwestNodeClient::new(url),
                    self.config.rad_cli(),
                    self.config.workspace_dir.clone(),
                ))
            }
            BackendKind::NativeBinding => {
                let binding = self.binding.clone().or_else(linked_binding).ok_or_else(|| {
                    ConnectionError::Unsupported(
                        "native binding requested but no node library is linked".to_string(),
                    )
                })?;
                Arc::new(BindingConnection::new(
                    binding,
                    self.config.workspace_dir.clone(),
                ))
            }
        };
        tracing::info!(backend = %connection.kind(), "node connection selected");
        Ok(connection)
    }
}

#[cfg(feature = "radicle")]
fn linked_binding() -> Option<Arc<dyn NativeBinding>> {
    Some(Arc::new(crate::radicle_binding::RadicleBinding::new()))
}

#[cfg(not(feature = "radicle"))]
fn linked_binding() -> Option<Arc<dyn NativeBinding>> {
    None
}
