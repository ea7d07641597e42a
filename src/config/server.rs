use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// HTTP server configuration for the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix the demo routes are nested under (e.g. "/app").
    #[serde(default)]
    pub mount_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mount_path: None,
        }
    }
}

impl ServerConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("server.port must be non-zero".into());
        }
        if let Some(mount) = &self.mount_path
            && (!mount.starts_with('/') || mount.len() < 2 || mount.ends_with('/'))
        {
            return Err(format!(
                "server.mount_path '{mount}' must start with '/' and must not end with '/'"
            ));
        }
        Ok(())
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    1337
}
