//! Server configuration

use std::net::{IpAddr, SocketAddr};

/// Bind, logging and key-material settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
    pub private_key_path: String,
    pub public_key_path: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("PALEGATE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PALEGATE_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            log_level: std::env::var("PALEGATE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: std::env::var("PALEGATE_LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string()),
            private_key_path: std::env::var("BACKEND_PRIVATE_KEY_PATH")
                .unwrap_or_else(|_| "keys/private.pem".to_string()),
            public_key_path: std::env::var("BACKEND_PUBLIC_KEY_PATH")
                .unwrap_or_else(|_| "keys/public.pem".to_string()),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
