//! Server configuration
//!
//! Configuration of the `doppio` binary, loaded from a JSON file and
//! overridden from the command line:
//!
//! ```json
//! {
//!   "hostname": "0.0.0.0",
//!   "port": 8080,
//!   "max_body_size": 1048576,
//!   "static_files": [
//!     { "prefix": "/assets", "directory": "./public",
//!       "options": { "cache_control": "no-cache" } }
//!   ],
//!   "health_check_path": "/health",
//!   "shutdown_timeout_secs": 30
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use doppio_core::{handler_fn, Config, Method, DEFAULT_MAX_BODY_SIZE};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::App;
use crate::error::{ConfigError, ConfigResult};
use crate::r#static::{FileServer, StaticOptions};

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum JSON request body size in bytes; negative disables the limit
    #[serde(default = "default_max_body_size")]
    pub max_body_size: i64,

    #[serde(default)]
    pub static_files: Vec<StaticFileConfig>,

    /// Path of the JSON health endpoint; empty disables it
    #[serde(default = "default_health_path")]
    pub health_check_path: String,

    /// Time granted to open connections on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

/// Static file serving configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticFileConfig {
    /// URL prefix: /static
    pub prefix: String,

    /// Directory path: ./public
    pub directory: String,

    #[serde(default)]
    pub options: StaticFileOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticFileOptions {
    /// Cache-Control header value; the handler default when absent
    #[serde(default)]
    pub cache_control: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            max_body_size: default_max_body_size(),
            static_files: Vec::new(),
            health_check_path: default_health_path(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.hostname.is_empty() {
            return Err(ConfigError::Invalid("Hostname cannot be empty".to_string()));
        }
        if !self.health_check_path.is_empty() && !self.health_check_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "Health check path `{}` must start with '/'",
                self.health_check_path
            )));
        }
        for entry in &self.static_files {
            if !entry.prefix.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "Static prefix `{}` must start with '/'",
                    entry.prefix
                )));
            }
            if entry.directory.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Static prefix `{}` has no directory",
                    entry.prefix
                )));
            }
        }
        Ok(())
    }

    /// Listen address as `hostname:port`
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Library configuration of the application
    pub fn app_config(&self) -> Config {
        Config {
            max_body_size: self.max_body_size,
        }
    }
}

impl App {
    /// Build an application from a validated server configuration
    ///
    /// Registers one static file handler per entry and the health endpoint.
    pub fn from_config(config: &ServerConfig) -> ConfigResult<Self> {
        config.validate()?;
        let app = App::with_config(config.app_config());

        for entry in &config.static_files {
            let mut options = StaticOptions::default();
            if let Some(cache_control) = &entry.options.cache_control {
                options.cache_control = Some(cache_control.clone());
            }
            let files = FileServer::with_options(&entry.prefix, &entry.directory, options);
            app.try_route(Method::GET, &entry.prefix, Arc::new(files))?;
            info!(prefix = %entry.prefix, directory = %entry.directory, "static files");
        }

        if !config.health_check_path.is_empty() {
            let health = handler_fn(|c| {
                Box::pin(async move {
                    let status = serde_json::json!({
                        "status": "healthy",
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    });
                    c.json(StatusCode::OK, &status)
                })
            });
            app.try_route(Method::GET, &config.health_check_path, health)?;
            info!(path = %config.health_check_path, "health check");
        }

        Ok(app)
    }
}

fn default_hostname() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_body_size() -> i64 {
    DEFAULT_MAX_BODY_SIZE
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.socket_addr(), "127.0.0.1:3000");
        assert_eq!(config.max_body_size, 1_048_576);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "hostname": "0.0.0.0",
                "port": 8080,
                "max_body_size": -1,
                "static_files": [{{"prefix": "/assets", "directory": "./public"}}]
            }}"#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.socket_addr(), "0.0.0.0:8080");
        assert_eq!(config.app_config().body_limit(), None);
        assert_eq!(config.static_files[0].prefix, "/assets");
        assert_eq!(config.static_files[0].options, StaticFileOptions::default());
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            ServerConfig::from_file("/definitely/not/here.json"),
            Err(ConfigError::Read(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(ServerConfig::default().validate().is_ok());

        let config = ServerConfig {
            hostname: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = ServerConfig {
            static_files: vec![StaticFileConfig {
                prefix: "assets".to_string(),
                directory: "./public".to_string(),
                options: StaticFileOptions::default(),
            }],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_config_registers_routes() {
        let config = ServerConfig {
            static_files: vec![StaticFileConfig {
                prefix: "/assets".to_string(),
                directory: "./public".to_string(),
                options: StaticFileOptions::default(),
            }],
            ..Default::default()
        };
        let app = App::from_config(&config).unwrap();
        assert_eq!(
            app.router().routes(),
            vec![
                (Method::GET, "/assets".to_string()),
                (Method::GET, "/health".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_config_rejects_duplicate_paths() {
        let config = ServerConfig {
            health_check_path: "/assets".to_string(),
            static_files: vec![StaticFileConfig {
                prefix: "/assets".to_string(),
                directory: "./public".to_string(),
                options: StaticFileOptions::default(),
            }],
            ..Default::default()
        };
        assert!(matches!(
            App::from_config(&config),
            Err(ConfigError::Route(_))
        ));
    }
}
