use std::path::PathBuf;

use crate::engine::EngineConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Everything the server needs to start.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Explicit model artifact; when unset the default locations are searched.
    pub model_path: Option<PathBuf>,
    pub engine: EngineConfig,
    pub max_upload_bytes: usize,
    pub log_dir: PathBuf,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model_path: None,
            engine: EngineConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:8000");
        assert!(config.model_path.is_none());
        assert!(config.engine.workers >= 1);
        assert_eq!(config.engine.queue_depth, 32);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }
}
