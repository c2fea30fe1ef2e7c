//! Gateway configuration

use serde::{Deserialize, Serialize};

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_enabled: true,
        }
    }
}

/// Upload staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory uploads and transcode results are written to
    pub dir: String,

    /// File extensions accepted for upload, lowercase with leading dot
    pub allowed_extensions: Vec<String>,

    /// Maximum upload size in megabytes
    pub max_upload_mb: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: "uploads".to_string(),
            allowed_extensions: vec![".mp4".to_string()],
            max_upload_mb: 512,
        }
    }
}

impl StagingConfig {
    /// Get the maximum upload size in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

/// Transcode output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Output container format
    pub container_format: String,

    /// Output codec name
    pub codec: String,

    /// Output bit rate in bps
    pub bit_rate: usize,

    /// Wall-clock budget for one transcode in seconds
    pub deadline_secs: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            container_format: "mp3".to_string(),
            codec: "mp3".to_string(),
            bit_rate: 192_000,
            deadline_secs: 300,
        }
    }
}

/// Upstream storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upload-init endpoint; forwarding is disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            init_url: None,
            timeout_secs: 30,
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration
    pub server: ServerConfig,

    /// Staging configuration
    pub staging: StagingConfig,

    /// Transcode configuration
    pub transcode: TranscodeConfig,

    /// Upstream configuration
    pub upstream: UpstreamConfig,
}

impl GatewayConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.staging.dir, "uploads");
        assert_eq!(config.staging.allowed_extensions, vec![".mp4".to_string()]);
        assert_eq!(config.transcode.bit_rate, 192_000);
        assert!(config.upstream.init_url.is_none());
    }

    #[test]
    fn test_staging_max_upload_bytes() {
        let staging = StagingConfig {
            max_upload_mb: 256,
            ..Default::default()
        };
        assert_eq!(staging.max_upload_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn test_socket_addr() {
        let mut config = GatewayConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 9000;
        assert_eq!(config.socket_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [server]
            port = 9090

            [upstream]
            init_url = "http://storage.local/files/init"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.staging.max_upload_mb, 512);
        assert_eq!(
            config.upstream.init_url.as_deref(),
            Some("http://storage.local/files/init")
        );
        assert_eq!(config.upstream.timeout_secs, 30);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let mut config = GatewayConfig::default();
        config.server.port = 8123;
        config.transcode.deadline_secs = 60;
        config.to_file(path).unwrap();

        let loaded = GatewayConfig::from_file(path).unwrap();
        assert_eq!(loaded.server.port, 8123);
        assert_eq!(loaded.transcode.deadline_secs, 60);
    }
}
