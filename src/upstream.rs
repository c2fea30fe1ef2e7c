//! Upstream storage client
//!
//! Forwards transcoded files to an external storage service. The protocol
//! is two-step: a POST to the init endpoint announces the file, the
//! response names an upload URL, and a PUT to that URL carries the bytes.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::error::ApiError;

/// Init response from the storage service. The schema is a single
/// `upload_url` key; any other shape means the service is not speaking
/// our protocol and the forward fails.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitUploadResponse {
    pub upload_url: String,
}

/// Client for the upstream storage service
pub struct UpstreamClient {
    http: reqwest::Client,
    init_url: Option<String>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            init_url: config.init_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Ship one file upstream, returning the URL it was stored at.
    pub async fn forward(
        &self,
        file_name: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<String, ApiError> {
        let init_url = self
            .init_url
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("forwarding is not configured".to_string()))?;

        let init_response = self
            .http
            .post(init_url)
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "file_name": file_name,
                "content_type": content_type,
                "size_bytes": body.len(),
            }))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("init request failed: {e}")))?;

        if !init_response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "init request returned {}",
                init_response.status()
            )));
        }

        let init: InitUploadResponse = init_response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("unusable init response: {e}")))?;

        let put_response = self
            .http
            .put(&init.upload_url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("upload failed: {e}")))?;

        if !put_response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "upload returned {}",
                put_response.status()
            )));
        }

        tracing::info!(file_name, upload_url = %init.upload_url, "Forwarded file upstream");
        Ok(init.upload_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_response_requires_upload_url() {
        let ok: Result<InitUploadResponse, _> =
            serde_json::from_str(r#"{"upload_url": "http://storage.local/put/1"}"#);
        assert_eq!(ok.unwrap().upload_url, "http://storage.local/put/1");

        let wrong_key: Result<InitUploadResponse, _> =
            serde_json::from_str(r#"{"url": "http://storage.local/put/1"}"#);
        assert!(wrong_key.is_err());

        let extra_key: Result<InitUploadResponse, _> = serde_json::from_str(
            r#"{"upload_url": "http://storage.local/put/1", "expires": 30}"#,
        );
        assert!(extra_key.is_err());

        let empty: Result<InitUploadResponse, _> = serde_json::from_str("{}");
        assert!(empty.is_err());
    }

    #[tokio::test]
    async fn test_forward_unconfigured_fails() {
        let client = UpstreamClient::new(&UpstreamConfig::default());
        let result = client
            .forward("tone.mp3", "audio/mpeg", Bytes::from_static(b"abc"))
            .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
