//! Raw text detection through the Cloud Vision `images:annotate` API.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{check_status, http_client, upload_payload, ExtractionProvider};
use crate::error::{ProviderError, Result};
use crate::models::config::VisionConfig;
use crate::models::{PreparedImage, ProviderKind, ProviderResult};
use crate::schema::DocumentSchema;

/// Secondary provider. Returns document text only; fields come from the parser.
pub struct VisionProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    language_hints: Vec<String>,
    timeout: Duration,
    max_upload_bytes: usize,
}

impl VisionProvider {
    pub fn from_config(config: &VisionConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
            language_hints: config.language_hints.clone(),
            timeout,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    pub fn build_request(&self, image_base64: &str) -> Value {
        json!({
            "requests": [{
                "image": { "content": image_base64 },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
                "imageContext": { "languageHints": self.language_hints }
            }]
        })
    }
}

/// Full text of the first annotation response.
pub fn parse_response(body: &Value) -> std::result::Result<String, ProviderError> {
    let first = body
        .pointer("/responses/0")
        .ok_or_else(|| ProviderError::Malformed("response has no annotations".to_string()))?;

    if let Some(error) = first.get("error") {
        let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(ProviderError::Malformed(format!("annotation failed: {}", message)));
    }

    let text = first
        .pointer("/fullTextAnnotation/text")
        .or_else(|| first.pointer("/textAnnotations/0/description"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ProviderError::Malformed("no text detected".to_string()));
    }
    Ok(text.to_string())
}

#[async_trait]
impl ExtractionProvider for VisionProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Secondary
    }

    fn name(&self) -> &str {
        "vision"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn extract(
        &self,
        image: &PreparedImage,
        _schema: &DocumentSchema,
    ) -> std::result::Result<ProviderResult, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured)?;

        let (bytes, _) = upload_payload(image, self.max_upload_bytes).await?;
        let body = self.build_request(&STANDARD.encode(&bytes));

        let response = self
            .client
            .post(format!("{}/images:annotate", self.endpoint))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;
        let payload: Value = check_status(response).await?.json().await?;

        let text = parse_response(&payload)?;
        debug!("Vision returned {} characters", text.chars().count());
        Ok(ProviderResult::text(ProviderKind::Secondary, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_shape() {
        let provider = VisionProvider::from_config(&VisionConfig::default()).unwrap();
        let body = provider.build_request("QUJD");

        assert_eq!(body.pointer("/requests/0/image/content"), Some(&json!("QUJD")));
        assert_eq!(
            body.pointer("/requests/0/features/0/type"),
            Some(&json!("DOCUMENT_TEXT_DETECTION"))
        );
        assert_eq!(
            body.pointer("/requests/0/imageContext/languageHints"),
            Some(&json!(["ja", "en"]))
        );
    }

    #[test]
    fn test_parse_full_text() {
        let body = json!({ "responses": [{ "fullTextAnnotation": { "text": "氏名 山田太郎\n" } }] });
        assert_eq!(parse_response(&body).unwrap(), "氏名 山田太郎");
    }

    #[test]
    fn test_parse_falls_back_to_text_annotations() {
        let body = json!({ "responses": [{ "textAnnotations": [{ "description": "NAME A" }] }] });
        assert_eq!(parse_response(&body).unwrap(), "NAME A");
    }

    #[test]
    fn test_parse_errors() {
        let failed = json!({ "responses": [{ "error": { "code": 3, "message": "Bad image data." } }] });
        let err = parse_response(&failed).unwrap_err();
        assert!(err.to_string().contains("Bad image data."));

        assert!(matches!(parse_response(&json!({ "responses": [{}] })), Err(ProviderError::Malformed(_))));
        assert!(matches!(parse_response(&json!({})), Err(ProviderError::Malformed(_))));
    }
}
