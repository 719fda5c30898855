//! Structured extraction through the Gemini `generateContent` API.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{check_status, http_client, upload_payload, ExtractionProvider};
use crate::error::{ProviderError, Result};
use crate::models::config::GeminiConfig;
use crate::models::{Fields, PreparedImage, ProviderKind, ProviderResult};
use crate::schema::DocumentSchema;

/// Primary provider. Sends the image together with a field list and asks
/// for a JSON object back.
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout: Duration,
    max_upload_bytes: usize,
}

impl GeminiProvider {
    pub fn from_config(config: &GeminiConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            temperature: config.temperature,
            timeout,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    /// Request body for one image.
    pub fn build_request(&self, image_base64: &str, mime_type: &str, schema: &DocumentSchema) -> Value {
        let mut properties = Map::new();
        for spec in schema.all_fields() {
            properties.insert(
                spec.name.to_string(),
                json!({ "type": "STRING", "description": spec.hint }),
            );
        }

        json!({
            "contents": [{
                "parts": [
                    { "text": build_prompt(schema) },
                    { "inlineData": { "mimeType": mime_type, "data": image_base64 } }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": { "type": "OBJECT", "properties": Value::Object(properties) },
                "temperature": self.temperature
            }
        })
    }
}

fn build_prompt(schema: &DocumentSchema) -> String {
    if schema.is_generic() {
        return "Transcribe all text visible in this document image, preserving line breaks. \
                Answer with a JSON object containing a single key \"raw_text\"."
            .to_string();
    }

    let mut prompt = format!(
        "This image is a Japanese {} document. Extract the following fields and answer \
         with a single JSON object. Use an empty string for anything not visible. \
         Do not guess.\n",
        schema.document_type
    );
    for spec in schema.all_fields() {
        prompt.push_str(&format!("- {}: {}\n", spec.name, spec.hint));
    }
    prompt
}

/// Pull the field object out of a `generateContent` response.
pub fn parse_response(body: &Value) -> std::result::Result<Fields, ProviderError> {
    if let Some(reason) = body.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
        return Err(ProviderError::Malformed(format!("request blocked: {}", reason)));
    }

    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Malformed("response has no candidate text".to_string()))?;

    let json_text = strip_code_fence(text);
    let parsed: Value = serde_json::from_str(json_text)
        .map_err(|e| ProviderError::Malformed(format!("candidate text is not JSON: {}", e)))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| ProviderError::Malformed("candidate JSON is not an object".to_string()))?;

    let mut fields = Fields::new();
    for (key, value) in object {
        let value = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if !value.is_empty() {
            fields.insert(key.clone(), value);
        }
    }

    if fields.is_empty() {
        return Err(ProviderError::Malformed("empty JSON object".to_string()));
    }
    Ok(fields)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

#[async_trait]
impl ExtractionProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Primary
    }

    fn name(&self) -> &str {
        "gemini"
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
        schema: &DocumentSchema,
    ) -> std::result::Result<ProviderResult, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured)?;

        let (bytes, mime_type) = upload_payload(image, self.max_upload_bytes).await?;
        let body = self.build_request(&STANDARD.encode(&bytes), &mime_type, schema);

        debug!("Sending {} bytes to {} ({})", bytes.len(), self.model, schema.document_type);
        let response = self
            .client
            .post(self.url())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;
        let payload: Value = check_status(response).await?.json().await?;

        let fields = parse_response(&payload)?;
        debug!("Gemini returned {} fields", fields.len());
        Ok(ProviderResult::structured(ProviderKind::Primary, fields))
    }
}
