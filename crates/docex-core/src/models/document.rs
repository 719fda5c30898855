//! Request, result and cache data types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Extracted fields keyed by snake_case field name.
///
/// A `BTreeMap` keeps serialization order stable, so identical extractions
/// produce byte-identical cache files.
pub type Fields = BTreeMap<String, String>;

/// Supported document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Japanese residence card (在留カード).
    ZairyuCard,
    /// Japanese driver's license (運転免許証).
    License,
    /// Japanese resume (履歴書).
    Rirekisho,
    /// Anything else: raw text only.
    Generic,
}

impl DocumentType {
    /// Parse a document-type tag. Unknown tags fall back to [`DocumentType::Generic`].
    pub fn parse(tag: &str) -> Self {
        let normalized = tag.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "zairyu_card" | "zairyu" | "residence_card" => DocumentType::ZairyuCard,
            "license" | "licence" | "drivers_license" | "driver_license" => DocumentType::License,
            "rirekisho" | "resume" => DocumentType::Rirekisho,
            _ => DocumentType::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::ZairyuCard => "zairyu_card",
            DocumentType::License => "license",
            DocumentType::Rirekisho => "rirekisho",
            DocumentType::Generic => "generic",
        }
    }

    /// Whether the document layout carries a face photo worth cropping.
    pub fn has_photo(&self) -> bool {
        matches!(self, DocumentType::ZairyuCard | DocumentType::License)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three provider slots, in fixed confidence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Remote multimodal model returning structured fields.
    Primary,
    /// Remote text-detection service returning raw text.
    Secondary,
    /// Local OCR engine.
    Offline,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Primary,
        ProviderKind::Secondary,
        ProviderKind::Offline,
    ];

    /// Confidence tier attached to every result this provider produces.
    pub fn tier(&self) -> u8 {
        match self {
            ProviderKind::Primary => 100,
            ProviderKind::Secondary => 80,
            ProviderKind::Offline => 60,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::Primary => "primary",
            ProviderKind::Secondary => "secondary",
            ProviderKind::Offline => "offline",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How a final result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Primary,
    Secondary,
    Offline,
    /// Degraded result: no provider produced valid fields.
    Fallback,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Primary => "primary",
            Method::Secondary => "secondary",
            Method::Offline => "offline",
            Method::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ProviderKind> for Method {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Primary => Method::Primary,
            ProviderKind::Secondary => Method::Secondary,
            ProviderKind::Offline => Method::Offline,
        }
    }
}

/// Output of a single provider call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: ProviderKind,
    pub confidence: u8,
    #[serde(default)]
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl ProviderResult {
    /// Result carrying structured fields.
    pub fn structured(provider: ProviderKind, fields: Fields) -> Self {
        Self {
            provider,
            confidence: provider.tier(),
            fields,
            raw_text: None,
            photo: None,
        }
    }

    /// Result carrying raw OCR text only.
    pub fn text(provider: ProviderKind, raw_text: impl Into<String>) -> Self {
        Self {
            provider,
            confidence: provider.tier(),
            fields: Fields::new(),
            raw_text: Some(raw_text.into()),
            photo: None,
        }
    }
}

/// What the caller receives from `process_document`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub fields: Fields,
    pub method: Method,
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub document_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FinalResult {
    /// Successful result built from an accepted provider result.
    pub fn accepted(
        result: ProviderResult,
        fields: Fields,
        document_type: DocumentType,
        photo: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fields,
            method: result.provider.into(),
            confidence: result.confidence,
            photo: photo.or(result.photo),
            processed_at,
            document_type,
            error: None,
        }
    }

    /// Degraded result: empty fields, zero confidence, explicit error.
    pub fn degraded(document_type: DocumentType, error: impl Into<String>) -> Self {
        Self {
            fields: Fields::new(),
            method: Method::Fallback,
            confidence: 0,
            photo: None,
            processed_at: Utc::now(),
            document_type,
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// SHA-256 digest of the raw image bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Accept an existing hex digest (e.g. a cache file stem).
    pub fn from_hex(hex_digest: &str) -> Option<Self> {
        let valid = hex_digest.len() == 64 && hex_digest.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Self(hex_digest.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: ContentHash,
    pub result: FinalResult,
    pub written_at: DateTime<Utc>,
}

/// Image bundle handed to every provider for one request.
///
/// Remote providers send `original`; the offline engine runs over the
/// enhanced and binarized renditions.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub original: Arc<Vec<u8>>,
    pub mime_type: String,
    pub enhanced: Arc<Vec<u8>>,
    pub binarized: Arc<Vec<u8>>,
}

impl PreparedImage {
    /// Bundle where every rendition is the original bytes.
    pub fn unprocessed(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let original = Arc::new(bytes);
        Self {
            enhanced: Arc::clone(&original),
            binarized: Arc::clone(&original),
            original,
            mime_type: mime_type.into(),
        }
    }
}

/// Best-effort MIME sniffing from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        Ok(image::ImageFormat::Tiff) => "image/tiff",
        _ => "image/jpeg",
    }
}
