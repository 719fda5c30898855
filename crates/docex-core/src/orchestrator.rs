//! Request pipeline: cache lookup, preprocessing, provider cascade,
//! validation, face cropping and cache write-back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::cache::ContentCache;
use crate::error::{DocexError, ProviderError, Result};
use crate::face::FaceRegionExtractor;
use crate::models::config::{DocexConfig, Strategy};
use crate::models::document::sniff_mime;
use crate::models::{ContentHash, DocumentType, Fields, FinalResult, PreparedImage, ProviderResult};
use crate::parser::TextParser;
use crate::preprocess::ImagePreprocessor;
use crate::providers::{self, ExtractionProvider};
use crate::schema::{schema_for, DocumentSchema, ResultValidator};

/// Read-only counters derived from the orchestrator and its cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionMetrics {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub average_processing_ms: f64,
    pub cache_entries: usize,
    pub cache_bytes: u64,
}

/// Builder for [`ExtractionOrchestrator`].
pub struct ExtractionOrchestratorBuilder {
    providers: Vec<Arc<dyn ExtractionProvider>>,
    preprocessor: ImagePreprocessor,
    face: Option<FaceRegionExtractor>,
    cache: Option<Arc<ContentCache>>,
    strategy: Strategy,
    request_timeout: Duration,
    face_timeout: Duration,
    max_image_bytes: usize,
}

impl ExtractionOrchestratorBuilder {
    pub fn new() -> Self {
        let config = DocexConfig::default();
        Self {
            providers: Vec::new(),
            preprocessor: ImagePreprocessor::new(),
            face: None,
            cache: None,
            strategy: config.orchestration.strategy,
            request_timeout: config.orchestration.request_timeout(),
            face_timeout: config.orchestration.face_timeout(),
            max_image_bytes: config.limits.max_image_bytes,
        }
    }

    /// Add a provider. Order of calls does not matter; providers run by tier.
    pub fn with_provider(mut self, provider: Arc<dyn ExtractionProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_providers(mut self, providers: Vec<Arc<dyn ExtractionProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Enable portrait cropping for document types that carry a photo.
    pub fn with_face_extractor(mut self, face: FaceRegionExtractor) -> Self {
        self.face = Some(face);
        self
    }

    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Overall budget for one request. Exceeding it yields a degraded result.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_face_timeout(mut self, timeout: Duration) -> Self {
        self.face_timeout = timeout;
        self
    }

    pub fn with_max_image_bytes(mut self, limit: usize) -> Self {
        self.max_image_bytes = limit;
        self
    }

    pub fn build(mut self) -> ExtractionOrchestrator {
        // Stable sort keeps insertion order within a tier.
        self.providers.sort_by_key(|p| std::cmp::Reverse(p.kind().tier()));

        ExtractionOrchestrator {
            providers: self.providers,
            preprocessor: self.preprocessor,
            parser: TextParser::new(),
            validator: ResultValidator::new(),
            face: self.face,
            cache: self.cache,
            strategy: self.strategy,
            request_timeout: self.request_timeout,
            face_timeout: self.face_timeout,
            max_image_bytes: self.max_image_bytes,
            total_requests: AtomicU64::new(0),
            total_processing_ms: AtomicU64::new(0),
        }
    }
}

impl Default for ExtractionOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs documents through the provider cascade.
///
/// `process_document` never fails: every error ends up either recovered by
/// the next provider or folded into a degraded [`FinalResult`].
pub struct ExtractionOrchestrator {
    providers: Vec<Arc<dyn ExtractionProvider>>,
    preprocessor: ImagePreprocessor,
    parser: TextParser,
    validator: ResultValidator,
    face: Option<FaceRegionExtractor>,
    cache: Option<Arc<ContentCache>>,
    strategy: Strategy,
    request_timeout: Duration,
    face_timeout: Duration,
    max_image_bytes: usize,
    total_requests: AtomicU64,
    total_processing_ms: AtomicU64,
}

type Accepted = (ProviderResult, Fields);

impl ExtractionOrchestrator {
    pub fn builder() -> ExtractionOrchestratorBuilder {
        ExtractionOrchestratorBuilder::new()
    }

    /// Wire up providers, preprocessing, face cropping and cache from configuration.
    pub fn from_config(config: &DocexConfig) -> Result<Self> {
        config.validate().map_err(DocexError::Config)?;
        let mut builder = Self::builder()
            .with_providers(providers::from_config(&config.providers)?)
            .with_preprocessor(ImagePreprocessor::from_config(&config.preprocessing))
            .with_strategy(config.orchestration.strategy)
            .with_request_timeout(config.orchestration.request_timeout())
            .with_face_timeout(config.orchestration.face_timeout())
            .with_max_image_bytes(config.limits.max_image_bytes);

        if config.face.enabled {
            builder = builder.with_face_extractor(FaceRegionExtractor::load(&config.face));
        }
        if config.cache.enabled {
            builder = builder.with_cache(ContentCache::open(&config.cache.dir)?);
        }
        Ok(builder.build())
    }

    /// Providers in cascade order.
    pub fn providers(&self) -> &[Arc<dyn ExtractionProvider>] {
        &self.providers
    }

    pub fn cache(&self) -> Option<&ContentCache> {
        self.cache.as_deref()
    }

    /// Extract fields from an image. Unknown `document_type` tags use the generic schema.
    pub async fn process_document(&self, image: &[u8], document_type: &str) -> FinalResult {
        self.process(image, sniff_mime(image), document_type).await
    }

    /// Decode a base64 image (optionally a `data:` URL) and process it.
    pub async fn process_from_base64(
        &self,
        base64_image: &str,
        mime_type: &str,
        document_type: &str,
    ) -> FinalResult {
        match decode_base64_image(base64_image) {
            Ok(bytes) => {
                let mime = if mime_type.starts_with("image/") {
                    mime_type
                } else {
                    sniff_mime(&bytes)
                };
                self.process(&bytes, mime, document_type).await
            }
            Err(e) => {
                warn!("Rejecting base64 input: {}", e);
                self.total_requests.fetch_add(1, Ordering::Relaxed);
                FinalResult::degraded(DocumentType::parse(document_type), e.to_string())
            }
        }
    }

    async fn process(&self, image: &[u8], mime_type: &str, document_type: &str) -> FinalResult {
        let started = Instant::now();
        let document_type = DocumentType::parse(document_type);
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.run(image, mime_type, document_type),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let err = ProviderError::Timeout(self.request_timeout);
                warn!(document_type = %document_type, "Request abandoned: {}", err);
                FinalResult::degraded(document_type, format!("request {}", err))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.total_processing_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        debug!(elapsed_ms, "Request finished");
        result
    }

    async fn run(&self, image: &[u8], mime_type: &str, document_type: DocumentType) -> FinalResult {
        if image.is_empty() {
            return FinalResult::degraded(document_type, DocexError::Decode("empty image".to_string()).to_string());
        }
        if image.len() > self.max_image_bytes {
            warn!("Image of {} bytes exceeds limit of {}", image.len(), self.max_image_bytes);
            return FinalResult::degraded(
                document_type,
                format!("image is {} bytes, limit is {}", image.len(), self.max_image_bytes),
            );
        }

        let hash = ContentHash::of(image);
        if let Some(hit) = self.cached(&hash).await {
            info!(hash = hash.short(), "Cache hit");
            return hit;
        }

        let schema = schema_for(document_type);
        let prepared = match self.prepare(image.to_vec(), mime_type).await {
            Ok(prepared) => prepared,
            Err(e) => return FinalResult::degraded(document_type, e.to_string()),
        };

        let face_task = self.spawn_face(&prepared, document_type);

        let outcome = match self.strategy {
            Strategy::Sequential => self.run_sequential(&prepared, schema).await,
            Strategy::Parallel => self.run_parallel(&prepared, schema).await,
        };

        match outcome {
            Ok((result, mut fields)) => {
                self.parser.derive_fields(&mut fields, Utc::now().date_naive());
                let photo = match face_task {
                    Some(task) => self.await_face(task).await,
                    None => None,
                };

                let final_result = FinalResult::accepted(result, fields, document_type, photo, Utc::now());
                info!(
                    method = ?final_result.method,
                    confidence = final_result.confidence,
                    hash = hash.short(),
                    "Accepted {} result",
                    document_type
                );

                self.store(&hash, &final_result).await;
                final_result
            }
            Err(e) => {
                if let Some(task) = face_task {
                    task.abort();
                }
                warn!(hash = hash.short(), "{}", e);
                FinalResult::degraded(document_type, e.to_string())
            }
        }
    }

    /// Cache lookup on the blocking pool. Task failures count as a miss.
    async fn cached(&self, hash: &ContentHash) -> Option<FinalResult> {
        let cache = Arc::clone(self.cache.as_ref()?);
        let hash = hash.clone();
        match tokio::task::spawn_blocking(move || cache.get(&hash)).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache lookup task failed: {}", e);
                None
            }
        }
    }

    async fn store(&self, hash: &ContentHash, result: &FinalResult) {
        let Some(cache) = self.cache.as_ref().map(Arc::clone) else {
            return;
        };
        let hash = hash.clone();
        let result = result.clone();
        match tokio::task::spawn_blocking(move || cache.put(&hash, &result)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to cache result: {}", e),
            Err(e) => warn!("Cache write task failed: {}", e),
        }
    }

    async fn prepare(&self, bytes: Vec<u8>, mime_type: &str) -> Result<PreparedImage> {
        let preprocessor = self.preprocessor.clone();
        let mime_type = mime_type.to_string();
        tokio::task::spawn_blocking(move || preprocessor.prepare(bytes, &mime_type))
            .await
            .map_err(|e| DocexError::Decode(format!("preprocessing task failed: {}", e)))
    }

    fn spawn_face(
        &self,
        prepared: &PreparedImage,
        document_type: DocumentType,
    ) -> Option<JoinHandle<Option<String>>> {
        if !document_type.has_photo() {
            return None;
        }
        let face = self.face.clone()?;
        let original = Arc::clone(&prepared.original);
        Some(tokio::task::spawn_blocking(move || face.extract(&original)))
    }

    async fn await_face(&self, task: JoinHandle<Option<String>>) -> Option<String> {
        match tokio::time::timeout(self.face_timeout, task).await {
            Ok(Ok(photo)) => photo,
            Ok(Err(e)) => {
                warn!("Face task failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Face extraction exceeded {:?}", self.face_timeout);
                None
            }
        }
    }

    fn configured(&self) -> impl Iterator<Item = &Arc<dyn ExtractionProvider>> {
        self.providers.iter().filter(|p| {
            let configured = p.is_configured();
            if !configured {
                debug!("Skipping unconfigured provider {}", p.name());
            }
            configured
        })
    }

    /// Parse or normalize a provider result and check it against the schema.
    fn validate(&self, result: &ProviderResult, schema: &DocumentSchema) -> Option<Fields> {
        let fields = match &result.raw_text {
            Some(raw) => self.parser.parse(raw, schema),
            None => self.parser.normalize_fields(&result.fields, schema),
        };
        self.validator.is_valid(&fields, schema).then_some(fields)
    }

    /// Try providers in tier order and stop at the first valid result.
    async fn run_sequential(
        &self,
        prepared: &PreparedImage,
        schema: &'static DocumentSchema,
    ) -> Result<Accepted> {
        let mut attempts = Vec::new();

        for provider in self.configured() {
            let outcome = call_provider(provider.as_ref(), prepared, schema).await;
            match self.judge(provider.as_ref(), outcome, schema) {
                Ok(accepted) => return Ok(accepted),
                Err(attempt) => attempts.push(attempt),
            }
        }

        Err(exhausted(attempts))
    }

    /// Start every provider at once. When the first valid result arrives,
    /// results that already completed are collected too, the highest tier
    /// wins and the remaining calls are cancelled.
    async fn run_parallel(
        &self,
        prepared: &PreparedImage,
        schema: &'static DocumentSchema,
    ) -> Result<Accepted> {
        let mut tasks = JoinSet::new();
        for provider in self.configured() {
            let provider = Arc::clone(provider);
            let image = prepared.clone();
            tasks.spawn(async move {
                let outcome = call_provider(provider.as_ref(), &image, schema).await;
                (provider, outcome)
            });
        }

        let mut attempts = Vec::new();
        let mut accepted: Vec<Accepted> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            self.collect(joined, schema, &mut accepted, &mut attempts);
            if accepted.is_empty() {
                continue;
            }
            while let Some(joined) = tasks.try_join_next() {
                self.collect(joined, schema, &mut accepted, &mut attempts);
            }
            if !tasks.is_empty() {
                debug!("Cancelling {} slower providers", tasks.len());
                tasks.abort_all();
            }
            break;
        }

        accepted
            .into_iter()
            .max_by_key(|(result, _)| result.confidence)
            .ok_or_else(|| exhausted(attempts))
    }

    fn collect(
        &self,
        joined: std::result::Result<
            (Arc<dyn ExtractionProvider>, std::result::Result<ProviderResult, ProviderError>),
            JoinError,
        >,
        schema: &DocumentSchema,
        accepted: &mut Vec<Accepted>,
        attempts: &mut Vec<String>,
    ) {
        match joined {
            Ok((provider, outcome)) => match self.judge(provider.as_ref(), outcome, schema) {
                Ok(result) => accepted.push(result),
                Err(attempt) => attempts.push(attempt),
            },
            Err(e) => {
                warn!("Provider task failed: {}", e);
                attempts.push(format!("task: {}", e));
            }
        }
    }

    /// Accept a provider outcome or describe why it was rejected.
    fn judge(
        &self,
        provider: &dyn ExtractionProvider,
        outcome: std::result::Result<ProviderResult, ProviderError>,
        schema: &DocumentSchema,
    ) -> std::result::Result<Accepted, String> {
        let id = provider.kind().id();
        let error = match outcome {
            Ok(result) => match self.validate(&result, schema) {
                Some(fields) => {
                    debug!(provider = id, "Result passed validation with {} fields", fields.len());
                    return Ok((result, fields));
                }
                None => DocexError::ValidationFailure {
                    provider: provider.name().to_string(),
                    document_type: schema.document_type.to_string(),
                },
            },
            Err(e) => DocexError::Provider(e),
        };

        warn!(provider = id, "{}", error);
        Err(format!("{}: {}", id, error))
    }

    pub fn metrics(&self) -> ExtractionMetrics {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_ms = self.total_processing_ms.load(Ordering::Relaxed);
        let average_processing_ms = if total_requests == 0 {
            0.0
        } else {
            total_ms as f64 / total_requests as f64
        };

        let stats = self.cache.as_ref().map(|c| c.stats());
        ExtractionMetrics {
            total_requests,
            cache_hits: stats.map_or(0, |s| s.hits),
            cache_misses: stats.map_or(0, |s| s.misses),
            cache_hit_rate: stats.map_or(0.0, |s| s.hit_rate()),
            average_processing_ms,
            cache_entries: stats.map_or(0, |s| s.entries),
            cache_bytes: stats.map_or(0, |s| s.bytes),
        }
    }

    /// Remove every cache entry. Returns the number removed (0 without a cache).
    pub fn clear_cache(&self) -> Result<usize> {
        match &self.cache {
            Some(cache) => Ok(cache.clear()?),
            None => Ok(0),
        }
    }
}

async fn call_provider(
    provider: &dyn ExtractionProvider,
    image: &PreparedImage,
    schema: &DocumentSchema,
) -> std::result::Result<ProviderResult, ProviderError> {
    let timeout = provider.timeout();
    debug!(provider = provider.kind().id(), "Calling {}", provider.name());
    match tokio::time::timeout(timeout, provider.extract(image, schema)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ProviderError::Timeout(timeout)),
    }
}

fn exhausted(mut attempts: Vec<String>) -> DocexError {
    if attempts.is_empty() {
        attempts.push("no provider is configured".to_string());
    }
    DocexError::AllProvidersExhausted { attempts }
}

/// Accept plain base64 or a `data:<mime>;base64,` URL.
fn decode_base64_image(input: &str) -> Result<Vec<u8>> {
    let payload = match input.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| DocexError::Decode("data URL has no payload".to_string()))?,
        None => input.trim(),
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DocexError::Decode(format!("invalid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(DocexError::Decode("empty image".to_string()));
    }
    Ok(bytes)
}
