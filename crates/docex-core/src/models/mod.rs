//! Data models and configuration.

pub mod config;
pub mod document;

pub use config::DocexConfig;
pub use document::{
    CacheEntry, ContentHash, DocumentType, Fields, FinalResult, Method, PreparedImage,
    ProviderKind, ProviderResult,
};
