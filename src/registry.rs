//! Custom extractor registry and extraction entry points.
//!
//! The primary object is an explicitly constructed [`ExtractorRegistry`];
//! the module-level functions operate on a process-wide instance for callers
//! that want a single shared registration surface.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::LazyLock;

use crate::error::RegistryError;
use crate::extract::{builtin_extract, ClientType, ErrorExtractor, StandardizedError};

/// An extractor assembled from a name and two closures.
///
/// The registry form of the capability for callers that do not want to
/// implement [`ErrorExtractor`] on a type of their own.
pub struct CustomExtractor {
    name: String,
    can_handle: Box<dyn Fn(&Value) -> bool + Send + Sync>,
    extract: Box<dyn Fn(&Value) -> StandardizedError + Send + Sync>,
}

impl CustomExtractor {
    /// Creates an extractor from its parts.
    pub fn new<C, X>(name: impl Into<String>, can_handle: C, extract: X) -> Self
    where
        C: Fn(&Value) -> bool + Send + Sync + 'static,
        X: Fn(&Value) -> StandardizedError + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            can_handle: Box::new(can_handle),
            extract: Box::new(extract),
        }
    }
}

impl ErrorExtractor for CustomExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, error: &Value) -> bool {
        (self.can_handle)(error)
    }

    fn extract(&self, error: &Value) -> StandardizedError {
        (self.extract)(error)
    }
}

/// An ordered registry of custom extractors, consulted before the built-in
/// detection path.
#[derive(Default)]
pub struct ExtractorRegistry {
    entries: Vec<Arc<dyn ErrorExtractor>>,
}

impl ExtractorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers an extractor. Names must be unique within the registry.
    pub fn register(&mut self, extractor: Arc<dyn ErrorExtractor>) -> Result<(), RegistryError> {
        let name = extractor.name().to_string();
        if self.entries.iter().any(|e| e.name() == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.entries.push(extractor);
        Ok(())
    }

    /// Removes an extractor by name; returns whether one was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name() != name);
        self.entries.len() != before
    }

    /// Removes every registered extractor.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Names of the registered extractors, in consultation order.
    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    /// Extracts a standardized record, consulting custom extractors in
    /// registration order before the built-in path. The first extractor
    /// whose `can_handle` returns true wins, and the record is tagged with
    /// that extractor's name.
    pub fn extract(&self, error: &Value) -> StandardizedError {
        for entry in &self.entries {
            if entry.can_handle(error) {
                let mut record = entry.extract(error);
                record.client_type = ClientType::Custom(entry.name().to_string());
                return record;
            }
        }
        builtin_extract(error)
    }
}

static GLOBAL_REGISTRY: LazyLock<RwLock<ExtractorRegistry>> =
    LazyLock::new(|| RwLock::new(ExtractorRegistry::new()));

/// Extracts a standardized record using the process-wide registry.
pub fn extract_error(error: &Value) -> StandardizedError {
    GLOBAL_REGISTRY.read().extract(error)
}

/// Registers a custom extractor with the process-wide registry.
pub fn register_extractor(extractor: Arc<dyn ErrorExtractor>) -> Result<(), RegistryError> {
    GLOBAL_REGISTRY.write().register(extractor)
}

/// Removes a custom extractor from the process-wide registry.
pub fn unregister_extractor(name: &str) -> bool {
    GLOBAL_REGISTRY.write().unregister(name)
}

/// Clears the process-wide registry.
pub fn clear_extractors() {
    GLOBAL_REGISTRY.write().clear();
}

/// Lists the process-wide registry's extractor names in order.
pub fn list_extractors() -> Vec<String> {
    GLOBAL_REGISTRY.read().list()
}

/// Builds a predicate over a serializable error type: the error is
/// serialized, extracted through the process-wide registry, and the
/// standardized record is handed to `f`.
///
/// Errors that cannot be serialized evaluate to false.
pub fn create_error_predicate<E, F>(f: F) -> impl Fn(&E) -> bool + Send + Sync
where
    E: Serialize,
    F: Fn(&StandardizedError) -> bool + Send + Sync,
{
    move |error| match serde_json::to_value(error) {
        Ok(value) => f(&extract_error(&value)),
        Err(_) => false,
    }
}

/// The default retry verdict: extract, then read `is_retryable`.
pub fn default_retry_predicate<E: Serialize>(error: &E) -> bool {
    serde_json::to_value(error)
        .map(|value| extract_error(&value).is_retryable)
        .unwrap_or(false)
}
