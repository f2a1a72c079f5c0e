//! Resource registry

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::cache::{cache_key, CacheStats, ResourceCache};
use super::ResourceProvider;
use crate::error::{McpError, Result};
use crate::invariants;
use crate::protocol::{Resource, ResourceContent};
use crate::schema;

struct RegisteredResource {
    definition: Resource,
    provider: Arc<dyn ResourceProvider>,
}

/// Readable resources backed by providers, with a shared TTL cache
pub struct ResourceRegistry {
    resources: BTreeMap<String, RegisteredResource>,
    cache: Mutex<ResourceCache>,
}

impl ResourceRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            resources: BTreeMap::new(),
            cache: Mutex::new(ResourceCache::new(ttl)),
        }
    }

    /// Register a resource. Duplicate URIs are rejected.
    pub fn register(
        &mut self,
        definition: Resource,
        provider: Arc<dyn ResourceProvider>,
    ) -> Result<()> {
        if self.resources.contains_key(&definition.uri) {
            return Err(McpError::DuplicateResource(definition.uri));
        }
        invariants::validate_resource_uri(&definition.uri)?;
        definition.input_schema.check()?;

        debug!("Registered resource {}", definition.uri);
        self.resources.insert(
            definition.uri.clone(),
            RegisteredResource {
                definition,
                provider,
            },
        );
        Ok(())
    }

    pub fn list(&self) -> Vec<Resource> {
        self.resources
            .values()
            .map(|r| r.definition.clone())
            .collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn get(&self, uri: &str) -> Option<&Resource> {
        self.resources.get(uri).map(|r| &r.definition)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Validate input, then serve from cache or run the provider.
    ///
    /// Provider failures are not cached.
    pub async fn read(&self, uri: &str, input: serde_json::Value) -> Result<ResourceContent> {
        let resource = self
            .resources
            .get(uri)
            .ok_or_else(|| McpError::ResourceNotFound(uri.to_string()))?;

        let report = schema::validate(&resource.definition.input_schema, &input);
        if !report.valid {
            warn!("Rejected input for {}: {}", uri, report.errors.join("; "));
            return Err(McpError::Validation(report.errors));
        }

        let key = cache_key(uri, &input);
        let cached = self.cache.lock().await.lookup(uri, &key);

        let text = match cached {
            Some(text) => {
                debug!("Cache hit for {}", uri);
                text
            }
            None => {
                debug!("Cache miss for {}", uri);
                let text = resource
                    .provider
                    .read(input)
                    .await
                    .map_err(|e| McpError::Execution(format!("{:#}", e)))?;
                self.cache.lock().await.store(uri, key, text.clone());
                text
            }
        };

        Ok(ResourceContent {
            uri: uri.to_string(),
            mime_type: resource.definition.mime_type.clone(),
            text,
        })
    }

    /// Drop cached payloads for one resource
    pub async fn invalidate(&self, uri: &str) -> usize {
        self.cache.lock().await.invalidate(uri)
    }

    /// Drop every cached payload
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }
}
