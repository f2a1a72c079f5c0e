//! Ghost MCP resources
//!
//! Resources provide readable context data to agents. Each read is validated
//! against the resource's input schema and served through a TTL cache.

mod builtin;
mod cache;
mod registry;

pub use builtin::register_builtin;
pub use cache::{cache_key, canonical_json, CacheStats, ResourceCache};
pub use registry::ResourceRegistry;

use async_trait::async_trait;
use std::future::Future;

/// Generates the payload of a resource for validated input
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn read(&self, input: serde_json::Value) -> anyhow::Result<String>;
}

/// Adapts an async closure into a [`ResourceProvider`]
pub struct FnProvider<F>(pub F);

#[async_trait]
impl<F, Fut> ResourceProvider for FnProvider<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send,
{
    async fn read(&self, input: serde_json::Value) -> anyhow::Result<String> {
        (self.0)(input).await
    }
}
