//! Tool handler seam

use async_trait::async_trait;
use std::future::Future;

/// Domain logic behind a tool.
///
/// Handlers receive input that already passed the tool's input schema.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// Adapts an async closure into a [`ToolHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    async fn call(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        (self.0)(input).await
    }
}
