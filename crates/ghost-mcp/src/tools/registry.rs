//! Tool registry and execution engine

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::execution::{ExecutionError, ExecutionRecord, ToolMetrics};
use super::handler::ToolHandler;
use crate::error::{McpError, Result};
use crate::invariants;
use crate::protocol::Tool;
use crate::schema;

struct RegisteredTool {
    definition: Tool,
    handler: Arc<dyn ToolHandler>,
    metrics: Mutex<ToolMetrics>,
}

/// Named tools with their handlers.
///
/// Tools are registered before the registry is shared and are never removed.
/// Metrics and execution history are updated through interior locks, so
/// `execute` only needs `&self`.
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    timeout: Duration,
    history: Mutex<VecDeque<ExecutionRecord>>,
    history_limit: usize,
}

impl ToolRegistry {
    pub fn new(timeout: Duration, history_limit: usize) -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout,
            history: Mutex::new(VecDeque::new()),
            history_limit,
        }
    }

    /// Register a tool.
    ///
    /// A second tool with the same name is rejected and the first one stays.
    pub fn register(&mut self, definition: Tool, handler: Arc<dyn ToolHandler>) -> Result<()> {
        if self.tools.contains_key(&definition.name) {
            return Err(McpError::DuplicateTool(definition.name));
        }

        invariants::validate_name(&definition.name)?;
        definition.input_schema.check()?;
        if let Some(output) = &definition.output_schema {
            output.check()?;
        }

        debug!("Registered tool {}", definition.name);
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler,
                metrics: Mutex::new(ToolMetrics::default()),
            },
        );
        Ok(())
    }

    /// Tool definitions, optionally restricted to one category
    pub fn list(&self, category: Option<&str>) -> Vec<Tool> {
        self.tools
            .values()
            .filter(|t| category.map_or(true, |c| t.definition.category == c))
            .map(|t| t.definition.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name).map(|t| &t.definition)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate input and run the tool.
    ///
    /// Only an unknown tool is an `Err`. Validation failures, handler errors,
    /// panics and timeouts all come back as a failed record.
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> Result<ExecutionRecord> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        let mut record = ExecutionRecord::new(name, input);

        let report = schema::validate(&tool.definition.input_schema, &record.input);
        if !report.valid {
            warn!("Rejected input for {}: {}", name, report.errors.join("; "));
            tool.metrics.lock().await.record_rejected();
            record.fail(
                ExecutionError::Validation {
                    errors: report.errors,
                },
                Duration::ZERO,
            );
            self.remember(&record).await;
            return Ok(record);
        }

        record.start();
        let started = Instant::now();

        let handler = Arc::clone(&tool.handler);
        let input = record.input.clone();
        let mut task = tokio::spawn(async move { handler.call(input).await });

        let outcome = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(output))) => match &tool.definition.output_schema {
                Some(output_schema) => {
                    let report = schema::validate(output_schema, &output);
                    if report.valid {
                        Ok(output)
                    } else {
                        Err(ExecutionError::Execution {
                            message: format!(
                                "output failed schema validation: {}",
                                report.errors.join("; ")
                            ),
                        })
                    }
                }
                None => Ok(output),
            },
            Ok(Ok(Err(e))) => Err(ExecutionError::Execution {
                message: format!("{:#}", e),
            }),
            Ok(Err(join_error)) => Err(ExecutionError::Execution {
                message: format!("handler aborted: {}", join_error),
            }),
            Err(_) => {
                task.abort();
                Err(ExecutionError::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        let elapsed = started.elapsed();
        tool.metrics
            .lock()
            .await
            .record(elapsed, outcome.as_ref().err());

        match outcome {
            Ok(output) => {
                debug!("Tool {} completed in {:?}", name, elapsed);
                record.complete(output, elapsed);
            }
            Err(error) => {
                warn!("Tool {} failed: {}", name, error);
                record.fail(error, elapsed);
            }
        }

        self.remember(&record).await;
        Ok(record)
    }

    async fn remember(&self, record: &ExecutionRecord) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock().await;
        if history.len() == self.history_limit {
            history.pop_front();
        }
        history.push_back(record.clone());
    }

    /// Snapshot of one tool's metrics
    pub async fn metrics(&self, name: &str) -> Option<ToolMetrics> {
        match self.tools.get(name) {
            Some(tool) => Some(tool.metrics.lock().await.clone()),
            None => None,
        }
    }

    /// Snapshot of every tool's metrics
    pub async fn all_metrics(&self) -> BTreeMap<String, ToolMetrics> {
        let mut all = BTreeMap::new();
        for (name, tool) in &self.tools {
            all.insert(name.clone(), tool.metrics.lock().await.clone());
        }
        all
    }

    /// Look up a recent execution by id
    pub async fn execution(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.history
            .lock()
            .await
            .iter()
            .find(|r| r.execution_id == execution_id)
            .cloned()
    }

    /// Most recent executions, newest last
    pub async fn recent_executions(&self, limit: usize) -> Vec<ExecutionRecord> {
        let history = self.history.lock().await;
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}
