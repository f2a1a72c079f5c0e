//! Request counters and the error/event history

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::resources::CacheStats;
use crate::tools::ToolMetrics;

/// One failed call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub code: i32,
    pub message: String,
}

/// Dispatcher-wide counters
#[derive(Debug)]
pub struct DispatchMetrics {
    total_requests: u64,
    total_errors: u64,
    per_method: BTreeMap<String, u64>,
    events: VecDeque<ErrorEvent>,
    event_limit: usize,
}

impl DispatchMetrics {
    pub fn new(event_limit: usize) -> Self {
        Self {
            total_requests: 0,
            total_errors: 0,
            per_method: BTreeMap::new(),
            events: VecDeque::new(),
            event_limit,
        }
    }

    pub fn record_request(&mut self, method: &str) {
        self.total_requests += 1;
        *self.per_method.entry(method.to_string()).or_insert(0) += 1;
    }

    pub fn record_error(&mut self, method: &str, code: i32, message: impl Into<String>) {
        self.total_errors += 1;
        if self.event_limit == 0 {
            return;
        }
        if self.events.len() == self.event_limit {
            self.events.pop_front();
        }
        self.events.push_back(ErrorEvent {
            timestamp: Utc::now(),
            method: method.to_string(),
            code,
            message: message.into(),
        });
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    pub fn events(&self) -> Vec<ErrorEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn per_method(&self) -> BTreeMap<String, u64> {
        self.per_method.clone()
    }
}

/// Serializable view of server health
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub per_method: BTreeMap<String, u64>,
    pub recent_errors: Vec<ErrorEvent>,
    pub active_sessions: usize,
    pub tools: BTreeMap<String, ToolMetrics>,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_history_is_bounded() {
        let mut metrics = DispatchMetrics::new(2);
        for i in 0..3 {
            metrics.record_request("tools/call");
            metrics.record_error("tools/call", -32005, format!("failure {}", i));
        }

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.total_errors(), 3);
        let events = metrics.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "failure 1");
        assert_eq!(metrics.per_method()["tools/call"], 3);
    }
}
