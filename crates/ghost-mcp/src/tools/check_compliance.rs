//! Compliance screening tool

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

use super::{risk_score, wallet_address_schema, ToolHandler, HIGH_RISK_THRESHOLD};
use crate::protocol::{ExecutionMode, Tool};
use crate::schema::Schema;

#[derive(Debug, Deserialize)]
struct CheckComplianceParams {
    wallet_address: String,
}

/// Get the tool definition
pub fn tool_definition() -> Tool {
    Tool {
        name: "check_compliance".to_string(),
        description: "Screen a wallet against the configured blacklist and the high-risk \
             threshold."
            .to_string(),
        category: "compliance".to_string(),
        execution_mode: ExecutionMode::Sync,
        input_schema: Schema::object()
            .with_required("wallet_address", wallet_address_schema())
            .deny_additional(),
        output_schema: Some(
            Schema::object()
                .with_required("wallet_address", Schema::string())
                .with_required("compliant", Schema::boolean())
                .with_required("flags", Schema::array(Schema::string())),
        ),
    }
}

/// Screens addresses against a fixed blacklist
pub struct ComplianceHandler {
    blacklist: HashSet<String>,
}

impl ComplianceHandler {
    pub fn new(blacklist: HashSet<String>) -> Self {
        Self { blacklist }
    }
}

#[async_trait]
impl ToolHandler for ComplianceHandler {
    async fn call(&self, input: Value) -> anyhow::Result<Value> {
        let params: CheckComplianceParams = serde_json::from_value(input)?;

        let mut flags = Vec::new();
        if self.blacklist.contains(&params.wallet_address) {
            flags.push("blacklisted");
        }
        if risk_score(&params.wallet_address) >= HIGH_RISK_THRESHOLD {
            flags.push("high_risk");
        }

        Ok(json!({
            "wallet_address": params.wallet_address,
            "compliant": flags.is_empty(),
            "flags": flags,
        }))
    }
}
