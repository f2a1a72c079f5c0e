//! Ghost MCP tools
//!
//! The registry and execution engine, plus the wallet-analysis catalog the
//! binary ships. Catalog scores are derived from a SHA-256 of the address so
//! every call is reproducible; they are demonstration values, not a risk
//! model.

mod analyze_wallet;
mod check_compliance;
mod detect_patterns;
mod execution;
mod handler;
mod registry;

pub use execution::{ErrorStats, ExecutionError, ExecutionRecord, ExecutionStatus, ToolMetrics};
pub use handler::{FnHandler, ToolHandler};
pub use registry::ToolRegistry;

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::schema::Schema;

/// Solana base58 address
pub const WALLET_ADDRESS_PATTERN: &str = "^[1-9A-HJ-NP-Za-km-z]{32,44}$";

/// Scores at or above this are `medium`
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.3;

/// Scores at or above this are `high`
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Input schema node for a wallet address
pub fn wallet_address_schema() -> Schema {
    Schema::string()
        .with_pattern(WALLET_ADDRESS_PATTERN)
        .with_description("Solana wallet address (base58)")
}

/// Coarse risk bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_RISK_THRESHOLD {
            RiskLevel::High
        } else if score >= MEDIUM_RISK_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// SHA-256 of an address
pub(crate) fn address_digest(address: &str) -> [u8; 32] {
    Sha256::digest(address.as_bytes()).into()
}

/// Deterministic score in [0, 1] for an address
pub fn risk_score(address: &str) -> f64 {
    let digest = address_digest(address);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) as f64 / u64::MAX as f64
}

/// Register the wallet-analysis catalog
pub fn register_builtin(registry: &mut ToolRegistry, blacklist: &[String]) -> Result<()> {
    registry.register(
        analyze_wallet::tool_definition(),
        Arc::new(FnHandler(analyze_wallet::execute)),
    )?;

    let blacklist: HashSet<String> = blacklist.iter().cloned().collect();
    registry.register(
        check_compliance::tool_definition(),
        Arc::new(check_compliance::ComplianceHandler::new(blacklist)),
    )?;

    registry.register(
        detect_patterns::tool_definition(),
        Arc::new(FnHandler(detect_patterns::execute)),
    )?;

    Ok(())
}
