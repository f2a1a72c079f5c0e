//! Resources shipped with the server

use serde_json::{json, Value};
use std::sync::Arc;

use super::{FnProvider, ResourceRegistry};
use crate::error::Result;
use crate::protocol::Resource;
use crate::schema::Schema;
use crate::tools::{
    address_digest, risk_score, wallet_address_schema, RiskLevel, HIGH_RISK_THRESHOLD,
    MEDIUM_RISK_THRESHOLD,
};

pub const THRESHOLDS_URI: &str = "ghost://risk/thresholds";
pub const WALLET_PROFILE_URI: &str = "ghost://wallet/profile";

/// Register the built-in resources
pub fn register_builtin(registry: &mut ResourceRegistry) -> Result<()> {
    registry.register(
        Resource {
            uri: THRESHOLDS_URI.to_string(),
            name: "Risk Thresholds".to_string(),
            description: Some("Score boundaries between risk levels".to_string()),
            mime_type: Some("application/json".to_string()),
            input_schema: Schema::object().deny_additional(),
        },
        Arc::new(FnProvider(read_thresholds)),
    )?;

    registry.register(
        Resource {
            uri: WALLET_PROFILE_URI.to_string(),
            name: "Wallet Profile".to_string(),
            description: Some("Summary profile of a single wallet".to_string()),
            mime_type: Some("application/json".to_string()),
            input_schema: Schema::object()
                .with_required("wallet_address", wallet_address_schema())
                .deny_additional(),
        },
        Arc::new(FnProvider(read_wallet_profile)),
    )?;

    Ok(())
}

async fn read_thresholds(_input: Value) -> anyhow::Result<String> {
    let thresholds = json!({
        "levels": [
            { "level": "low", "min": 0.0, "max": MEDIUM_RISK_THRESHOLD },
            { "level": "medium", "min": MEDIUM_RISK_THRESHOLD, "max": HIGH_RISK_THRESHOLD },
            { "level": "high", "min": HIGH_RISK_THRESHOLD, "max": 1.0 }
        ]
    });
    Ok(serde_json::to_string_pretty(&thresholds)?)
}

async fn read_wallet_profile(input: Value) -> anyhow::Result<String> {
    let address = input
        .get("wallet_address")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("wallet_address missing"))?;

    let score = risk_score(address);
    let digest = address_digest(address);
    let profile = json!({
        "wallet_address": address,
        "risk_score": score,
        "risk_level": RiskLevel::from_score(score).as_str(),
        "fingerprint": hex::encode(&digest[..8]),
        "transaction_count": u16::from_be_bytes([digest[16], digest[17]]),
    });
    Ok(serde_json::to_string_pretty(&profile)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_builtin_resources() {
        let mut registry = ResourceRegistry::new(Duration::from_secs(300));
        register_builtin(&mut registry).unwrap();
        assert_eq!(registry.uris(), vec![THRESHOLDS_URI, WALLET_PROFILE_URI]);

        let thresholds = registry.read(THRESHOLDS_URI, json!({})).await.unwrap();
        let parsed: Value = serde_json::from_str(&thresholds.text).unwrap();
        assert_eq!(parsed["levels"].as_array().unwrap().len(), 3);

        let profile = registry
            .read(
                WALLET_PROFILE_URI,
                json!({ "wallet_address": "So11111111111111111111111111111111111111112" }),
            )
            .await
            .unwrap();
        assert_eq!(profile.mime_type.as_deref(), Some("application/json"));
        let parsed: Value = serde_json::from_str(&profile.text).unwrap();
        assert!(parsed["risk_score"].as_f64().unwrap() <= 1.0);
    }
}
