//! Wallet risk analysis tool

use serde::Deserialize;
use serde_json::{json, Value};

use super::{address_digest, risk_score, wallet_address_schema, RiskLevel};
use crate::protocol::{ExecutionMode, Tool};
use crate::schema::Schema;

const FACTORS: [&str; 6] = [
    "high_velocity",
    "mixer_exposure",
    "fresh_account",
    "dormant_reactivation",
    "concentrated_inflows",
    "known_counterparty",
];

/// Analyze wallet input parameters
#[derive(Debug, Deserialize)]
pub struct AnalyzeWalletParams {
    pub wallet_address: String,

    /// Counterparty hops to consider
    #[serde(default = "default_depth")]
    pub depth: u8,
}

fn default_depth() -> u8 {
    1
}

/// Get the tool definition
pub fn tool_definition() -> Tool {
    Tool {
        name: "analyze_wallet".to_string(),
        description: "Score a Solana wallet and list the factors behind the score.".to_string(),
        category: "analysis".to_string(),
        execution_mode: ExecutionMode::Sync,
        input_schema: Schema::object()
            .with_required("wallet_address", wallet_address_schema())
            .with_property(
                "depth",
                Schema::integer()
                    .with_range(Some(1.0), Some(5.0))
                    .with_description("Counterparty hops to consider (1-5)"),
            )
            .deny_additional(),
        output_schema: Some(
            Schema::object()
                .with_required("wallet_address", Schema::string())
                .with_required("risk_score", Schema::number().with_range(Some(0.0), Some(1.0)))
                .with_required(
                    "risk_level",
                    Schema::string().with_enum(["low", "medium", "high"]),
                )
                .with_required("depth", Schema::integer())
                .with_required("factors", Schema::array(Schema::string())),
        ),
    }
}

/// Factors whose digest byte crosses the flag threshold
fn factors(digest: &[u8; 32], depth: u8) -> Vec<&'static str> {
    FACTORS
        .iter()
        .enumerate()
        .filter(|(i, _)| digest[8 + i] as u32 + depth as u32 * 8 >= 200)
        .map(|(_, name)| *name)
        .collect()
}

/// Execute the analyze wallet tool
pub async fn execute(arguments: Value) -> anyhow::Result<Value> {
    let params: AnalyzeWalletParams = serde_json::from_value(arguments)?;

    let score = risk_score(&params.wallet_address);
    let digest = address_digest(&params.wallet_address);

    Ok(json!({
        "wallet_address": params.wallet_address,
        "risk_score": score,
        "risk_level": RiskLevel::from_score(score).as_str(),
        "depth": params.depth,
        "factors": factors(&digest, params.depth),
        "fingerprint": hex::encode(&digest[..8]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    const ADDRESS: &str = "So11111111111111111111111111111111111111112";

    #[tokio::test]
    async fn test_analyze_wallet() {
        let output = execute(json!({ "wallet_address": ADDRESS })).await.unwrap();

        let score = output["risk_score"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(output["depth"], 1);
        assert_eq!(output["fingerprint"].as_str().unwrap().len(), 16);

        let definition = tool_definition();
        let report = schema::validate(definition.output_schema.as_ref().unwrap(), &output);
        assert!(report.valid, "{:?}", report.errors);
    }

    #[tokio::test]
    async fn test_deeper_analysis_never_drops_factors() {
        let shallow = execute(json!({ "wallet_address": ADDRESS, "depth": 1 })).await.unwrap();
        let deep = execute(json!({ "wallet_address": ADDRESS, "depth": 5 })).await.unwrap();

        let shallow = shallow["factors"].as_array().unwrap().len();
        let deep = deep["factors"].as_array().unwrap().len();
        assert!(deep >= shallow);
    }

    #[test]
    fn test_input_schema_rejects_non_base58() {
        let definition = tool_definition();
        let report = schema::validate(
            &definition.input_schema,
            &json!({ "wallet_address": "0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl" }),
        );
        assert!(!report.valid);
    }
}
