//! Property-based tests for ghost-mcp using proptest
//!
//! These tests verify invariants that should hold for all inputs.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use ghost_mcp::protocol::{JsonRpcMessage, ToolsCallResult};
use ghost_mcp::resources::{cache_key, canonical_json};
use ghost_mcp::schema::{validate, Schema};
use ghost_mcp::tools::WALLET_ADDRESS_PATTERN;
use ghost_mcp::{Dispatcher, JsonRpcRequest, ServerConfig, SessionSlot};

// ============================================
// Strategies
// ============================================

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        (-1.0e6f64..1.0e6).prop_map(|f| json!(f)),
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z_]{1,8}", inner), 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

fn arb_address() -> impl Strategy<Value = String> {
    "[1-9A-HJ-NP-Za-km-z]{32,44}"
}

fn wallet_schema() -> Schema {
    Schema::object()
        .with_required(
            "wallet_address",
            Schema::string().with_pattern(WALLET_ADDRESS_PATTERN),
        )
        .with_property(
            "depth",
            Schema::integer().with_range(Some(1.0), Some(5.0)),
        )
        .with_property(
            "tags",
            Schema::array(Schema::string()).with_item_bounds(Some(0), Some(3)),
        )
        .deny_additional()
}

// ============================================
// Schema Validation Properties
// ============================================

proptest! {
    #[test]
    fn validation_is_idempotent(input in arb_json()) {
        let schema = wallet_schema();
        let first = validate(&schema, &input);
        let second = validate(&schema, &input);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn validity_matches_error_list(input in arb_json()) {
        let report = validate(&wallet_schema(), &input);
        prop_assert_eq!(report.valid, report.errors.is_empty());
    }

    #[test]
    fn integer_range_is_exact(n in -20i64..20) {
        let schema = Schema::integer().with_range(Some(1.0), Some(5.0));
        let report = validate(&schema, &json!(n));
        prop_assert_eq!(report.valid, (1..=5).contains(&n));
    }

    #[test]
    fn valid_addresses_pass(address in arb_address(), depth in 1u8..=5) {
        let report = validate(
            &wallet_schema(),
            &json!({ "wallet_address": address, "depth": depth }),
        );
        prop_assert!(report.valid, "{:?}", report.errors);
    }
}

// ============================================
// Cache Key Properties
// ============================================

proptest! {
    #[test]
    fn cache_key_ignores_key_order(
        entries in prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..8)
    ) {
        let forward: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        let backward: Map<String, Value> = entries
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();

        let uri = "ghost://wallet/profile";
        prop_assert_eq!(
            cache_key(uri, &Value::Object(forward)),
            cache_key(uri, &Value::Object(backward))
        );
    }

    #[test]
    fn canonical_json_reparses_to_same_value(input in arb_json()) {
        let text = canonical_json(&input);
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(reparsed, input);
    }

    #[test]
    fn cache_key_separates_uris(input in arb_json()) {
        prop_assert_ne!(
            cache_key("ghost://risk/thresholds", &input),
            cache_key("ghost://wallet/profile", &input)
        );
    }
}

// ============================================
// Protocol Properties
// ============================================

proptest! {
    #[test]
    fn message_parse_never_panics(raw in ".{0,256}") {
        let _ = JsonRpcMessage::parse(&raw);
    }

    #[test]
    fn risk_score_always_in_unit_interval(address in arb_address()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let result = runtime.block_on(async {
            let dispatcher = Dispatcher::with_builtin(&ServerConfig::default()).unwrap();
            let mut slot = SessionSlot::new();
            dispatcher
                .handle_request(
                    &mut slot,
                    &JsonRpcRequest::new(1, "initialize").with_params(json!({
                        "protocolVersion": "2025-11-25",
                        "clientInfo": { "name": "proptest" }
                    })),
                )
                .await;
            dispatcher
                .handle_request(
                    &mut slot,
                    &JsonRpcRequest::new(2, "tools/call").with_params(json!({
                        "name": "analyze_wallet",
                        "arguments": { "wallet_address": address }
                    })),
                )
                .await
        });

        let result: ToolsCallResult = serde_json::from_value(result.result.unwrap()).unwrap();
        prop_assert!(!result.is_error);
        let score = result.structured_content.unwrap()["risk_score"].as_f64().unwrap();
        prop_assert!((0.0..=1.0).contains(&score));
    }
}
