#![no_main]

use ghost_mcp::schema::{validate, Schema};
use ghost_mcp::tools::wallet_address_schema;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let wallet = Schema::object().with_required("wallet_address", wallet_address_schema());
    let first = validate(&wallet, &input);
    let second = validate(&wallet, &input);
    assert_eq!(first.errors, second.errors);

    // Arbitrary schemas too, as long as they are well formed
    if let Ok(schema) = serde_json::from_slice::<Schema>(data) {
        if schema.check().is_ok() {
            let _ = validate(&schema, &input);
        }
    }
});
