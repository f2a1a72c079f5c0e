#![no_main]

use ghost_mcp::invariants::validate_request;
use ghost_mcp::protocol::JsonRpcMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Should not panic
    if let Ok(JsonRpcMessage::Request(request)) = JsonRpcMessage::parse(text) {
        let _ = validate_request(&request);

        // Whatever parsed must serialize and parse again
        let line = serde_json::to_string(&request).unwrap();
        assert!(JsonRpcMessage::parse(&line).is_ok());
    }
});
