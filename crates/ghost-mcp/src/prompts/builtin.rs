//! Prompts shipped with the server

use super::{PromptCatalog, PromptTemplate};
use crate::error::Result;
use crate::protocol::PromptRole;

const INVESTIGATE_WALLET: &str = r#"Investigate the Solana wallet {wallet_address}.

## Steps

1. **Score the wallet** using `analyze_wallet`:
   ```json
   { "wallet_address": "{wallet_address}", "depth": {depth} }
   ```

2. **Read the profile** from resource `ghost://wallet/profile` with the same
   address, and compare the score against `ghost://risk/thresholds`.

3. **Screen the wallet** using `check_compliance`.

## Report

- Risk level and the factors behind it
- Any compliance flags
- Recommended next action (monitor, escalate, or clear)"#;

const COMPLIANCE_REPORT: &str = r#"Prepare a compliance report covering these wallets: {addresses}.

## Steps

1. Run `check_compliance` for every wallet.
2. Run `detect_patterns` once with the full list to find clusters.
3. Summarize flagged wallets first, then clusters, then clean wallets.

Audience: {audience}."#;

/// Register the built-in prompts
pub fn register_builtin(catalog: &mut PromptCatalog) -> Result<()> {
    catalog.register(
        PromptTemplate::new(
            "investigate_wallet",
            "Step-by-step investigation of {wallet_address}",
        )
        .required("wallet_address", "Solana wallet address (base58)")
        .optional("depth", "Counterparty hops to consider (1-5)", "2")
        .message(PromptRole::User, INVESTIGATE_WALLET),
    )?;

    catalog.register(
        PromptTemplate::new("compliance_report", "Compliance report for a batch of wallets")
            .required("addresses", "Comma-separated wallet addresses")
            .optional("audience", "Who the report is for", "the compliance team")
            .message(PromptRole::User, COMPLIANCE_REPORT),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PromptContent;
    use serde_json::json;

    #[test]
    fn test_builtin_prompts() {
        let mut catalog = PromptCatalog::new();
        register_builtin(&mut catalog).unwrap();

        let names: Vec<String> = catalog.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["investigate_wallet", "compliance_report"]);
    }

    #[test]
    fn test_investigate_wallet_renders() {
        let mut catalog = PromptCatalog::new();
        register_builtin(&mut catalog).unwrap();

        let args = json!({ "wallet_address": "So11111111111111111111111111111111111111112" });
        let result = catalog
            .get("investigate_wallet", args.as_object())
            .unwrap();

        let PromptContent::Text { text } = &result.messages[0].content;
        assert!(text.contains("So11111111111111111111111111111111111111112"));
        assert!(text.contains("\"depth\": 2"));
        assert!(!text.contains("{wallet_address}"));
    }
}
