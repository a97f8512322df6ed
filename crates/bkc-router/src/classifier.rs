//! Operation classifier
//!
//! Total mapping from an operation name to the [`Category`] whose pool
//! serves it. Rules are checked in order: exact high-frequency names,
//! category namespaces, then the general default.

use bkc_common::Category;

const HIGH_FREQUENCY_OPERATIONS: &[&str] = &["tap", "state", "buy", "blockchain", "health"];

const MARKETPLACE_PREFIXES: &[&str] = &["market/", "nfts/", "assets/listings/"];

const LEDGER_OPERATIONS: &[&str] = &["transfer"];
const LEDGER_PREFIXES: &[&str] = &["bank/", "p2p/", "deposit/", "cryptopay/"];

const ADMINISTRATIVE_PREFIXES: &[&str] = &["admin/"];

/// Classify an operation name. Case-insensitive, surrounding whitespace and
/// leading slashes are ignored.
pub fn classify(operation: &str) -> Category {
    let op = operation.trim().trim_start_matches('/').to_ascii_lowercase();

    if op.is_empty() {
        return Category::General;
    }
    if HIGH_FREQUENCY_OPERATIONS.contains(&op.as_str()) {
        return Category::HighFrequency;
    }
    if has_prefix(&op, MARKETPLACE_PREFIXES) {
        return Category::Marketplace;
    }
    if LEDGER_OPERATIONS.contains(&op.as_str()) || has_prefix(&op, LEDGER_PREFIXES) {
        return Category::Ledger;
    }
    if has_prefix(&op, ADMINISTRATIVE_PREFIXES) {
        return Category::Administrative;
    }
    Category::General
}

fn has_prefix(op: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| op.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_frequency_exact_names() {
        for op in ["tap", "state", "buy", "blockchain", "health", " TAP ", "State"] {
            assert_eq!(classify(op), Category::HighFrequency, "{op}");
        }
        // Exact match only
        assert_eq!(classify("tap/extra"), Category::General);
        assert_eq!(classify("statement"), Category::General);
    }

    #[test]
    fn test_marketplace_namespaces() {
        assert_eq!(classify("market/listings/list"), Category::Marketplace);
        assert_eq!(classify("nfts/buy"), Category::Marketplace);
        assert_eq!(classify("assets/listings/17"), Category::Marketplace);
        assert_eq!(classify("assets/coin.svg"), Category::General);
        assert_eq!(classify("market"), Category::General);
    }

    #[test]
    fn test_ledger_rules() {
        assert_eq!(classify("transfer"), Category::Ledger);
        assert_eq!(classify("bank/freeze"), Category::Ledger);
        assert_eq!(classify("p2p/loan/request"), Category::Ledger);
        assert_eq!(classify("deposit/create"), Category::Ledger);
        assert_eq!(classify("deposit/cryptopay/check"), Category::Ledger);
        assert_eq!(classify("cryptopay/webhook"), Category::Ledger);
        assert_eq!(classify("transfers"), Category::General);
    }

    #[test]
    fn test_administrative_namespace() {
        assert_eq!(classify("admin/broadcast"), Category::Administrative);
        assert_eq!(classify("ADMIN/deposit_wallets/set"), Category::Administrative);
        assert_eq!(classify("admin"), Category::General);
    }

    #[test]
    fn test_unclassifiable_defaults_to_general() {
        assert_eq!(classify(""), Category::General);
        assert_eq!(classify("   "), Category::General);
        assert_eq!(classify("/"), Category::General);
        assert_eq!(classify("leaderboard"), Category::General);
        assert_eq!(classify("ünïcode/☃"), Category::General);
    }

    #[test]
    fn test_leading_slash_is_ignored() {
        assert_eq!(classify("/bank/loan/take"), Category::Ledger);
        assert_eq!(classify("/tap"), Category::HighFrequency);
    }

    #[test]
    fn test_classification_is_stable() {
        for _ in 0..3 {
            assert_eq!(classify("market/listings/buy"), Category::Marketplace);
        }
    }
}
