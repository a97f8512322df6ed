use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::debug;

// ============================================================================
// Routing Types
// ============================================================================

/// Routing class of an API operation. Each category is served by its own
/// backend pool and keeps its own sticky node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    General,
    HighFrequency,
    Marketplace,
    Ledger,
    Administrative,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::General,
        Category::HighFrequency,
        Category::Marketplace,
        Category::Ledger,
        Category::Administrative,
    ];

    /// Short key used in configuration names and affinity storage keys
    pub fn key(&self) -> &'static str {
        match self {
            Category::General => "full",
            Category::HighFrequency => "tap",
            Category::Marketplace => "market",
            Category::Ledger => "bank",
            Category::Administrative => "admin",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Response envelope returned by every backend endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiEnvelope {
    pub fn success(data: serde_json::Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(error.into()) }
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Numeric value derived from the host user id. Only used to spread sticky
/// node selection deterministically across a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityHint(u64);

impl IdentityHint {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Only positive user ids are hints; the host reports `0` when no user
    /// is attached.
    pub fn from_user_id(user_id: i64) -> Option<Self> {
        u64::try_from(user_id).ok().filter(|v| *v > 0).map(Self)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Host-provided identity context
#[derive(Clone, Default)]
pub struct Identity {
    /// Opaque token forwarded as `init_data` on every mutating call
    pub init_data: String,
    pub hint: Option<IdentityHint>,
}

impl Identity {
    pub fn new(init_data: impl Into<String>, hint: Option<IdentityHint>) -> Self {
        Self { init_data: init_data.into(), hint }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("init_data", &format_args!("<{} bytes>", self.init_data.len()))
            .field("hint", &self.hint)
            .finish()
    }
}

// ============================================================================
// Account State
// ============================================================================

/// Daily tap quota block of the account state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapQuota {
    pub daily_limit: i64,
    pub daily_tapped: i64,
    pub daily_extra_quota: i64,
    pub daily_remaining: i64,
    pub pack_size: i64,
}

/// Bank parameters advertised by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankTerms {
    pub loan_max_amount: i64,
    pub loan_7d_interest_bp: i64,
    pub loan_30d_interest_bp: i64,
    pub p2p_recall_min_days: i64,
    pub market_listing_fee_bkc: i64,
}

/// Authoritative account snapshot returned by the `state` operation.
/// Unknown fields are kept in `extra` so presentation can still render them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountState {
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub is_admin: bool,
    pub address: String,
    pub balance: i64,
    pub frozen_balance: i64,
    pub taps_total: i64,
    pub energy: i64,
    pub energy_max: i64,
    pub coins_per_usd: f64,
    pub tap: TapQuota,
    pub bank: BankTerms,
    pub prices: serde_json::Map<String, serde_json::Value>,
    pub ts: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Presentation Feedback
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Good,
    Info,
    Bad,
}

/// Transient user feedback emitted after an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, message: message.into(), at: Utc::now() }
    }

    pub fn good(message: impl Into<String>) -> Self {
        Self::new(Severity::Good, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn bad(message: impl Into<String>) -> Self {
        Self::new(Severity::Bad, message)
    }
}

const NOTIFICATION_CAPACITY: usize = 64;

/// Outbound channel pair towards the presentation layer: the latest
/// authoritative snapshot plus a stream of notifications.
#[derive(Clone)]
pub struct FeedbackHub {
    state_tx: Arc<watch::Sender<Option<AccountState>>>,
    notify_tx: broadcast::Sender<Notification>,
}

impl FeedbackHub {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(None);
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            state_tx: Arc::new(state_tx),
            notify_tx,
        }
    }

    pub fn publish_state(&self, state: AccountState) {
        self.state_tx.send_replace(Some(state));
    }

    pub fn notify(&self, notification: Notification) {
        debug!(severity = ?notification.severity, message = %notification.message, "Notification");
        // No subscribers is fine; presentation may not be attached yet
        let _ = self.notify_tx.send(notification);
    }

    pub fn latest_state(&self) -> Option<AccountState> {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<Option<AccountState>> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }
}

impl Default for FeedbackHub {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Views
// ============================================================================

/// Initial screen requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Tap,
    Wallet,
    Market,
    Deposit,
    Chain,
}

impl View {
    /// Unknown or empty selectors fall back to the tap view
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "wallet" => View::Wallet,
            "market" => View::Market,
            "deposit" => View::Deposit,
            "chain" => View::Chain,
            _ => View::Tap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_keys_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_key(category.key()), Some(category));
        }
        assert_eq!(Category::from_key(" TAP "), Some(Category::HighFrequency));
        assert_eq!(Category::from_key("nope"), None);
    }

    #[test]
    fn test_identity_hint_requires_positive_user_id() {
        assert_eq!(IdentityHint::from_user_id(0), None);
        assert_eq!(IdentityHint::from_user_id(7), Some(IdentityHint::new(7)));
        assert_eq!(IdentityHint::from_user_id(-7), None);
        assert_eq!(IdentityHint::from_user_id(i64::MIN), None);
    }

    #[test]
    fn test_identity_debug_hides_token() {
        let identity = Identity::new("query_id=secret", None);
        let rendered = format!("{:?}", identity);
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_account_state_keeps_unknown_fields() {
        let state: AccountState = serde_json::from_value(serde_json::json!({
            "user_id": 42,
            "energy": 120,
            "energy_max": 500,
            "tap": {"daily_limit": 1000, "daily_remaining": 900},
            "bank": {"loan_7d_interest_bp": 300},
            "coin_image_url": "https://cdn.example/coin.svg"
        }))
        .unwrap();

        assert_eq!(state.user_id, 42);
        assert_eq!(state.energy, 120);
        assert_eq!(state.tap.daily_remaining, 900);
        assert_eq!(state.bank.loan_7d_interest_bp, 300);
        assert_eq!(
            state.extra.get("coin_image_url").and_then(|v| v.as_str()),
            Some("https://cdn.example/coin.svg")
        );
    }

    #[test]
    fn test_envelope_parses_without_optional_fields() {
        let env: ApiEnvelope = serde_json::from_str(r#"{"ok":false}"#).unwrap();
        assert!(!env.ok);
        assert!(env.data.is_none());
        assert!(env.error.is_none());
    }

    #[test]
    fn test_view_parse_falls_back_to_tap() {
        assert_eq!(View::parse("Chain"), View::Chain);
        assert_eq!(View::parse(""), View::Tap);
        assert_eq!(View::parse("settings"), View::Tap);
    }

    #[tokio::test]
    async fn test_feedback_hub_publishes() {
        let hub = FeedbackHub::new();
        let mut notes = hub.subscribe_notifications();
        let mut states = hub.subscribe_state();

        hub.notify(Notification::bad("boom"));
        hub.publish_state(AccountState { energy: 3, ..Default::default() });

        let note = notes.recv().await.unwrap();
        assert_eq!(note.severity, Severity::Bad);
        assert_eq!(note.message, "boom");

        states.changed().await.unwrap();
        assert_eq!(states.borrow().as_ref().map(|s| s.energy), Some(3));
        assert_eq!(hub.latest_state().map(|s| s.energy), Some(3));
    }
}
