//! Request payloads and response shapes of the backend operations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Requests
// ============================================================================

/// Purchasable boosts of the tap screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyItem {
    #[serde(rename = "energy_1h")]
    Energy1h,
    #[serde(rename = "tap_pack")]
    TapPack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanPlan {
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

#[derive(Debug, Serialize)]
pub(crate) struct BuyRequest {
    pub item: BuyItem,
}

#[derive(Debug, Serialize)]
pub(crate) struct TransferRequest<'a> {
    pub to: &'a str,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AmountRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoanTakeRequest {
    pub plan: LoanPlan,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct LimitRequest {
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoanIdRequest {
    pub loan_id: i64,
}

/// Peer-to-peer loan request addressed to a lender (user id or BKC address)
#[derive(Debug, Clone, Serialize)]
pub struct P2pLoanRequest {
    pub lender: String,
    pub amount: i64,
    pub interest_bp: i64,
    pub term_days: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct DepositCreateRequest<'a> {
    pub currency: &'a str,
    pub amount_usd: i64,
    pub tx_hash: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct InvoiceRequest {
    pub amount_usd: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct InvoiceCheckRequest {
    pub invoice_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct NftBuyRequest {
    pub nft_id: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub category: String,
    pub price_coins: i64,
    pub contact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_mime: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusFilter<'a> {
    pub status: &'a str,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListingIdRequest {
    pub listing_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct DepositProcessRequest {
    pub deposit_id: i64,
    pub approve: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct WalletsRequest<'a> {
    pub wallets: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BroadcastRequest<'a> {
    pub text: &'a str,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub service: String,
    pub ts: i64,
    pub db_ok: bool,
    pub fasttap_enabled: bool,
    pub memtap_enabled: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// `{ "items": [...] }` listing wrapper
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemList {
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Invoice {
    pub invoice_id: i64,
    pub status: String,
    pub url: String,
    pub amount_usd: i64,
    pub coins: i64,
    pub rate: f64,
}
