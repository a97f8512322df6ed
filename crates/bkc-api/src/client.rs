//! BKC client facade
//!
//! One async method per backend operation. Every method routes through the
//! shared [`RequestExecutor`], reports failures (and notable successes) on the
//! [`FeedbackHub`], and publishes the account snapshot whenever the server
//! answers with one.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use bkc_common::{AccountState, FeedbackHub, Identity, Notification};
use bkc_config::{ClientConfig, TapSettings};
use bkc_router::{AffinityStore, Method, RequestExecutor};
use bkc_tap::TapAggregator;
use crate::error::ApiError;
use crate::models::*;

/// Freeze and unfreeze amounts are clamped into this range
pub const BANK_AMOUNT_MAX: i64 = 500_000_000;
/// Deposits and invoices are clamped to at most this many USD
pub const DEPOSIT_USD_MAX: i64 = 10_000;

pub struct BkcClient {
    executor: Arc<RequestExecutor>,
    feedback: FeedbackHub,
    taps: Arc<TapAggregator>,
}

impl BkcClient {
    pub fn new(executor: Arc<RequestExecutor>, tap_settings: TapSettings, feedback: FeedbackHub) -> Self {
        let taps = Arc::new(TapAggregator::new(executor.clone(), tap_settings, feedback.clone()));
        Self {
            executor,
            feedback,
            taps,
        }
    }

    pub fn from_config(
        config: &ClientConfig,
        store: Arc<dyn AffinityStore>,
        identity: Identity,
    ) -> Result<Self, ApiError> {
        let executor = Arc::new(RequestExecutor::from_config(config, store, identity)?);
        Ok(Self::new(executor, config.tap.clone(), FeedbackHub::new()))
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn feedback(&self) -> &FeedbackHub {
        &self.feedback
    }

    /// The tap engine sharing this client's executor and feedback hub. Taps
    /// only reach the backend through it.
    pub fn taps(&self) -> &Arc<TapAggregator> {
        &self.taps
    }

    // ========================================================================
    // High-frequency
    // ========================================================================

    pub async fn health(&self) -> Result<HealthReport, ApiError> {
        let result = self.get("health").await;
        self.report(result)
    }

    pub async fn blockchain(&self) -> Result<Value, ApiError> {
        let result = self.get("blockchain").await;
        self.report(result)
    }

    /// Fetch the authoritative account state and make it current
    pub async fn load_state(&self) -> Result<AccountState, ApiError> {
        let result = self
            .call::<AccountState>(Method::POST, "state", None)
            .await
            .map(|state| self.accept_state(state));
        self.report(result)
    }

    pub async fn buy(&self, item: BuyItem) -> Result<AccountState, ApiError> {
        self.state_call("buy", &BuyRequest { item }, "Purchase complete".to_string())
            .await
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    pub async fn transfer(&self, to: &str, amount: i64) -> Result<AccountState, ApiError> {
        let request = TransferRequest { to: to.trim(), amount };
        self.state_call("transfer", &request, format!("Sent {} BKC", amount))
            .await
    }

    pub async fn freeze(&self, amount: i64) -> Result<AccountState, ApiError> {
        let amount = amount.clamp(1, BANK_AMOUNT_MAX);
        self.state_call("bank/freeze", &AmountRequest { amount }, format!("Frozen {} BKC", amount))
            .await
    }

    pub async fn unfreeze(&self, amount: i64) -> Result<AccountState, ApiError> {
        let amount = amount.clamp(1, BANK_AMOUNT_MAX);
        self.state_call("bank/unfreeze", &AmountRequest { amount }, format!("Unfrozen {} BKC", amount))
            .await
    }

    /// Amount is clamped to the loan limit of the latest known account state
    pub async fn take_loan(&self, plan: LoanPlan, amount: i64) -> Result<AccountState, ApiError> {
        let amount = clamp_loan(amount, self.loan_limit());
        self.state_call(
            "bank/loan/take",
            &LoanTakeRequest { plan, amount },
            format!("Loan taken: {} BKC", amount),
        )
        .await
    }

    pub async fn my_loans(&self, limit: i64) -> Result<ItemList, ApiError> {
        let result = self.post("bank/loan/my", &LimitRequest { limit }).await;
        self.report(result)
    }

    pub async fn repay_loan(&self, loan_id: i64) -> Result<AccountState, ApiError> {
        self.state_call("bank/loan/repay", &LoanIdRequest { loan_id }, "Loan repaid".to_string())
            .await
    }

    pub async fn p2p_request_loan(&self, request: &P2pLoanRequest) -> Result<Value, ApiError> {
        let result = self.post::<_, Value>("p2p/loan/request", request).await;
        if result.is_ok() {
            self.feedback.notify(Notification::good("Loan request sent"));
        }
        self.report(result)
    }

    pub async fn p2p_accept_loan(&self, loan_id: i64) -> Result<Value, ApiError> {
        let result = self.post::<_, Value>("p2p/loan/accept", &LoanIdRequest { loan_id }).await;
        if result.is_ok() {
            self.feedback.notify(Notification::good("Loan accepted"));
        }
        self.report(result)
    }

    /// Register an on-chain deposit for manual review
    pub async fn create_deposit(
        &self,
        currency: &str,
        amount_usd: i64,
        tx_hash: &str,
    ) -> Result<AccountState, ApiError> {
        let request = DepositCreateRequest {
            currency: currency.trim(),
            amount_usd: amount_usd.clamp(1, DEPOSIT_USD_MAX),
            tx_hash: tx_hash.trim(),
        };
        self.state_call("deposit/create", &request, "Deposit created".to_string())
            .await
    }

    pub async fn create_invoice(&self, amount_usd: i64) -> Result<Invoice, ApiError> {
        let amount_usd = amount_usd.clamp(1, DEPOSIT_USD_MAX);
        let result = self
            .post::<_, Invoice>("deposit/cryptopay/invoice", &InvoiceRequest { amount_usd })
            .await;
        if let Ok(invoice) = &result {
            self.feedback.notify(Notification::good(format!(
                "Invoice created: ${} for {} BKC",
                invoice.amount_usd, invoice.coins
            )));
        }
        self.report(result)
    }

    pub async fn check_invoice(&self, invoice_id: i64) -> Result<AccountState, ApiError> {
        let result = self
            .call::<AccountState>(
                Method::POST,
                "deposit/cryptopay/check",
                Some(to_payload(&InvoiceCheckRequest { invoice_id })?),
            )
            .await
            .map(|state| self.accept_state(state));

        if let Ok(state) = &result {
            let status = state
                .extra
                .get("cryptopay")
                .and_then(|c| c.get("status"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            self.feedback
                .notify(Notification::info(format!("Invoice status: {}", status)));
        }
        self.report(result)
    }

    // ========================================================================
    // Marketplace
    // ========================================================================

    pub async fn list_nfts(&self) -> Result<ItemList, ApiError> {
        let result = self.post("nfts/list", &serde_json::Map::new()).await;
        self.report(result)
    }

    pub async fn my_nfts(&self) -> Result<ItemList, ApiError> {
        let result = self.post("nfts/my", &serde_json::Map::new()).await;
        self.report(result)
    }

    pub async fn buy_nft(&self, nft_id: i64) -> Result<AccountState, ApiError> {
        self.state_call("nfts/buy", &NftBuyRequest { nft_id }, "NFT purchased".to_string())
            .await
    }

    pub async fn list_listings(&self, status: &str, limit: i64) -> Result<ItemList, ApiError> {
        let result = self
            .post("market/listings/list", &StatusFilter { status, limit })
            .await;
        self.report(result)
    }

    pub async fn create_listing(&self, listing: &NewListing) -> Result<AccountState, ApiError> {
        self.state_call("market/listings/create", listing, "Listing created".to_string())
            .await
    }

    pub async fn buy_listing(&self, listing_id: i64) -> Result<AccountState, ApiError> {
        self.state_call(
            "market/listings/buy",
            &ListingIdRequest { listing_id },
            "Listing purchased".to_string(),
        )
        .await
    }

    pub async fn cancel_listing(&self, listing_id: i64) -> Result<Value, ApiError> {
        let result = self
            .post::<_, Value>("market/listings/cancel", &ListingIdRequest { listing_id })
            .await;
        if result.is_ok() {
            self.feedback.notify(Notification::good("Listing cancelled"));
        }
        self.report(result)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub async fn admin_deposits(&self, status: &str, limit: i64) -> Result<ItemList, ApiError> {
        let result = self.post("deposit/list", &StatusFilter { status, limit }).await;
        self.report(result)
    }

    pub async fn admin_process_deposit(&self, deposit_id: i64, approve: bool) -> Result<Value, ApiError> {
        let result = self
            .post::<_, Value>("deposit/process", &DepositProcessRequest { deposit_id, approve })
            .await;
        if result.is_ok() {
            let message = if approve { "Deposit approved" } else { "Deposit rejected" };
            self.feedback.notify(Notification::good(message));
        }
        self.report(result)
    }

    /// Replace the deposit wallets; rows with an empty key or address are dropped
    pub async fn admin_set_wallets(&self, wallets: &BTreeMap<String, String>) -> Result<AccountState, ApiError> {
        let wallets: BTreeMap<String, String> = wallets
            .iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        self.state_call(
            "admin/deposit_wallets/set",
            &WalletsRequest { wallets: &wallets },
            "Wallets saved".to_string(),
        )
        .await
    }

    pub async fn admin_broadcast(&self, text: &str) -> Result<Value, ApiError> {
        let result = self
            .post::<_, Value>("admin/broadcast", &BroadcastRequest { text: text.trim() })
            .await;
        if result.is_ok() {
            self.feedback.notify(Notification::good("Broadcast started"));
        }
        self.report(result)
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        operation: &'static str,
        payload: Option<Value>,
    ) -> Result<T, ApiError> {
        let data = self.executor.execute(method, operation, payload).await?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode {
            operation,
            message: e.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, operation: &'static str) -> Result<T, ApiError> {
        self.call(Method::GET, operation, None).await
    }

    async fn post<P: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        operation: &'static str,
        payload: &P,
    ) -> Result<T, ApiError> {
        self.call(Method::POST, operation, Some(to_payload(payload)?)).await
    }

    /// Operations answering with the refreshed account state
    async fn state_call<P: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        payload: &P,
        success: String,
    ) -> Result<AccountState, ApiError> {
        let result = self
            .post::<_, AccountState>(operation, payload)
            .await
            .map(|state| self.accept_state(state));

        if result.is_ok() {
            info!(operation, "Operation succeeded");
            self.feedback.notify(Notification::good(success));
        }
        self.report(result)
    }

    fn accept_state(&self, state: AccountState) -> AccountState {
        debug!(user_id = state.user_id, balance = state.balance, "Account state refreshed");
        self.taps.reconcile_with(&state);
        self.feedback.publish_state(state.clone());
        state
    }

    fn report<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(e) = &result {
            warn!(error = %e, "Operation failed");
            self.feedback.notify(Notification::bad(e.to_string()));
        }
        result
    }

    fn loan_limit(&self) -> Option<i64> {
        self.feedback
            .latest_state()
            .map(|state| state.bank.loan_max_amount)
            .filter(|max| *max > 0)
    }
}

fn to_payload<P: Serialize + ?Sized>(payload: &P) -> Result<Value, ApiError> {
    serde_json::to_value(payload)
        .map_err(|e| ApiError::Router(bkc_router::RouterError::InvalidPayload(e.to_string())))
}

/// Without a known limit only the lower bound applies; the server enforces the rest
fn clamp_loan(amount: i64, limit: Option<i64>) -> i64 {
    match limit {
        Some(max) => amount.clamp(1, max),
        None => amount.max(1),
    }
}
