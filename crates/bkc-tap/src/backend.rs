//! Network side of the aggregator

use async_trait::async_trait;
use serde_json::json;

use bkc_common::AccountState;
use bkc_router::{Method, RequestExecutor};
use crate::error::TapError;

/// Calls the aggregator needs: one aggregated tap submission and the
/// authoritative state fetch that follows it
#[async_trait]
pub trait TapBackend: Send + Sync {
    async fn submit_taps(&self, count: u64) -> Result<(), TapError>;
    async fn fetch_state(&self) -> Result<AccountState, TapError>;
}

#[async_trait]
impl TapBackend for RequestExecutor {
    async fn submit_taps(&self, count: u64) -> Result<(), TapError> {
        self.post("tap", &json!({ "count": count })).await?;
        Ok(())
    }

    async fn fetch_state(&self) -> Result<AccountState, TapError> {
        let data = self.execute(Method::POST, "state", None).await?;
        serde_json::from_value(data).map_err(|e| TapError::Decode(e.to_string()))
    }
}
