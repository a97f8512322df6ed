//! Request executor
//!
//! Performs one logical API call with bounded failover: at most
//! `min(3, pool size)` attempts, each on a different node, with no delay in
//! between. Domain rejections are returned immediately.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use bkc_common::{ApiEnvelope, Category, Identity};
use bkc_config::ClientConfig;
use crate::affinity::AffinityStore;
use crate::classifier::classify;
use crate::error::{RouterError, DEFAULT_API_ERROR};
use crate::registry::PoolRegistry;
use crate::selector::NodeSelector;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

/// Upper bound on attempts per call, regardless of pool size
pub const MAX_ATTEMPTS: usize = 3;

/// Client-error statuses that another node would answer identically
const DETERMINISTIC_REJECTIONS: &[u16] = &[400, 401, 403, 409, 422];

/// 404 message of a node whose profile does not serve the endpoint; any
/// other enveloped 404 is a missing resource and is not retried
const PROFILE_DISABLED_MESSAGE: &str = "endpoint disabled on this node profile";

pub struct RequestExecutor {
    selector: NodeSelector,
    transport: Arc<dyn Transport>,
    identity: Identity,
    last_address: RwLock<Option<String>>,
}

impl RequestExecutor {
    pub fn new(
        registry: Arc<PoolRegistry>,
        store: Arc<dyn AffinityStore>,
        transport: Arc<dyn Transport>,
        identity: Identity,
    ) -> Self {
        let selector = NodeSelector::new(registry, store, identity.hint);
        Self {
            selector,
            transport,
            identity,
            last_address: RwLock::new(None),
        }
    }

    /// Build the registry and HTTP transport from configuration
    pub fn from_config(
        config: &ClientConfig,
        store: Arc<dyn AffinityStore>,
        identity: Identity,
    ) -> Result<Self, RouterError> {
        let registry = Arc::new(PoolRegistry::build(&config.pools));
        let transport = Arc::new(HttpTransport::new(&config.transport)?);
        Ok(Self::new(registry, store, transport, identity))
    }

    pub fn selector(&self) -> &NodeSelector {
        &self.selector
    }

    /// Node that served the most recent successful call. Informational only.
    pub fn last_address(&self) -> Option<String> {
        self.last_address.read().clone()
    }

    pub async fn get(&self, operation: &str) -> Result<Value, RouterError> {
        self.execute(Method::GET, operation, None).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, operation: &str, payload: &T) -> Result<Value, RouterError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| RouterError::InvalidPayload(e.to_string()))?;
        self.execute(Method::POST, operation, Some(payload)).await
    }

    pub async fn execute(
        &self,
        method: Method,
        operation: &str,
        payload: Option<Value>,
    ) -> Result<Value, RouterError> {
        let operation = operation.trim().trim_start_matches('/');
        let category = classify(operation);

        let body = if is_mutating(&method) {
            Some(self.enrich(payload)?)
        } else {
            None
        };

        let budget = self.selector.pool_size(category).min(MAX_ATTEMPTS);
        let Some(mut address) = self.selector.resolve(category) else {
            let err = RouterError::NoNodes(category);
            error!(category = %category, operation, "No nodes to route to");
            record_outcome(category, err.outcome_label());
            return Err(err);
        };

        let mut last_error = None;

        for attempt in 1..=budget {
            let request = ApiRequest {
                method: method.clone(),
                url: format!("{}/api/v1/{}", address, operation),
                body: body.clone(),
            };

            let outcome = match self.transport.send(request).await {
                Ok(response) => interpret(response),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(data) => {
                    debug!(category = %category, operation, address = %address, attempt, "Call succeeded");
                    *self.last_address.write() = Some(address);
                    record_outcome(category, "success");
                    return Ok(data);
                }
                Err(err) if !err.is_retryable() => {
                    warn!(
                        category = %category,
                        operation,
                        address = %address,
                        error = %err,
                        "Call rejected by server"
                    );
                    record_outcome(category, err.outcome_label());
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        category = %category,
                        operation,
                        address = %address,
                        attempt,
                        budget,
                        error = %err,
                        "Call failed"
                    );
                    last_error = Some(err);
                    if attempt < budget {
                        address = self.selector.rotate(category, &address);
                        metrics::counter!("bkc_failovers_total", "category" => category.key()).increment(1);
                    }
                }
            }
        }

        let err = last_error.unwrap_or(RouterError::NoNodes(category));
        error!(category = %category, operation, error = %err, "Attempts exhausted");
        record_outcome(category, err.outcome_label());
        Err(err)
    }

    /// Mutating calls carry the identity token unless the caller set one
    fn enrich(&self, payload: Option<Value>) -> Result<Value, RouterError> {
        let mut object = match payload {
            None | Some(Value::Null) => serde_json::Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(RouterError::InvalidPayload(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };
        object
            .entry("init_data")
            .or_insert_with(|| Value::String(self.identity.init_data.clone()));
        Ok(Value::Object(object))
    }
}

fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

/// Turn a raw response into the envelope's `data` or a classified error
fn interpret(response: ApiResponse) -> Result<Value, RouterError> {
    let status = response.status;
    let success = (200..300).contains(&status);

    let envelope = match serde_json::from_str::<ApiEnvelope>(&response.body) {
        Ok(envelope) => envelope,
        Err(e) => {
            let message = if success {
                format!("Malformed response: {}", e)
            } else {
                format!("HTTP {}", status)
            };
            return Err(RouterError::Protocol { status: Some(status), message });
        }
    };

    if success && envelope.ok {
        return Ok(envelope.data.unwrap_or(Value::Null));
    }

    let message = envelope
        .error
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_ERROR.to_string());

    let missing_resource = status == 404 && message != PROFILE_DISABLED_MESSAGE;
    if success || missing_resource || DETERMINISTIC_REJECTIONS.contains(&status) {
        Err(RouterError::Domain { status, message })
    } else {
        Err(RouterError::Protocol { status: Some(status), message })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn record_outcome(category: Category, outcome: &'static str) {
    metrics::counter!("bkc_requests_total", "category" => category.key(), "outcome" => outcome).increment(1);
}
