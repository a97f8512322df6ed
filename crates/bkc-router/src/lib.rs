//! BKC Request Router
//!
//! Routes every outbound API call to one of several backend replica pools:
//! - Classifier: maps an operation name to its routing category
//! - PoolRegistry: per-category deduplicated node lists, built once at startup
//! - AffinityStore: session-scoped record of the sticky node per category
//! - NodeSelector: deterministic or random initial pick, round-robin rotation
//! - Transport: the wire seam, with a reqwest implementation
//! - RequestExecutor: one logical call with bounded failover across nodes

pub mod error;
pub mod classifier;
pub mod registry;
pub mod affinity;
pub mod selector;
pub mod transport;
pub mod executor;

pub use error::{RouterError, DEFAULT_API_ERROR};
pub use classifier::classify;
pub use registry::{PoolRegistry, LOCAL_FALLBACK_ADDRESS};
pub use affinity::{affinity_key, AffinityStore, FileAffinityStore, SessionAffinityStore};
pub use selector::NodeSelector;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
pub use executor::{RequestExecutor, MAX_ATTEMPTS};

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, RouterError>;
