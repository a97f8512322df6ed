use bkc_router::RouterError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TapError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("Unexpected account state: {0}")]
    Decode(String),
}
