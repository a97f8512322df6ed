use bkc_router::RouterError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The call succeeded but `data` did not have the expected shape
    #[error("Unexpected {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl ApiError {
    /// Server-side rejection of a well-formed request
    pub fn is_rejection(&self) -> bool {
        matches!(self, ApiError::Router(RouterError::Domain { .. }))
    }
}
