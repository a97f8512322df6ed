//! In-process backend for aggregator tests

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use bkc_common::AccountState;
use bkc_router::RouterError;
use crate::backend::TapBackend;
use crate::error::TapError;

pub(crate) struct FakeBackend {
    submitted: Mutex<Vec<u64>>,
    fetches: Mutex<usize>,
    state: Mutex<AccountState>,
    submit_error: Mutex<Option<RouterError>>,
    fetch_error: Mutex<Option<RouterError>>,
    submit_delay: Mutex<Duration>,
}

impl FakeBackend {
    pub(crate) fn new(state: AccountState) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            fetches: Mutex::new(0),
            state: Mutex::new(state),
            submit_error: Mutex::new(None),
            fetch_error: Mutex::new(None),
            submit_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Every completed submission, failed ones included
    pub(crate) fn submitted(&self) -> Vec<u64> {
        self.submitted.lock().clone()
    }

    pub(crate) fn fetches(&self) -> usize {
        *self.fetches.lock()
    }

    pub(crate) fn set_state(&self, state: AccountState) {
        *self.state.lock() = state;
    }

    pub(crate) fn fail_submits(&self, error: RouterError) {
        *self.submit_error.lock() = Some(error);
    }

    pub(crate) fn fail_fetches(&self, error: RouterError) {
        *self.fetch_error.lock() = Some(error);
    }

    pub(crate) fn slow_submits(&self, delay: Duration) {
        *self.submit_delay.lock() = delay;
    }

    pub(crate) fn recover(&self) {
        *self.submit_error.lock() = None;
        *self.fetch_error.lock() = None;
    }
}

#[async_trait]
impl TapBackend for FakeBackend {
    async fn submit_taps(&self, count: u64) -> Result<(), TapError> {
        let delay = *self.submit_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.submitted.lock().push(count);
        match self.submit_error.lock().clone() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    async fn fetch_state(&self) -> Result<AccountState, TapError> {
        *self.fetches.lock() += 1;
        match self.fetch_error.lock().clone() {
            Some(error) => Err(error.into()),
            None => Ok(self.state.lock().clone()),
        }
    }
}
