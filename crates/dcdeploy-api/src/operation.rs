use std::thread;
use std::time::{Duration, Instant};

use dcdeploy_engine::{ApiError, ApiResult};
use serde::Deserialize;

use crate::decode::{RpcStatus, decode_operation_error};

const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// `google.longrunning.Operation`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<RpcStatus>,
}

impl Operation {
    /// `Ok(true)` once finished successfully, `Err` once finished with an error.
    pub fn finished(&self) -> ApiResult<bool> {
        match &self.error {
            Some(error) => Err(decode_operation_error(&self.name, error)),
            None => Ok(self.done),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SqlOperationError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SqlOperationErrors {
    #[serde(default)]
    errors: Vec<SqlOperationError>,
}

/// Cloud SQL admin operation; reports `status` instead of `done`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SqlOperation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<SqlOperationErrors>,
}

impl SqlOperation {
    pub fn finished(&self) -> ApiResult<bool> {
        let errors = self
            .error
            .as_ref()
            .map(|error| error.errors.as_slice())
            .unwrap_or_default();
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|error| format!("{}: {}", error.code, error.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ApiError::OperationFailed {
                operation: self.name.clone(),
                message,
            });
        }
        Ok(self.status == "DONE")
    }
}

/// Polls an operation with exponential backoff until it finishes or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Poller {
    /// Call `check` until it reports completion.
    ///
    /// # Errors
    ///
    /// Returns the first error from `check`, or [`ApiError::OperationTimeout`].
    pub fn wait<F>(&self, operation: &str, mut check: F) -> ApiResult<()>
    where
        F: FnMut() -> ApiResult<bool>,
    {
        let started = Instant::now();
        let mut interval = self.interval;
        loop {
            if check()? {
                tracing::debug!(operation, elapsed = ?started.elapsed(), "operation finished");
                return Ok(());
            }
            if started.elapsed() >= self.timeout {
                return Err(ApiError::OperationTimeout {
                    operation: operation.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            thread::sleep(interval);
            interval = (interval * 2).min(MAX_POLL_INTERVAL);
        }
    }
}
