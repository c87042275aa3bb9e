//! Error taxonomy.
//!
//! [`CloudError`] is the failure of a single cloud call and knows whether it is
//! worth retrying. [`RetryError`] is what is left after the retry policy gave up.
//! [`Error`] is reserved for failures that concern the run as a whole.

use std::path::PathBuf;
use thiserror::Error;

/// Retry classification of a failed cloud call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Timeouts, throttling, server side errors, dropped connections.
    Transient,
    /// Bad requests, missing permissions, missing resources, validation errors.
    Permanent,
}

/// Failure of one call against the cloud API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("{operation} returned HTTP {status} ({code}): {message}")]
    Http {
        operation: String,
        status: u16,
        code: String,
        message: String,
    },
    #[error("{operation} timed out: {message}")]
    Timeout { operation: String, message: String },
    #[error("{operation} connection failed: {message}")]
    Connection { operation: String, message: String },
    #[error("{operation} returned an unreadable response: {message}")]
    Decode { operation: String, message: String },
    #[error("{operation} rejected: {message}")]
    Validation { operation: String, message: String },
    #[error("{operation} provisioning ended in state {state}")]
    Provisioning { operation: String, state: String },
    #[error("could not acquire access token: {0}")]
    Auth(String),
}

impl CloudError {
    /// Shorthand for an HTTP failure without an ARM error code.
    pub fn http(operation: &str, status: u16, message: &str) -> Self {
        CloudError::Http {
            operation: operation.to_string(),
            status,
            code: status_code_name(status).to_string(),
            message: message.to_string(),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            // 408 request timeout and 409 AnotherOperationInProgress clear up on their own
            CloudError::Http { status, .. } => match status {
                408 | 409 | 429 => FailureClass::Transient,
                500..=599 => FailureClass::Transient,
                _ => FailureClass::Permanent,
            },
            CloudError::Timeout { .. } | CloudError::Connection { .. } => FailureClass::Transient,
            CloudError::Decode { .. }
            | CloudError::Validation { .. }
            | CloudError::Provisioning { .. }
            | CloudError::Auth(_) => FailureClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }

    /// True for HTTP 404, used where "gone" is an acceptable answer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::Http { status: 404, .. })
    }
}

fn status_code_name(status: u16) -> &'static str {
    match status {
        400 => "BadRequest",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "NotFound",
        409 => "Conflict",
        429 => "TooManyRequests",
        500 => "InternalServerError",
        502 => "BadGateway",
        503 => "ServiceUnavailable",
        504 => "GatewayTimeout",
        _ => "Unknown",
    }
}

/// Final failure of an operation run under the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{last} [attempts={attempts}]")]
pub struct RetryError {
    /// Attempts made, including the last failed one.
    pub attempts: u32,
    /// Set when a transient failure used up every attempt.
    pub exhausted: bool,
    pub last: CloudError,
}

impl RetryError {
    /// An exhausted transient failure is escalated as a critical failure.
    pub fn is_critical(&self) -> bool {
        self.exhausted
    }
}

/// Failures that abort or degrade the run as a whole.
#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("none of the hub subscriptions {0:?} is visible to the credential")]
    NoHubSubscriptions(Vec<String>),
    #[error("discovery failed for subscription {subscription}: {source}")]
    Discovery {
        subscription: String,
        source: CloudError,
    },
    #[error("cannot read region list {}: {source}", .path.display())]
    RegionFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("report generation failed: {0}")]
    ReportGeneration(String),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error(transparent)]
    Cloud(#[from] CloudError),
}
