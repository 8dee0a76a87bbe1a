use thiserror::Error;

/// Error kinds the core distinguishes (spec.md §7). Names match the spec's
/// illustrative names so logs and tests can refer to them directly.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no observations collected for any symbol")]
    NoData,

    #[error("aggregator input invariant violation: mixed symbols in one call")]
    MixedSymbols,

    #[error("batch submission attempted with zero prices")]
    EmptyBatch,

    #[error("http error from source {source_name}: {kind}")]
    Http {
        source_name: String,
        kind: HttpErrorKind,
    },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("on-chain transaction faulted: {0}")]
    TxFault(String),

    #[error("signer credentials missing or malformed: {0}")]
    Credentials(String),

    #[error("bulkhead saturated for source {0}")]
    BulkheadRejected(String),

    #[error("cycle cancelled")]
    Cancelled,
}

/// Distinguishes transient vs permanent HTTP failures, driving retry and
/// circuit-breaker decisions in [`crate::resilient_http::ResilientHttp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// Connection refused/reset, DNS failure, or similar — always retryable.
    Connection,
    /// 5xx, 408, or 429 — retryable under the recovery policy.
    Transient(u16),
    /// Any other 4xx — not retried.
    Permanent(u16),
    /// Per-attempt timeout elapsed.
    Timeout,
    /// Response body could not be parsed into the expected shape.
    Unparseable,
}

impl std::fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpErrorKind::Connection => write!(f, "connection failure"),
            HttpErrorKind::Transient(code) => write!(f, "transient status {code}"),
            HttpErrorKind::Permanent(code) => write!(f, "permanent status {code}"),
            HttpErrorKind::Timeout => write!(f, "timeout"),
            HttpErrorKind::Unparseable => write!(f, "unparseable payload"),
        }
    }
}

impl HttpErrorKind {
    /// Whether `ResilientHttp`'s retry layer should re-attempt the request.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            HttpErrorKind::Connection | HttpErrorKind::Transient(_) | HttpErrorKind::Timeout
        )
    }

    /// Classifies an HTTP status code per spec §4.3: 5xx, 408, and 429 are
    /// transient; any other non-2xx is permanent.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        if status >= 500 || status == 408 || status == 429 {
            HttpErrorKind::Transient(status)
        } else {
            HttpErrorKind::Permanent(status)
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
