//! Typed errors for the trading agent.
//!
//! The retry helper keys off `is_transient()`: only network-shaped failures
//! are retried, everything else surfaces immediately.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Not enough samples in any timeframe to compute indicators.
    #[error("insufficient market data: {0}")]
    InsufficientData(String),

    /// Every configured inference provider failed; the run becomes a no-op.
    #[error("no signal available: {0}")]
    SignalUnavailable(String),

    /// The model replied with something that does not parse as a verdict.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// Balance check failed before any exchange call was made.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Exchange rejected the order outright.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Rate limit hit on an external API.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Network-level failure talking to an external API.
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its deadline.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Non-2xx API response.
    #[error("api error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Invalid or missing configuration. Raised once at startup, never
    /// retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Attempted transition out of a terminal order state.
    #[error("order {id} is in a terminal state and cannot transition")]
    TerminalOrder { id: Uuid },

    #[error("storage error: {0}")]
    Storage(String),
}

impl AgentError {
    /// True for failures worth retrying with backoff: timeouts, rate limits,
    /// network errors, and server-side (5xx) API errors.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(AgentError::Network("reset".into()).is_transient());
        assert!(AgentError::Timeout("30s".into()).is_transient());
        assert!(AgentError::RateLimited {
            retry_after_secs: Some(1)
        }
        .is_transient());
        assert!(AgentError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
    }

    #[test]
    fn client_and_domain_errors_are_not_transient() {
        assert!(!AgentError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!AgentError::OrderRejected("min size".into()).is_transient());
        assert!(!AgentError::Config("missing key".into()).is_transient());
        assert!(!AgentError::MalformedResponse("not json".into()).is_transient());
    }
}
