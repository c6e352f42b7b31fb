//! Ordered provider fallback.
//!
//! Providers are tried in priority order; each gets the full retry budget
//! for transient failures before the chain advances. Only when every
//! provider is exhausted does the caller see `SignalUnavailable`.

use std::sync::Arc;

use apex_trade_core::{
    with_retry, AgentError, InferenceProvider, InferenceRequest, ModelVerdict, RetryPolicy,
};

pub struct ProviderChain {
    providers: Vec<Arc<dyn InferenceProvider>>,
    retry: RetryPolicy,
}

impl ProviderChain {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn InferenceProvider>>, retry: RetryPolicy) -> Self {
        Self { providers, retry }
    }

    /// Asks each provider in order until one returns a verdict.
    ///
    /// Returns the verdict and the answering provider's name.
    ///
    /// # Errors
    /// `AgentError::SignalUnavailable` once every provider has failed.
    pub async fn infer(
        &self,
        request: &InferenceRequest,
    ) -> Result<(ModelVerdict, String), AgentError> {
        let mut last_error: Option<AgentError> = None;

        for provider in &self.providers {
            let name = provider.name().to_string();
            let result = with_retry(self.retry, &name, || provider.infer(request)).await;

            match result {
                Ok(verdict) => {
                    tracing::debug!(provider = %name, "inference succeeded");
                    return Ok((verdict, name));
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "provider failed, advancing");
                    last_error = Some(e);
                }
            }
        }

        Err(AgentError::SignalUnavailable(
            last_error.map_or_else(|| "no providers configured".to_string(), |e| e.to_string()),
        ))
    }
}
