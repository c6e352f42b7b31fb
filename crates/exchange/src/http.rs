//! Rate-limited HTTP exchange client.
//!
//! All calls carry a per-request deadline and map wire failures onto the
//! agent's transient/fatal error taxonomy so the caller's retry policy can
//! classify them. Order submission passes the idempotency key as a header;
//! the exchange deduplicates on it.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use apex_trade_core::{
    AgentError, Balance, ExchangeClient, ExchangeConfig, OrderStatusReport, SubmitOrderRequest,
    Ticker,
};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use serde_json::json;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct HttpExchange {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<DirectLimiter>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    order_id: String,
}

impl HttpExchange {
    /// Builds a client from config.
    ///
    /// # Errors
    /// Returns `AgentError::Config` when the quota or HTTP client cannot be
    /// constructed.
    pub fn new(config: &ExchangeConfig) -> Result<Self, AgentError> {
        let per_second = NonZeroU32::new(config.requests_per_second.max(1))
            .ok_or_else(|| AgentError::Config("requests_per_second must be positive".into()))?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            rate_limiter,
        })
    }

    fn map_send_error(e: &reqwest::Error) -> AgentError {
        if e.is_timeout() {
            AgentError::Timeout(e.to_string())
        } else {
            AgentError::Network(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(AgentError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, AgentError> {
        self.rate_limiter.until_ready().await;
        let response = self
            .http_client
            .get(format!("{}{path}", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&e))?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| AgentError::Api {
                status: 200,
                message: format!("unparseable body: {e}"),
            })
    }
}

#[async_trait]
impl ExchangeClient for HttpExchange {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, AgentError> {
        self.get_json(&format!("/api/v3/ticker?symbol={symbol}")).await
    }

    async fn submit_order(&self, request: &SubmitOrderRequest) -> Result<String, AgentError> {
        self.rate_limiter.until_ready().await;

        let body = json!({
            "symbol": request.symbol,
            "side": request.side,
            "type": request.order_type,
            "amount": request.amount,
        });

        let response = self
            .http_client
            .post(format!("{}/api/v3/order", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&e))?;

        let status = response.status();
        // Client-side rejections are terminal for the order, not transient.
        if status.is_client_error() && status.as_u16() != 429 {
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::OrderRejected(message));
        }

        let response = Self::check_status(response).await?;
        let parsed: SubmitResponse = response.json().await.map_err(|e| AgentError::Api {
            status: 200,
            message: format!("unparseable body: {e}"),
        })?;
        Ok(parsed.order_id)
    }

    async fn get_order_status(
        &self,
        exchange_order_id: &str,
    ) -> Result<OrderStatusReport, AgentError> {
        self.get_json(&format!("/api/v3/order/{exchange_order_id}")).await
    }

    async fn get_balance(&self) -> Result<Balance, AgentError> {
        self.get_json("/api/v3/balance").await
    }
}
