//! OpenAI-compatible chat-completions inference provider.
//!
//! Renders the structured request into a pinned system prompt plus a JSON
//! market summary, and parses the model's reply strictly as a verdict.
//! Anything that does not parse is a data error, never retried.

use std::time::Duration;

use apex_trade_core::{
    AgentError, AiProviderConfig, InferenceProvider, InferenceRequest, ModelVerdict,
};
use async_trait::async_trait;
use serde_json::json;

const SYSTEM_PROMPT: &str = "You are a disciplined crypto trading analyst. \
Respond with a single JSON object: \
{\"direction\": \"BUY\"|\"HOLD\"|\"SELL\", \"confidence\": 0.0-1.0, \"rationale\": \"...\"}. \
No other text.";

pub struct OpenAiProvider {
    name: String,
    api_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Builds a provider from config. The HTTP client carries the request
    /// deadline so a stuck connection cannot outlive the budget.
    ///
    /// # Errors
    /// Returns `AgentError::Config` if the HTTP client cannot be built.
    pub fn new(config: &AiProviderConfig, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("http client: {e}")))?;

        Ok(Self {
            name: config.name.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }

    fn render_user_message(request: &InferenceRequest) -> String {
        let payload = json!({
            "symbol": request.symbol,
            "current_price": request.current_price,
            "position": request.position,
            "confluence_score": request.confluence_score,
            "technical_summary": request.technical_summary,
        });
        format!("Market state:\n{payload}\nDecide the next action.")
    }
}

#[async_trait]
impl InferenceProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<ModelVerdict, AgentError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": Self::render_user_message(request)},
            ],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(format!("{}: {e}", self.name))
                } else {
                    AgentError::Network(format!("{}: {e}", self.name))
                }
            })?;

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

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(format!("{}: {e}", self.name)))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                AgentError::MalformedResponse(format!("{}: missing message content", self.name))
            })?;

        parse_verdict(content)
    }
}

/// Parses the model reply into a verdict.
///
/// Tolerates fenced code blocks and surrounding prose by extracting the
/// outermost JSON object; everything else is malformed.
pub fn parse_verdict(content: &str) -> Result<ModelVerdict, AgentError> {
    let start = content
        .find('{')
        .ok_or_else(|| AgentError::MalformedResponse("no JSON object in reply".to_string()))?;
    let end = content
        .rfind('}')
        .ok_or_else(|| AgentError::MalformedResponse("unterminated JSON object".to_string()))?;
    if end < start {
        return Err(AgentError::MalformedResponse(
            "unterminated JSON object".to_string(),
        ));
    }

    let verdict: ModelVerdict = serde_json::from_str(&content[start..=end])
        .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

    if !verdict.confidence.is_finite() {
        return Err(AgentError::MalformedResponse(
            "confidence is not a finite number".to_string(),
        ));
    }

    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_trade_core::SignalDirection;

    #[test]
    fn parses_bare_json_verdict() {
        let verdict =
            parse_verdict(r#"{"direction": "BUY", "confidence": 0.82, "rationale": "uptrend"}"#)
                .unwrap();
        assert_eq!(verdict.direction, SignalDirection::Buy);
        assert!((verdict.confidence - 0.82).abs() < 1e-12);
    }

    #[test]
    fn parses_fenced_json_verdict() {
        let content = "Here you go:\n```json\n{\"direction\": \"SELL\", \"confidence\": 0.6, \"rationale\": \"breakdown\"}\n```";
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.direction, SignalDirection::Sell);
    }

    #[test]
    fn prose_without_json_is_malformed() {
        assert!(matches!(
            parse_verdict("I think you should buy."),
            Err(AgentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn unknown_direction_is_malformed() {
        let content = r#"{"direction": "SHORT", "confidence": 0.6, "rationale": "x"}"#;
        assert!(matches!(
            parse_verdict(content),
            Err(AgentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_finite_confidence_is_malformed() {
        // JSON has no NaN literal, but a string sneaks past serde only if
        // typed loosely; exercise the finite check via a huge exponent.
        let content = r#"{"direction": "BUY", "confidence": 1e309, "rationale": "x"}"#;
        assert!(parse_verdict(content).is_err());
    }
}
