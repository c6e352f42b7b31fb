//! Runtime-tunable flags with layered resolution: DB override, then
//! environment variable, then built-in default.

use std::sync::Arc;

use crate::traits::ConfigStore;

/// Key controlling the global trading kill switch checked by the risk gate.
pub const TRADING_ENABLED_KEY: &str = "trading_enabled";

#[derive(Clone)]
pub struct RuntimeFlags {
    store: Arc<dyn ConfigStore>,
}

impl RuntimeFlags {
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Resolves a boolean flag. Store read failures fall through to the
    /// environment and default rather than failing the caller.
    pub async fn flag(&self, key: &str, default: bool) -> bool {
        match self.store.get(key).await {
            Ok(Some(value)) => return parse_bool(&value).unwrap_or(default),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key, error = %e, "config store read failed, using fallback");
            }
        }

        let env_key = format!("APEX_{}", key.to_uppercase());
        if let Ok(value) = std::env::var(&env_key) {
            if let Some(parsed) = parse_bool(&value) {
                return parsed;
            }
        }

        default
    }

    pub async fn trading_enabled(&self) -> bool {
        self.flag(TRADING_ENABLED_KEY, true).await
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
