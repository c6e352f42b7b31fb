use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by merging built-in defaults, TOML,
    /// environment variables, and JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(AppConfig::default(), "config/Config.toml")
    }

    /// Loads configuration from an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(defaults: AppConfig, toml_path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("APEX_").split("__"))
            .join(Json::file("config/Config.json"))
            .extract()?;

        Ok(config)
    }
}
