use crate::config::TradingConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the trading configuration by merging TOML, environment
    /// variables, and JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<TradingConfig> {
        Self::load_from("config/Optionbot.toml")
    }

    /// Loads the trading configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<TradingConfig> {
        let config: TradingConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("OPTIONBOT_"))
            .join(Json::file("config/Optionbot.json"))
            .extract()?;

        Ok(config)
    }
}
