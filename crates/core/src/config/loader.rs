use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

const ENV_PREFIX: &str = "LABELFETCH_";

/// Load configuration from file with environment variable overrides.
///
/// Nested keys use a double underscore, e.g.
/// `LABELFETCH_STAGES__PREVIEW__TIMEOUT_MS=45000`; a stage overridden this
/// way needs all three of its fields. Credentials may also be
/// given as `LABELFETCH_USERNAME` and `LABELFETCH_PASSWORD`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["USERNAME", "PASSWORD"])
                .split("__"),
        )
        .merge(
            Env::prefixed(ENV_PREFIX)
                .only(&["USERNAME", "PASSWORD"])
                .map(|key| format!("portal.{}", key.as_str().to_lowercase()).into()),
        )
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
