use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::desktop::DesktopConfig;
use crate::navigator::{BrowserConfig, LocatorConfig, PortalConfig, ProductionKeyConfig};
use crate::orchestrator::OrchestratorConfig;
use crate::output::OutputConfig;
use crate::polling::StageBudgets;
use crate::verifier::VerifierConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub locators: LocatorConfig,
    #[serde(default)]
    pub stages: StageBudgets,
    #[serde(default)]
    pub desktop: DesktopConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub production_key: ProductionKeyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Verification ledger configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    /// Production-number export written after each run.
    #[serde(default)]
    pub csv_export_path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            csv_export_path: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("labelfetch.db")
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Prometheus textfile written at the end of a run.
    #[serde(default)]
    pub textfile_path: Option<PathBuf>,
}

/// Sanitized config for logs and the ledger (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub portal: SanitizedPortalConfig,
    pub browser: BrowserConfig,
    pub locators: LocatorConfig,
    pub stages: StageBudgets,
    pub desktop: DesktopConfig,
    pub verifier: VerifierConfig,
    pub production_key: ProductionKeyConfig,
    pub output: OutputConfig,
    pub orchestrator: OrchestratorConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Sanitized portal config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPortalConfig {
    pub login_url: String,
    pub records_url: String,
    pub label_search_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password_configured: bool,
    pub reachability_check: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            portal: SanitizedPortalConfig {
                login_url: config.portal.login_url.clone(),
                records_url: config.portal.records_url.clone(),
                label_search_url: config.portal.label_search_url.clone(),
                username: config.portal.username.clone(),
                password_configured: config
                    .portal
                    .password
                    .as_deref()
                    .is_some_and(|p| !p.is_empty()),
                reachability_check: config.portal.reachability_check,
            },
            browser: config.browser.clone(),
            locators: config.locators.clone(),
            stages: config.stages.clone(),
            desktop: config.desktop.clone(),
            verifier: config.verifier.clone(),
            production_key: config.production_key.clone(),
            output: config.output.clone(),
            orchestrator: config.orchestrator.clone(),
            ledger: config.ledger.clone(),
            logging: config.logging.clone(),
            metrics: config.metrics.clone(),
        }
    }
}

impl SanitizedConfig {
    /// Short sha256 of the sanitized config, recorded with every run.
    pub fn hash(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&json);
        digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[portal]
login_url = "https://labels.example.com/login"
records_url = "https://labels.example.com/records"
label_search_url = "https://labels.example.com/search"
"#;

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.portal.login_url, "https://labels.example.com/login");
        assert!(config.portal.reachability_check);
        assert_eq!(config.ledger.database_path, PathBuf::from("labelfetch.db"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.metrics.textfile_path.is_none());
        assert_eq!(config.orchestrator.max_candidates_per_item, 20);
    }

    #[test]
    fn test_deserialize_missing_portal_fails() {
        let result: Result<Config, _> = toml::from_str("[logging]\nlevel = \"debug\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_sections() {
        let toml = format!(
            "{}\n{}",
            MINIMAL,
            r#"
[stages.preview]
timeout_ms = 45000
poll_interval_ms = 250
retries = 0

[verifier]
regulatory_marker = "EPA Reg"
ocr_cleanup = true

[ledger]
database_path = "/var/lib/labelfetch/ledger.db"
csv_export_path = "out/production_numbers.csv"

[logging]
level = "debug"
format = "json"
"#
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.stages.preview.timeout_ms, 45_000);
        assert_eq!(config.stages.close.timeout_ms, 3_000);
        assert!(config.verifier.ocr_cleanup);
        assert_eq!(
            config.ledger.csv_export_path,
            Some(PathBuf::from("out/production_numbers.csv"))
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_sanitized_config_hides_password() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.portal.username = Some("ops".to_string());
        config.portal.password = Some("hunter2".to_string());

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.portal.password_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"username\":\"ops\""));
    }

    #[test]
    fn test_hash_is_stable_and_ignores_password() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.portal.password = Some("first".to_string());
        let first = SanitizedConfig::from(&config).hash();
        config.portal.password = Some("second".to_string());
        let second = SanitizedConfig::from(&config).hash();

        assert_eq!(first.len(), 12);
        assert_eq!(first, second);

        config.verifier.regulatory_marker = "FIFRA".to_string();
        assert_ne!(SanitizedConfig::from(&config).hash(), first);
    }
}
