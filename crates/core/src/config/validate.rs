use super::{types::Config, ConfigError};
use crate::navigator::ProductionKeyResolver;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration
/// Currently validates:
/// - Portal URLs are set
/// - Every stage budget has a non-zero poll interval no longer than its timeout
/// - Window patterns constrain something, control lists are non-empty
/// - The production key pattern compiles
/// - The regulatory marker and output extension are set
/// - Search result and candidate limits are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let portal = &config.portal;
    for (name, url) in [
        ("portal.login_url", &portal.login_url),
        ("portal.records_url", &portal.records_url),
        ("portal.label_search_url", &portal.label_search_url),
    ] {
        if url.trim().is_empty() {
            return Err(invalid(format!("{} cannot be empty", name)));
        }
    }

    for (name, budget) in config.stages.named() {
        if budget.poll_interval_ms == 0 {
            return Err(invalid(format!(
                "stages.{}.poll_interval_ms cannot be 0",
                name
            )));
        }
        if budget.poll_interval_ms > budget.timeout_ms {
            return Err(invalid(format!(
                "stages.{}.poll_interval_ms ({}) exceeds timeout_ms ({})",
                name, budget.poll_interval_ms, budget.timeout_ms
            )));
        }
    }

    let desktop = &config.desktop;
    for (name, pattern) in [
        ("desktop.preview_window", &desktop.preview_window),
        ("desktop.print_dialog", &desktop.print_dialog),
        ("desktop.save_dialog", &desktop.save_dialog),
    ] {
        if pattern.is_unconstrained() {
            return Err(invalid(format!("{} would match any window", name)));
        }
    }
    for (name, controls) in [
        ("desktop.print_controls", &desktop.print_controls),
        ("desktop.confirm_controls", &desktop.confirm_controls),
        ("desktop.save_controls", &desktop.save_controls),
    ] {
        if controls.iter().all(|c| c.trim().is_empty()) {
            return Err(invalid(format!("{} cannot be empty", name)));
        }
    }
    if desktop.print_target.trim().is_empty() {
        return Err(invalid("desktop.print_target cannot be empty"));
    }

    ProductionKeyResolver::from_config(&config.production_key)
        .map_err(|e| invalid(format!("production_key.pattern is invalid: {}", e)))?;

    if config.verifier.regulatory_marker.trim().is_empty() {
        return Err(invalid("verifier.regulatory_marker cannot be empty"));
    }
    if config.output.file_extension.trim().is_empty() {
        return Err(invalid("output.file_extension cannot be empty"));
    }
    if config.locators.max_result_rows == 0 {
        return Err(invalid("locators.max_result_rows cannot be 0"));
    }
    if config.orchestrator.max_candidates_per_item == 0 {
        return Err(invalid("orchestrator.max_candidates_per_item cannot be 0"));
    }
    if config.orchestrator.ledger_buffer == 0 {
        return Err(invalid("orchestrator.ledger_buffer cannot be 0"));
    }

    Ok(())
}
