//! Production-key resolution with the lot-key short-circuit.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{KeyResolution, KeySource, NavigatorError, ProductionKey, Session, WebNavigator};

/// `[production_key]` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionKeyConfig {
    /// Anchored pattern a production key must match.
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_pattern() -> String {
    r"^\d{9}$".to_string()
}

impl Default for ProductionKeyConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
        }
    }
}

/// Resolves production keys, skipping the portal lookup whenever the lot key
/// or the input hint already has the production-key format.
#[derive(Debug, Clone)]
pub struct ProductionKeyResolver {
    pattern: Regex,
}

impl ProductionKeyResolver {
    pub fn new(pattern: &str) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn from_config(config: &ProductionKeyConfig) -> Result<Self, regex_lite::Error> {
        Self::new(&config.pattern)
    }

    /// Whether `candidate` already is a production key.
    pub fn is_production_key(&self, candidate: &str) -> bool {
        self.pattern.is_match(candidate.trim())
    }

    pub async fn resolve(
        &self,
        navigator: &dyn WebNavigator,
        session: &Session,
        item_key: &str,
        lot_key: &str,
        hint: Option<&str>,
    ) -> Result<KeyResolution, NavigatorError> {
        if self.is_production_key(lot_key) {
            debug!(item_key, lot_key, "Lot key is a production key, skipping lookup");
            return Ok(KeyResolution::Resolved {
                key: ProductionKey::new(lot_key),
                source: KeySource::LotKey,
            });
        }

        if let Some(hint) = hint.filter(|h| self.is_production_key(h)) {
            debug!(item_key, lot_key, hint, "Using production key from input");
            return Ok(KeyResolution::Resolved {
                key: ProductionKey::new(hint),
                source: KeySource::Hint,
            });
        }

        info!(item_key, lot_key, "Looking up production key");
        match navigator.lookup_production_key(session, lot_key).await? {
            Some(key) if self.is_production_key(key.as_str()) => Ok(KeyResolution::Resolved {
                key,
                source: KeySource::Lookup,
            }),
            Some(key) => {
                info!(item_key, lot_key, found = %key, "Lookup returned a malformed key");
                Ok(KeyResolution::NotFound)
            }
            None => Ok(KeyResolution::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern() {
        let resolver = ProductionKeyResolver::from_config(&ProductionKeyConfig::default()).unwrap();
        assert!(resolver.is_production_key("123456789"));
        assert!(resolver.is_production_key(" 123456789 "));
        assert!(!resolver.is_production_key("12345678"));
        assert!(!resolver.is_production_key("1234567890"));
        assert!(!resolver.is_production_key("UE4376"));
        assert!(!resolver.is_production_key(""));
    }

    #[test]
    fn test_custom_pattern() {
        let resolver = ProductionKeyResolver::new(r"^P-\d{4}$").unwrap();
        assert!(resolver.is_production_key("P-1234"));
        assert!(!resolver.is_production_key("123456789"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(ProductionKeyResolver::new("(unclosed").is_err());
    }
}
