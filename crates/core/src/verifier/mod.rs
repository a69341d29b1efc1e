//! Content verification of rendered label text.

mod cleanup;

pub use cleanup::clean_extracted_text;

use serde::{Deserialize, Serialize};

/// Configuration for [`ContentVerifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Literal that every compliant label carries.
    #[serde(default = "default_marker")]
    pub regulatory_marker: String,
    /// Fold dashes and common OCR digit confusions before matching.
    #[serde(default)]
    pub ocr_cleanup: bool,
}

fn default_marker() -> String {
    "EPA".to_string()
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            regulatory_marker: default_marker(),
            ocr_cleanup: false,
        }
    }
}

/// Which required tokens were present in a rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub item_found: bool,
    pub lot_found: bool,
    pub marker_found: bool,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.item_found && self.lot_found && self.marker_found
    }

    /// Human-readable list of missing tokens, empty when the report passed.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.item_found {
            missing.push("item");
        }
        if !self.lot_found {
            missing.push("lot");
        }
        if !self.marker_found {
            missing.push("regulatory marker");
        }
        missing
    }
}

/// Checks rendered text for the item key, the lot key and the regulatory marker.
///
/// Matching is case-insensitive substring search on whitespace-normalized
/// text. An empty expected token never matches.
#[derive(Debug, Clone)]
pub struct ContentVerifier {
    marker: String,
    cleanup: bool,
}

impl Default for ContentVerifier {
    fn default() -> Self {
        Self::from_config(&VerifierConfig::default())
    }
}

impl ContentVerifier {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            cleanup: false,
        }
    }

    pub fn from_config(config: &VerifierConfig) -> Self {
        Self {
            marker: config.regulatory_marker.clone(),
            cleanup: config.ocr_cleanup,
        }
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn verify(&self, rendered_text: &str, item_key: &str, lot_key: &str) -> bool {
        self.inspect(rendered_text, item_key, lot_key).passed()
    }

    pub fn inspect(&self, rendered_text: &str, item_key: &str, lot_key: &str) -> VerificationReport {
        let text = if self.cleanup {
            normalize(&clean_extracted_text(rendered_text))
        } else {
            normalize(rendered_text)
        };

        VerificationReport {
            item_found: contains_token(&text, item_key),
            lot_found: contains_token(&text, lot_key),
            marker_found: contains_token(&text, &self.marker),
        }
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn contains_token(haystack: &str, token: &str) -> bool {
    let needle = normalize(token);
    !needle.is_empty() && haystack.contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = "Item: NP6MSTGQP1 Lot: ue4376 EPA-12345-6";

    #[test]
    fn test_case_insensitive_match() {
        let verifier = ContentVerifier::default();
        assert!(verifier.verify(LABEL, "NP6MSTGQP1", "UE4376"));
    }

    #[test]
    fn test_missing_lot_fails() {
        let verifier = ContentVerifier::default();
        let report = verifier.inspect("Item: NP6MSTGQP1 EPA-12345-6", "NP6MSTGQP1", "UE4376");
        assert!(!report.passed());
        assert!(report.item_found);
        assert!(!report.lot_found);
        assert!(report.marker_found);
        assert_eq!(report.missing(), vec!["lot"]);
    }

    #[test]
    fn test_missing_marker_fails() {
        let verifier = ContentVerifier::default();
        assert!(!verifier.verify("Item: NP6MSTGQP1 Lot: UE4376", "NP6MSTGQP1", "UE4376"));
    }

    #[test]
    fn test_order_independent() {
        let verifier = ContentVerifier::default();
        let shuffled = "EPA Reg. 100-1 / lot UE4376 / NP6MSTGQP1";
        assert!(verifier.verify(shuffled, "NP6MSTGQP1", "UE4376"));
    }

    #[test]
    fn test_idempotent() {
        let verifier = ContentVerifier::default();
        let first = verifier.inspect(LABEL, "NP6MSTGQP1", "UE4376");
        let second = verifier.inspect(LABEL, "NP6MSTGQP1", "UE4376");
        assert_eq!(first, second);
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let verifier = ContentVerifier::default();
        let text = "PRODUCT\n\tCODE   AB 12\r\nlot X1  EPA";
        assert!(verifier.verify(text, "code ab 12", "X1"));
        assert!(verifier.verify(text, "  code\nab  12 ", "x1"));
    }

    #[test]
    fn test_empty_tokens_never_match() {
        let verifier = ContentVerifier::default();
        assert!(!verifier.verify(LABEL, "", "UE4376"));
        assert!(!verifier.verify(LABEL, "NP6MSTGQP1", "   "));
        assert!(!ContentVerifier::new("").verify(LABEL, "NP6MSTGQP1", "UE4376"));
    }

    #[test]
    fn test_custom_marker() {
        let verifier = ContentVerifier::new("PCP");
        assert!(!verifier.verify(LABEL, "NP6MSTGQP1", "UE4376"));
        assert!(verifier.verify("pcp 123 NP6MSTGQP1 UE4376", "NP6MSTGQP1", "UE4376"));
    }

    #[test]
    fn test_cleanup_recovers_ocr_confusions() {
        let text = "Item: NP6MSTGQP1 Lot: 2l0O45 EPA\u{2013}Reg";
        let plain = ContentVerifier::default();
        let cleaned = ContentVerifier::default().with_cleanup(true);
        assert!(!plain.verify(text, "NP6MSTGQP1", "210045"));
        assert!(cleaned.verify(text, "NP6MSTGQP1", "210045"));
    }
}
