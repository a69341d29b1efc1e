//! Per-step budgets, configured under `[stages.<name>]`.
//!
//! Every wait runs once per attempt its budget allows: a timed-out wait is
//! started over until `retries` is spent.

use serde::{Deserialize, Serialize};

use super::StageBudget;

/// Timing budgets for every bounded wait in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBudgets {
    /// Document ready and no pending background requests.
    #[serde(default = "default_page_ready")]
    pub page_ready: StageBudget,
    /// Element presence; `retries` bounds re-resolution after a stale or
    /// timed-out lookup.
    #[serde(default = "default_element")]
    pub element: StageBudget,
    /// Production-key record lookup.
    #[serde(default = "default_lookup")]
    pub lookup: StageBudget,
    /// Label search and result enumeration.
    #[serde(default = "default_search")]
    pub search: StageBudget,
    /// New rendering window appearing after a preview is triggered. Each
    /// retry triggers the preview again.
    #[serde(default = "default_preview")]
    pub preview: StageBudget,
    /// Rendered text becoming readable.
    #[serde(default = "default_render")]
    pub render: StageBudget,
    /// Named control lookup and invocation.
    #[serde(default = "default_control")]
    pub control: StageBudget,
    /// Target selection dialog.
    #[serde(default = "default_target_selection")]
    pub target_selection: StageBudget,
    /// File-save dialog.
    #[serde(default = "default_save_dialog")]
    pub save_dialog: StageBudget,
    /// Saved file showing up on disk.
    #[serde(default = "default_file_appear")]
    pub file_appear: StageBudget,
    /// Window closing. Each retry sends the close request again.
    #[serde(default = "default_close")]
    pub close: StageBudget,
}

fn default_page_ready() -> StageBudget {
    StageBudget::new(30_000, 250, 1)
}

fn default_element() -> StageBudget {
    StageBudget::new(10_000, 250, 3)
}

fn default_lookup() -> StageBudget {
    StageBudget::new(15_000, 500, 1)
}

fn default_search() -> StageBudget {
    StageBudget::new(20_000, 500, 1)
}

fn default_preview() -> StageBudget {
    StageBudget::new(30_000, 500, 0)
}

fn default_render() -> StageBudget {
    StageBudget::new(10_000, 500, 0)
}

fn default_control() -> StageBudget {
    StageBudget::new(5_000, 250, 2)
}

fn default_target_selection() -> StageBudget {
    StageBudget::new(10_000, 250, 2)
}

fn default_save_dialog() -> StageBudget {
    StageBudget::new(30_000, 500, 0)
}

fn default_file_appear() -> StageBudget {
    StageBudget::new(15_000, 250, 0)
}

fn default_close() -> StageBudget {
    StageBudget::new(3_000, 250, 0)
}

impl Default for StageBudgets {
    fn default() -> Self {
        Self {
            page_ready: default_page_ready(),
            element: default_element(),
            lookup: default_lookup(),
            search: default_search(),
            preview: default_preview(),
            render: default_render(),
            control: default_control(),
            target_selection: default_target_selection(),
            save_dialog: default_save_dialog(),
            file_appear: default_file_appear(),
            close: default_close(),
        }
    }
}

impl StageBudgets {
    /// Every budget paired with its configuration key.
    pub fn named(&self) -> [(&'static str, &StageBudget); 11] {
        [
            ("page_ready", &self.page_ready),
            ("element", &self.element),
            ("lookup", &self.lookup),
            ("search", &self.search),
            ("preview", &self.preview),
            ("render", &self.render),
            ("control", &self.control),
            ("target_selection", &self.target_selection),
            ("save_dialog", &self.save_dialog),
            ("file_appear", &self.file_appear),
            ("close", &self.close),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let budgets = StageBudgets::default();
        assert_eq!(budgets.preview.timeout_ms, 30_000);
        assert_eq!(budgets.element.retries, 3);
        assert_eq!(budgets.named().len(), 11);
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let toml = r#"
            [preview]
            timeout_ms = 45000
            poll_interval_ms = 1000
            retries = 0
        "#;
        let budgets: StageBudgets = toml::from_str(toml).unwrap();
        assert_eq!(budgets.preview.timeout_ms, 45_000);
        assert_eq!(budgets.preview.poll_interval_ms, 1_000);
        assert_eq!(budgets.save_dialog, StageBudget::new(30_000, 500, 0));
    }
}
