//! `[desktop]` configuration.

use serde::{Deserialize, Serialize};

use super::{ControlRole, WindowPattern};

/// Window patterns and control names for the preview/print/save sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopConfig {
    /// The out-of-process window a label preview opens in.
    #[serde(default = "default_preview_window")]
    pub preview_window: WindowPattern,
    /// Control on the preview window that starts printing.
    #[serde(default = "default_print_controls")]
    pub print_controls: Vec<String>,
    /// Target selection dialog.
    #[serde(default = "default_print_dialog")]
    pub print_dialog: WindowPattern,
    /// Virtual target that writes a file.
    #[serde(default = "default_print_target")]
    pub print_target: String,
    /// Buttons that confirm the target selection, tried in order.
    #[serde(default = "default_confirm_controls")]
    pub confirm_controls: Vec<String>,
    /// File-save dialog opened by the virtual target.
    #[serde(default = "default_save_dialog")]
    pub save_dialog: WindowPattern,
    /// Name of the file name field in the save dialog.
    #[serde(default = "default_filename_field")]
    pub filename_field: String,
    /// Buttons that confirm the save, tried in order.
    #[serde(default = "default_save_controls")]
    pub save_controls: Vec<String>,
}

fn default_preview_window() -> WindowPattern {
    let mut pattern = WindowPattern::titled("enLabel Global Services");
    pattern.exclude_title_keywords = [
        "cursor",
        "vscode",
        "visual studio",
        "notepad++",
        "sublime",
        "labelfetch",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    pattern
}

fn default_print_controls() -> Vec<String> {
    vec!["Print".to_string()]
}

fn default_print_dialog() -> WindowPattern {
    WindowPattern::titled("Print")
        .with_class("#32770")
        .excluding("save")
}

fn default_print_target() -> String {
    "Microsoft Print to PDF".to_string()
}

fn default_confirm_controls() -> Vec<String> {
    vec!["Print".to_string(), "OK".to_string()]
}

fn default_save_dialog() -> WindowPattern {
    WindowPattern {
        title_contains: vec![
            "Save Print Output As".to_string(),
            "Save As".to_string(),
            "Save File".to_string(),
        ],
        class_names: vec!["#32770".to_string()],
        exclude_title_keywords: Vec::new(),
    }
}

fn default_filename_field() -> String {
    "File name:".to_string()
}

fn default_save_controls() -> Vec<String> {
    vec!["Save".to_string()]
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            preview_window: default_preview_window(),
            print_controls: default_print_controls(),
            print_dialog: default_print_dialog(),
            print_target: default_print_target(),
            confirm_controls: default_confirm_controls(),
            save_dialog: default_save_dialog(),
            filename_field: default_filename_field(),
            save_controls: default_save_controls(),
        }
    }
}

impl DesktopConfig {
    /// Control names to try, in order, for a role.
    pub fn control_names(&self, role: ControlRole) -> &[String] {
        match role {
            ControlRole::Print => &self.print_controls,
            ControlRole::ConfirmTarget => &self.confirm_controls,
            ControlRole::Save => &self.save_controls,
        }
    }
}
