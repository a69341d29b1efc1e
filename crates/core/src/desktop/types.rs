//! Types for native window automation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to a native top-level window.
///
/// The window may vanish at any time; every use goes back through the
/// backend, which reports [`super::DesktopError::WindowGone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub isize);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// A top-level window as enumerated by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub class_name: String,
    pub visible: bool,
}

/// Title/class pattern identifying a kind of window.
///
/// A visible window matches when its title contains one of `title_contains`
/// (case-insensitive), its class equals one of `class_names`, and its title
/// contains none of `exclude_title_keywords`. Empty lists accept anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPattern {
    #[serde(default)]
    pub title_contains: Vec<String>,
    #[serde(default)]
    pub class_names: Vec<String>,
    #[serde(default)]
    pub exclude_title_keywords: Vec<String>,
}

impl WindowPattern {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title_contains: vec![title.into()],
            ..Default::default()
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_names.push(class_name.into());
        self
    }

    pub fn excluding(mut self, keyword: impl Into<String>) -> Self {
        self.exclude_title_keywords.push(keyword.into());
        self
    }

    /// A pattern that constrains neither title nor class matches every window.
    pub fn is_unconstrained(&self) -> bool {
        self.title_contains.iter().all(|t| t.trim().is_empty())
            && self.class_names.iter().all(|c| c.trim().is_empty())
    }

    pub fn matches(&self, info: &WindowInfo) -> bool {
        if !info.visible {
            return false;
        }

        let title = info.title.to_lowercase();
        let excluded = self
            .exclude_title_keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| title.contains(&k.to_lowercase()));
        if excluded {
            return false;
        }

        let title_ok = self.title_contains.is_empty()
            || self
                .title_contains
                .iter()
                .any(|t| title.contains(&t.to_lowercase()));
        let class_ok = self.class_names.is_empty()
            || self
                .class_names
                .iter()
                .any(|c| info.class_name.eq_ignore_ascii_case(c));

        title_ok && class_ok
    }
}

impl fmt::Display for WindowPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "title~{:?}", self.title_contains)?;
        if !self.class_names.is_empty() {
            write!(f, " class={:?}", self.class_names)?;
        }
        Ok(())
    }
}

/// Result of trying to invoke a named control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Invoked,
    Missing,
    Disabled,
}

/// Controls the pipeline drives, resolved to names through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRole {
    /// The print action on the rendering window.
    Print,
    /// Confirmation of the target selection dialog.
    ConfirmTarget,
    /// Confirmation of the file-save dialog.
    Save,
}

impl ControlRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlRole::Print => "print",
            ControlRole::ConfirmTarget => "confirm_target",
            ControlRole::Save => "save",
        }
    }
}
