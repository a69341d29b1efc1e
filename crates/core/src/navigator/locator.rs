//! Element locators and per-row locator templates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a locator's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    Id,
    Css,
    Xpath,
}

impl LocatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocatorKind::Id => "id",
            LocatorKind::Css => "css",
            LocatorKind::Xpath => "xpath",
        }
    }
}

/// A way to find one element on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub by: LocatorKind,
    pub value: String,
}

impl Locator {
    pub fn id(value: impl Into<String>) -> Self {
        Self {
            by: LocatorKind::Id,
            value: value.into(),
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self {
            by: LocatorKind::Css,
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            by: LocatorKind::Xpath,
            value: value.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.by.as_str(), self.value)
    }
}

/// A locator for one row of a result grid.
///
/// `{row}` expands to the zero-based row ordinal. `{ctl}` expands to
/// `ctl_base + ctl_step * row`, and `{ctl:0N}` zero-pads it to `N` digits,
/// matching server-generated control ids such as `..._ctl04_btnPreview`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorTemplate {
    pub by: LocatorKind,
    pub value: String,
    #[serde(default)]
    pub ctl_base: usize,
    #[serde(default = "default_ctl_step")]
    pub ctl_step: usize,
}

fn default_ctl_step() -> usize {
    1
}

impl LocatorTemplate {
    pub fn new(by: LocatorKind, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
            ctl_base: 0,
            ctl_step: default_ctl_step(),
        }
    }

    pub fn with_ordinal(mut self, base: usize, step: usize) -> Self {
        self.ctl_base = base;
        self.ctl_step = step;
        self
    }

    pub fn render(&self, row: usize) -> Locator {
        let ctl = self.ctl_base + self.ctl_step * row;
        let mut out = String::with_capacity(self.value.len() + 4);
        let mut rest = self.value.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let Some(end) = tail.find('}') else {
                out.push_str(tail);
                rest = "";
                break;
            };
            let placeholder = &tail[1..end];
            match expand(placeholder, row, ctl) {
                Some(expanded) => out.push_str(&expanded),
                None => out.push_str(&tail[..=end]),
            }
            rest = &tail[end + 1..];
        }
        out.push_str(rest);

        Locator {
            by: self.by,
            value: out,
        }
    }
}

fn expand(placeholder: &str, row: usize, ctl: usize) -> Option<String> {
    match placeholder {
        "row" => Some(row.to_string()),
        "ctl" => Some(ctl.to_string()),
        other => {
            let width = other.strip_prefix("ctl:0")?.parse::<usize>().ok()?;
            Some(format!("{:0width$}", ctl, width = width))
        }
    }
}
