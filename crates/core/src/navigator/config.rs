//! Portal, browser and locator configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{Locator, LocatorKind, LocatorTemplate};

/// `[portal]`: where the label portal lives and how to log in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Login page.
    pub login_url: String,
    /// Records view used for production-key lookups.
    pub records_url: String,
    /// Label search page.
    pub label_search_url: String,
    /// Login name. `LABELFETCH_USERNAME` overrides it.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password. `LABELFETCH_PASSWORD` overrides it.
    #[serde(default)]
    pub password: Option<String>,
    /// Probe the login URL over HTTP before starting the browser.
    #[serde(default = "default_true")]
    pub reachability_check: bool,
}

fn default_true() -> bool {
    true
}

/// `[browser]`: how to obtain the automated browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub headless: bool,
    /// Browser binary; auto-detected when unset.
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// Attach to an already running browser instead of launching one.
    #[serde(default)]
    pub debugger_url: Option<String>,
    #[serde(default = "default_idle_timeout")]
    pub idle_browser_timeout_secs: u64,
}

fn default_window_width() -> u32 {
    1400
}

fn default_window_height() -> u32 {
    1000
}

fn default_idle_timeout() -> u64 {
    600
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            executable_path: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            debugger_url: None,
            idle_browser_timeout_secs: default_idle_timeout(),
        }
    }
}

/// `[locators]`: where things are on the portal's pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    #[serde(default = "default_username_field")]
    pub username_field: Locator,
    #[serde(default = "default_password_field")]
    pub password_field: Locator,
    #[serde(default = "default_login_button")]
    pub login_button: Locator,
    /// Optional element shown when a login is rejected.
    #[serde(default)]
    pub login_error: Option<Locator>,

    /// Link into the records table holding production keys.
    #[serde(default = "default_records_table_link")]
    pub records_table_link: Locator,
    /// Optional command-bar link that reveals the filter row.
    #[serde(default = "default_filter_toggle")]
    pub filter_toggle: Option<Locator>,
    #[serde(default = "default_operand_dropdown")]
    pub operand_dropdown: Locator,
    #[serde(default = "default_operand_index")]
    pub operand_index: u32,
    #[serde(default = "default_column_dropdown")]
    pub column_dropdown: Locator,
    #[serde(default = "default_column_index")]
    pub column_index: u32,
    #[serde(default = "default_filter_value_input")]
    pub filter_value_input: Locator,
    #[serde(default = "default_filter_find_button")]
    pub filter_find_button: Locator,
    #[serde(default = "default_production_key_cell")]
    pub production_key_cell: Locator,
    #[serde(default = "default_no_records")]
    pub no_records: Locator,

    #[serde(default = "default_search_input")]
    pub search_input: Locator,
    #[serde(default = "default_search_button")]
    pub search_button: Locator,
    #[serde(default = "default_results_grid")]
    pub results_grid: Locator,
    #[serde(default = "default_result_row")]
    pub result_row: LocatorTemplate,
    #[serde(default = "default_preview_button")]
    pub preview_button: LocatorTemplate,
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
}

fn default_username_field() -> Locator {
    Locator::id("ctl00_ContentPlaceHolder1_txtUserName")
}

fn default_password_field() -> Locator {
    Locator::id("ctl00_ContentPlaceHolder1_txtPassword")
}

fn default_login_button() -> Locator {
    Locator::id("ctl00_ContentPlaceHolder1_btnLogin")
}

fn default_records_table_link() -> Locator {
    Locator::xpath("//*[@id[contains(.,'gridTables')]]//*[contains(@id,'__1')]//td[1]//a")
}

fn default_filter_toggle() -> Option<Locator> {
    Some(Locator::xpath(
        "(//*[contains(@id,'gridCommand') or contains(@class,'rgCommandRow')]//a[normalize-space()])[2]",
    ))
}

fn default_operand_dropdown() -> Locator {
    Locator::xpath("//*[contains(@id,'FilterControl_ddlOperand1')]")
}

fn default_operand_index() -> u32 {
    1
}

fn default_column_dropdown() -> Locator {
    Locator::xpath("//*[contains(@id,'FilterControl_ddlColumn1')]")
}

fn default_column_index() -> u32 {
    8
}

fn default_filter_value_input() -> Locator {
    Locator::id("ctl00_MainContent_FilterControl_txtValue1")
}

fn default_filter_find_button() -> Locator {
    Locator::id("ctl00_MainContent_FilterControl_btnFind")
}

fn default_production_key_cell() -> Locator {
    Locator::xpath("//*[@id='ctl00_MainContent_gridDbRecords_ctl00__0']/td[2]/nobr")
}

fn default_no_records() -> Locator {
    Locator::xpath("//*[contains(@id,'gridDbRecords')]//tr[contains(@class,'rgNoRecords')]")
}

fn default_search_input() -> Locator {
    Locator::id("ctl00_MainContent__txtORDER_NUMBER")
}

fn default_search_button() -> Locator {
    Locator::id("ctl00_MainContent__btnNext")
}

fn default_results_grid() -> Locator {
    Locator::id("ctl00_MainContent_gridLabels")
}

fn default_result_row() -> LocatorTemplate {
    LocatorTemplate::new(
        LocatorKind::Xpath,
        "//*[@id='ctl00_MainContent_gridLabels_ctl00__{row}']",
    )
}

fn default_preview_button() -> LocatorTemplate {
    LocatorTemplate::new(
        LocatorKind::Id,
        "ctl00_MainContent_gridLabels_ctl00_ctl{ctl:02}_btnPreview",
    )
    .with_ordinal(4, 2)
}

fn default_max_result_rows() -> usize {
    20
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            username_field: default_username_field(),
            password_field: default_password_field(),
            login_button: default_login_button(),
            login_error: None,
            records_table_link: default_records_table_link(),
            filter_toggle: default_filter_toggle(),
            operand_dropdown: default_operand_dropdown(),
            operand_index: default_operand_index(),
            column_dropdown: default_column_dropdown(),
            column_index: default_column_index(),
            filter_value_input: default_filter_value_input(),
            filter_find_button: default_filter_find_button(),
            production_key_cell: default_production_key_cell(),
            no_records: default_no_records(),
            search_input: default_search_input(),
            search_button: default_search_button(),
            results_grid: default_results_grid(),
            result_row: default_result_row(),
            preview_button: default_preview_button(),
            max_result_rows: default_max_result_rows(),
        }
    }
}
