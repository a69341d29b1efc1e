//! Web navigation channel: authentication, production-key lookup, label
//! search and the preview trigger.

mod cdp;
mod config;
mod error;
mod locator;
mod production_key;
mod reachability;
mod scripts;
mod traits;
mod types;

pub use cdp::CdpNavigator;
pub use config::*;
pub use error::NavigatorError;
pub use locator::*;
pub use production_key::*;
pub use reachability::check_reachable;
pub use traits::WebNavigator;
pub use types::*;
