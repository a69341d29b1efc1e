//! Native desktop automation: locating windows and driving the
//! print-to-file dialog sequence.

mod config;
mod controller;
mod error;
mod traits;
mod types;
#[cfg(windows)]
mod uia;

use std::sync::Arc;

pub use config::DesktopConfig;
pub use controller::{Interaction, WindowController};
pub use error::DesktopError;
pub use traits::DesktopBackend;
pub use types::*;
#[cfg(windows)]
pub use uia::UiaDesktop;

/// The platform's native desktop backend.
#[cfg(windows)]
pub fn native_backend() -> Result<Arc<dyn DesktopBackend>, DesktopError> {
    Ok(Arc::new(UiaDesktop::new()))
}

/// The platform's native desktop backend.
#[cfg(not(windows))]
pub fn native_backend() -> Result<Arc<dyn DesktopBackend>, DesktopError> {
    Err(DesktopError::Unsupported(format!(
        "no native backend for {}",
        std::env::consts::OS
    )))
}
