//! Failure records and the persisted verification ledger.
//!
//! [`ErrorLedger`] accumulates per-item failure causes during a run. The
//! persisted ledger is an append-only event log fed through a
//! [`LedgerHandle`] and written by a background [`LedgerWriter`].

mod errors;
mod events;
mod export;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use errors::*;
pub use events::*;
pub use export::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;
