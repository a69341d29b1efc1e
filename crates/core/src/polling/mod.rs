//! Bounded polling, retry budgets and interaction state shared by the web and
//! desktop automation channels.

mod budget;
mod phase;
mod stages;

pub use budget::*;
pub use phase::*;
pub use stages::*;
