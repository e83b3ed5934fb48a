//! Shared types for the Cadence habit tracking engine.

mod completion;
mod habit;
mod period;
mod streak;

pub use completion::*;
pub use habit::*;
pub use period::*;
pub use streak::*;
