//! CLI subcommand implementations.

pub mod index;
pub mod line;
pub mod matching;
pub mod sync;
pub mod time;
mod util;
