//! Command-line interface module.

mod args;
pub mod get;
pub mod list;
pub mod watch;

pub use args::{Cli, Commands, GetArgs};
