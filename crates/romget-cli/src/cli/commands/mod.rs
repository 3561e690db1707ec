//! CLI command handlers, one file per command.

mod config;
mod get;
mod search;

pub use config::run_config;
pub use get::run_get;
pub use search::run_search;
