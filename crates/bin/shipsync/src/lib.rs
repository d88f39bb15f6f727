pub mod commands;
pub mod config;
pub mod conn;
pub mod monitor;
pub mod schema;
pub mod sink;
pub mod sql;
pub mod store;

pub use config::{Cli, Command};
pub use monitor::Monitor;
pub use sink::FillSink;

#[cfg(test)]
mod tests;
