//! Logging setup shared by the ship workspace binaries.

pub mod logging;
