pub mod fill;
pub mod monitor;
