pub mod config;
pub mod errors;
pub mod preview;
pub mod telemetry;
pub mod ui;
