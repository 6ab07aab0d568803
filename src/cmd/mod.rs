//! CLI command implementations.
//!
//! | Module   | Commands handled        |
//! |----------|-------------------------|
//! | `watch`  | `Watch`                 |
//! | `resume` | `Resume`, `Markers`     |
//! | `config` | `Config`                |

pub mod config;
pub mod resume;
pub mod watch;

pub use config::cmd_config;
pub use resume::{cmd_markers, cmd_resume};
pub use watch::cmd_watch;
