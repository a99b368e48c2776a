//! satchel — student-assistant chat server.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod catalog;
pub mod config;
pub mod connections;
pub mod gateway;
pub mod intent;
pub mod model;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod voice;

/// Return the satchel home directory.
///
/// Resolution order:
/// 1. `SATCHEL_HOME` environment variable
/// 2. `$HOME/.satchel`
pub fn satchel_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("SATCHEL_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".satchel")
    }
}
