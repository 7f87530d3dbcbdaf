//! Configuration management for the busram server
//!
//! Loaded once at startup from TOML, then overlaid with the environment
//! variables hosting platforms set (`PORT`, `BUSRAM_SERVICE_KEY`).

mod defaults;
mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::*;
