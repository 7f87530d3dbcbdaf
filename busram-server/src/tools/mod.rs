//! Tools exposed to agents
//!
//! [`ToolRegistry`] holds the contracts, [`ToolAdapter`] runs them. The two
//! transit tools are wired up by [`transit_registry`].

pub mod adapter;
pub mod arrival;
pub mod error;
pub mod registry;
pub mod station;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

pub use adapter::ToolAdapter;
pub use error::ToolError;
pub use registry::ToolRegistry;

use crate::transit::TransitApi;

/// Registry with `search_station` and `check_arrival` bound to `api`
pub fn transit_registry(api: Arc<dyn TransitApi>) -> ToolRegistry {
    ToolRegistry::builder()
        .register(station::contract(Arc::clone(&api)))
        .register(arrival::contract(api))
        .build()
}
