//! Transit open-data API access
//!
//! The client returns raw documents; [`normalize`] turns them into typed
//! stations and arrivals.

pub mod client;
pub mod normalize;

pub use client::{HttpTransitClient, TransitApi};
pub use normalize::{normalize_items, Arrival, Station};
