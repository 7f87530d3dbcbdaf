//! Live sessions
//!
//! A session pairs one open event stream with the inbound queue its POSTs
//! feed. The registry is the only structure shared between connection tasks.

mod registry;
mod session;

pub use registry::SessionRegistry;
pub use session::{Delivery, Session, SessionChannels, Submission};
