//! Persistence module for HubLights.
//!
//! Target configuration model, the ordered configuration set, and the
//! string codec that stores it in a named SQLite slot.

mod codec;
mod config_set;
mod models;
mod store;

pub use codec::*;
pub use config_set::*;
pub use models::*;
pub use store::*;
