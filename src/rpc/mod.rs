//! Application RPC module
//!
//! Procedures, their inputs and outputs, and the state they share.

mod context;
mod handlers;
mod types;

pub use context::AppContext;
pub use handlers::create_router;
pub use types::*;
