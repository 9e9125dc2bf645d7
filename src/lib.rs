//! Ticket metrics application
//!
//! Wires the `ticket-metrics` engine to a procedure router and serves it as
//! newline-delimited JSON.

pub mod rpc;
pub mod transport;

pub use rpc::{AppContext, create_router};
pub use transport::serve;
