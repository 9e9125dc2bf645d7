//! RPC dispatch
//!
//! A small procedure router: handlers take a [`Context`] and a typed input,
//! middleware wraps them onion-style, and every failure leaves as an
//! [`RpcError`] carrying an [`ErrorCode`](crate::ErrorCode).

mod context;
mod error;
mod handler;
mod middleware;
mod router;

pub use context::Context;
pub use error::{RpcError, RpcResult};
pub use handler::Handler;
pub use middleware::{
    MiddlewareFn, Next, ProcedureType, Request, RequestId, Response, build_middleware_chain,
    from_fn, logging_middleware,
};
pub use router::{CompiledRouter, Router};
