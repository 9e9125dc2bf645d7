//! Handler traits
//!
//! A handler is any `async fn(Context<Ctx>, Input) -> RpcResult<Output>`.
//! Handlers are boxed into a JSON-in, JSON-out form so the router can store
//! them side by side.

use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{trace, warn};

use super::context::Context;
use super::error::{RpcError, RpcResult};

/// Boxed handler for type erasure
pub(crate) type BoxedHandler<Ctx> = Arc<
    dyn Fn(
            Context<Ctx>,
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = RpcResult<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Trait for handler functions
pub trait Handler<Ctx, Input, Output>: Clone + Send + Sync + 'static
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Send + 'static,
    Output: Serialize + Send + 'static,
{
    type Future: Future<Output = RpcResult<Output>> + Send;

    fn call(&self, ctx: Context<Ctx>, input: Input) -> Self::Future;
}

impl<Ctx, Input, Output, F, Fut> Handler<Ctx, Input, Output> for F
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Send + 'static,
    Output: Serialize + Send + 'static,
    F: Fn(Context<Ctx>, Input) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Output>> + Send + 'static,
{
    type Future = Fut;

    fn call(&self, ctx: Context<Ctx>, input: Input) -> Self::Future {
        (self)(ctx, input)
    }
}

/// Box a handler. Input that does not match `Input` is a `BAD_REQUEST`.
pub(crate) fn into_boxed<Ctx, Input, Output, H>(handler: H) -> BoxedHandler<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Send + 'static,
    Output: Serialize + Send + 'static,
    H: Handler<Ctx, Input, Output>,
{
    Arc::new(move |ctx, input_value| {
        let handler = handler.clone();
        Box::pin(async move {
            let input: Input = serde_json::from_value(input_value).map_err(|e| {
                warn!(error = %e, "handler input deserialization failed");
                RpcError::bad_request(format!("invalid input: {}", e))
            })?;

            trace!("executing handler");
            let output = handler.call(ctx, input).await?;

            let output_value = serde_json::to_value(output).map_err(|e| {
                warn!(error = %e, "handler output serialization failed");
                RpcError::from(e)
            })?;
            Ok(output_value)
        })
    })
}
