//! Middleware chain
//!
//! Middleware wraps procedure execution onion-style: the first registered
//! middleware runs first on the way in and last on the way out.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::context::Context;
use super::error::RpcResult;

/// Unique identifier for a request, used for log correlation.
///
/// UUID v7, so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext)))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of procedure being called
#[derive(Clone, Debug, PartialEq, Eq, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureType {
    /// Read-only operation
    Query,
    /// Operation that changes state
    Mutation,
}

impl std::fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Mutation => write!(f, "mutation"),
        }
    }
}

/// Request information passed to middleware
#[derive(Clone, Debug)]
pub struct Request {
    pub request_id: RequestId,
    /// Full path of the procedure (e.g. "metrics.query")
    pub path: String,
    pub procedure_type: ProcedureType,
    pub input: serde_json::Value,
}

impl Request {
    pub fn new(
        path: impl Into<String>,
        procedure_type: ProcedureType,
        input: serde_json::Value,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            path: path.into(),
            procedure_type,
            input,
        }
    }

    /// First segment of the path
    pub fn namespace(&self) -> Option<&str> {
        self.path.split('.').next()
    }
}

pub type Response = serde_json::Value;

/// Next function in the middleware chain
pub type Next<Ctx> = Arc<
    dyn Fn(Context<Ctx>, Request) -> Pin<Box<dyn Future<Output = RpcResult<Response>> + Send>>
        + Send
        + Sync,
>;

/// Middleware function type
pub type MiddlewareFn<Ctx> = Arc<
    dyn Fn(
            Context<Ctx>,
            Request,
            Next<Ctx>,
        ) -> Pin<Box<dyn Future<Output = RpcResult<Response>> + Send>>
        + Send
        + Sync,
>;

/// Create middleware from an async function or closure
///
/// # Example
/// ```rust,ignore
/// let router = Router::new(ctx).middleware(from_fn(|ctx, req, next| async move {
///     tracing::info!(path = %req.path, "calling");
///     next(ctx, req).await
/// }));
/// ```
pub fn from_fn<Ctx, F, Fut>(f: F) -> MiddlewareFn<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
    F: Fn(Context<Ctx>, Request, Next<Ctx>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Response>> + Send + 'static,
{
    Arc::new(move |ctx, req, next| Box::pin(f(ctx, req, next)))
}

/// Compose middleware around a final handler.
///
/// Given middleware `[M1, M2, M3]` and handler `H` the execution order is
/// `M1 → M2 → M3 → H → M3 → M2 → M1`.
pub fn build_middleware_chain<Ctx: Clone + Send + Sync + 'static>(
    middleware: Vec<MiddlewareFn<Ctx>>,
    final_handler: Next<Ctx>,
) -> Next<Ctx> {
    middleware
        .into_iter()
        .rev()
        .fold(final_handler, |next, mw| {
            Arc::new(move |ctx, req| {
                let mw = mw.clone();
                let next = next.clone();
                Box::pin(async move { (mw)(ctx, req, next).await })
            })
        })
}

/// Logs each request with its id, duration and outcome.
///
/// Requests slower than `slow_threshold_ms` are logged at warn level.
pub fn logging_middleware<Ctx>(slow_threshold_ms: Option<u64>) -> MiddlewareFn<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    from_fn(move |ctx: Context<Ctx>, req: Request, next: Next<Ctx>| async move {
        let request_id = req.request_id;
        let path = req.path.clone();
        let procedure_type = req.procedure_type;
        debug!(%request_id, %path, %procedure_type, "request started");

        let start = Instant::now();
        let result = next(ctx, req).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(%request_id, %path, duration_ms, "request completed"),
            Err(error) => warn!(
                %request_id,
                %path,
                duration_ms,
                code = %error.code,
                message = %error.message,
                "request failed"
            ),
        }
        if slow_threshold_ms.is_some_and(|threshold| duration_ms > threshold) {
            warn!(%request_id, %path, duration_ms, "slow request");
        }
        result
    })
}
