//! Router
//!
//! [`Router`] collects procedures and middleware; [`Router::compile`] turns it
//! into a [`CompiledRouter`] whose middleware chains are built once.
//!
//! ```rust,ignore
//! let router = Router::new(AppContext::new(service, listener))
//!     .middleware(logging_middleware(Some(500)))
//!     .query("metrics.query", query_metrics)
//!     .mutation("tickets.mutated", ticket_mutated)
//!     .compile();
//!
//! let value = router.call("metrics.query", input).await?;
//! ```

use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::context::Context;
use super::error::{RpcError, RpcResult};
use super::handler::{BoxedHandler, Handler, into_boxed};
use super::middleware::{MiddlewareFn, Next, ProcedureType, Request, build_middleware_chain};

struct Procedure<Ctx: Clone + Send + Sync + 'static> {
    handler: BoxedHandler<Ctx>,
    procedure_type: ProcedureType,
}

/// Procedure registry under construction.
pub struct Router<Ctx: Clone + Send + Sync + 'static> {
    context: Ctx,
    procedures: HashMap<String, Procedure<Ctx>>,
    middleware: Vec<MiddlewareFn<Ctx>>,
}

impl<Ctx: Clone + Send + Sync + 'static> Router<Ctx> {
    pub fn new(context: Ctx) -> Self {
        Self {
            context,
            procedures: HashMap::new(),
            middleware: Vec::new(),
        }
    }

    /// Add middleware; it wraps every procedure, including ones added earlier.
    pub fn middleware(mut self, middleware: MiddlewareFn<Ctx>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn query<Input, Output, H>(self, path: &str, handler: H) -> Self
    where
        Input: DeserializeOwned + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.register(path, into_boxed(handler), ProcedureType::Query)
    }

    pub fn mutation<Input, Output, H>(self, path: &str, handler: H) -> Self
    where
        Input: DeserializeOwned + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.register(path, into_boxed(handler), ProcedureType::Mutation)
    }

    fn register(
        mut self,
        path: &str,
        handler: BoxedHandler<Ctx>,
        procedure_type: ProcedureType,
    ) -> Self {
        if self.procedures.contains_key(path) {
            debug!(path = %path, "replacing registered procedure");
        }
        self.procedures.insert(
            path.to_string(),
            Procedure {
                handler,
                procedure_type,
            },
        );
        self
    }

    /// Build every middleware chain up front.
    pub fn compile(self) -> CompiledRouter<Ctx> {
        let Router {
            context,
            procedures,
            middleware,
        } = self;

        let chains = procedures
            .into_iter()
            .map(|(path, procedure)| {
                let handler = procedure.handler;
                let final_handler: Next<Ctx> =
                    Arc::new(move |ctx, req: Request| handler(ctx, req.input));
                let chain = build_middleware_chain(middleware.clone(), final_handler);
                (path, (chain, procedure.procedure_type))
            })
            .collect();

        CompiledRouter {
            context: Context::new(context),
            chains,
        }
    }
}

/// A router with pre-built middleware chains.
pub struct CompiledRouter<Ctx: Clone + Send + Sync + 'static> {
    context: Context<Ctx>,
    chains: HashMap<String, (Next<Ctx>, ProcedureType)>,
}

impl<Ctx: Clone + Send + Sync + 'static> CompiledRouter<Ctx> {
    pub fn context(&self) -> &Ctx {
        self.context.inner()
    }

    /// Registered procedure paths, sorted
    pub fn procedures(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.chains.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn procedure_type(&self, path: &str) -> Option<ProcedureType> {
        self.chains.get(path).map(|(_, procedure_type)| *procedure_type)
    }

    /// Call a procedure by path.
    pub async fn call(&self, path: &str, input: serde_json::Value) -> RpcResult<serde_json::Value> {
        let Some((chain, procedure_type)) = self.chains.get(path) else {
            debug!(path = %path, "procedure not found");
            return Err(RpcError::procedure_not_found(path).with_details(serde_json::json!({
                "available_procedures": self.procedures(),
                "requested": path,
            })));
        };

        let request = Request::new(path, *procedure_type, input);
        trace!(
            path = %path,
            request_id = %request.request_id,
            procedure_type = %procedure_type,
            "executing procedure"
        );
        (chain.clone())(self.context.clone(), request).await
    }
}
