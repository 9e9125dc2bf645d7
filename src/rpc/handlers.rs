//! Procedure handlers

use ticket_metrics::rpc::{CompiledRouter, Context, RpcResult, Router, logging_middleware};
use ticket_metrics::{CacheStats, MetricsRequest, MetricsResponse, Validate};
use tracing::info;

use super::context::AppContext;
use super::types::{HealthResponse, MutationAck, TicketMutatedInput};

/// Requests slower than this are logged at warn level
const SLOW_REQUEST_MS: u64 = 1000;

async fn health(ctx: Context<AppContext>, _: ()) -> RpcResult<HealthResponse> {
    let coordinator = ctx.service.coordinator();
    Ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: ctx.store.to_string(),
        cache_enabled: coordinator.config().enabled,
        cache_entries: coordinator.len().await,
    })
}

async fn query_metrics(
    ctx: Context<AppContext>,
    input: MetricsRequest,
) -> RpcResult<MetricsResponse> {
    Ok(ctx.service.query(&input).await?)
}

async fn metrics_stats(ctx: Context<AppContext>, _: ()) -> RpcResult<CacheStats> {
    Ok(ctx.service.stats().await)
}

async fn ticket_mutated(
    ctx: Context<AppContext>,
    input: TicketMutatedInput,
) -> RpcResult<MutationAck> {
    input.validate().into_result()?;

    let ticket_id = input.ticket_id;
    let signal = input.into_signal();
    let report = ctx.listener.on_mutation(&signal).await;
    info!(
        ticket_id,
        kind = signal.kind.as_str(),
        evicted = report.evicted,
        marked_stale = report.marked_stale,
        "ticket mutation applied"
    );
    Ok(MutationAck::new(ticket_id, report))
}

/// Build the application router.
pub fn create_router(ctx: AppContext) -> CompiledRouter<AppContext> {
    Router::new(ctx)
        .middleware(logging_middleware(Some(SLOW_REQUEST_MS)))
        .query("health", health)
        .query("metrics.query", query_metrics)
        .query("metrics.stats", metrics_stats)
        .mutation("tickets.mutated", ticket_mutated)
        .compile()
}
