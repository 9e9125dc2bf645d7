//! Application context

use ticket_metrics::{InvalidationListener, QueryService};

/// State shared by every procedure
#[derive(Clone)]
pub struct AppContext {
    pub service: QueryService,
    pub listener: InvalidationListener,
    /// Name of the backing store, reported by `health`
    pub store: &'static str,
}

impl AppContext {
    pub fn new(service: QueryService, store: &'static str) -> Self {
        let listener = InvalidationListener::new(service.coordinator().clone());
        Self {
            service,
            listener,
            store,
        }
    }
}
