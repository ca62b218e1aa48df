//! Exchange details visible to processing code during dispatch.
//!
//! The transport installs a [`DispatchContext`] for exactly the duration of
//! the synchronous [`BatchProcessor::process`](crate::batch::BatchProcessor::process)
//! call. The value is task-local, so it cannot leak into other exchanges
//! sharing a worker thread, and it is removed on every exit path, panics
//! included.

use std::sync::Arc;

use crate::{config::TransportConfig, request::RequestHead};

/// The transport and request an in-flight dispatch belongs to.
#[derive(Clone, Debug)]
pub struct DispatchContext {
    transport: &'static str,
    config: TransportConfig,
    request: Arc<RequestHead>,
}

impl DispatchContext {
    /// Create a context for `request` served by `transport`.
    #[must_use]
    pub fn new(transport: &'static str, config: TransportConfig, request: Arc<RequestHead>) -> Self {
        Self {
            transport,
            config,
            request,
        }
    }

    /// Name of the transport serving the exchange.
    #[must_use]
    pub fn transport(&self) -> &'static str { self.transport }

    /// Configuration of the transport serving the exchange.
    #[must_use]
    pub fn config(&self) -> &TransportConfig { &self.config }

    /// Head of the request being dispatched.
    #[must_use]
    pub fn request(&self) -> &Arc<RequestHead> { &self.request }
}

tokio::task_local! {
    static CURRENT: DispatchContext;
}

/// Run `f` with `ctx` installed as the current dispatch context.
///
/// The context is removed when `f` returns or unwinds.
pub fn scope<R>(ctx: DispatchContext, f: impl FnOnce() -> R) -> R { CURRENT.sync_scope(ctx, f) }

/// The dispatch context of the enclosing [`scope`], if any.
#[must_use]
pub fn current() -> Option<DispatchContext> { CURRENT.try_with(Clone::clone).ok() }

/// Name of the transport currently dispatching, if any.
#[must_use]
pub fn current_transport() -> Option<&'static str> {
    CURRENT.try_with(DispatchContext::transport).ok()
}

/// Head of the request currently being dispatched, if any.
#[must_use]
pub fn current_request() -> Option<Arc<RequestHead>> {
    CURRENT.try_with(|ctx| Arc::clone(&ctx.request)).ok()
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn context(path: &str) -> DispatchContext {
        DispatchContext::new(
            "long-polling",
            TransportConfig::default(),
            Arc::new(RequestHead::post(path)),
        )
    }

    #[test]
    fn context_is_visible_only_inside_scope() {
        assert!(current().is_none());
        let seen = scope(context("/cometd"), || {
            (
                current_transport(),
                current_request().map(|r| r.path().to_owned()),
            )
        });
        assert_eq!(seen, (Some("long-polling"), Some("/cometd".to_owned())));
        assert!(current().is_none());
    }

    #[test]
    fn context_is_cleared_when_dispatch_panics() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            scope(context("/boom"), || panic!("processor failure"));
        }));
        assert!(result.is_err());
        assert!(current_transport().is_none());
    }

    #[test]
    fn nested_scopes_restore_the_outer_context() {
        scope(context("/outer"), || {
            scope(context("/inner"), || {
                assert_eq!(current_request().map(|r| r.path().to_owned()).as_deref(), Some("/inner"));
            });
            assert_eq!(current_request().map(|r| r.path().to_owned()).as_deref(), Some("/outer"));
        });
    }
}
