use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use conduit_core::Event;
use futures_util::future::BoxFuture;
use tracing::warn;

pub type HandlerFuture = BoxFuture<'static, std::result::Result<(), String>>;
pub type HandlerFn = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Typed dispatch table keyed by exact event type with a `*` wildcard
/// bucket — structurally the same shape as this codebase's hook engine,
/// adapted from priority-ordered before/after hooks to fire-and-forget
/// concurrent dispatch with isolated per-handler failures (§4.G).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<HandlerFn>>>,
    wildcard: RwLock<Vec<HandlerFn>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_type: impl Into<String>, handler: HandlerFn) {
        let mut handlers = self.handlers.write().expect("handler registry poisoned");
        handlers.entry(event_type.into()).or_default().push(handler);
    }

    pub fn register_wildcard(&self, handler: HandlerFn) {
        self.wildcard.write().expect("handler registry poisoned").push(handler);
    }

    /// Look up handlers for the exact type, then the wildcard bucket, and
    /// invoke them concurrently. A failing handler is logged; it never
    /// affects its siblings (`handler_failure`, §7).
    pub fn dispatch(&self, event: Event) {
        let exact: Vec<HandlerFn> = self
            .handlers
            .read()
            .expect("handler registry poisoned")
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();
        let wildcard: Vec<HandlerFn> = self.wildcard.read().expect("handler registry poisoned").clone();

        if exact.is_empty() && wildcard.is_empty() {
            tracing::debug!(event_type = %event.event_type, "no handler registered");
        }

        for handler in exact.into_iter().chain(wildcard) {
            let event = event.clone();
            let event_type = event.event_type.clone();
            tokio::spawn(async move {
                if let Err(reason) = handler(event).await {
                    warn!(event_type, reason, "event handler failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn exact_and_wildcard_both_fire() {
        let registry = HandlerRegistry::new();
        let exact_hits = Arc::new(AtomicUsize::new(0));
        let wildcard_hits = Arc::new(AtomicUsize::new(0));

        let e = exact_hits.clone();
        registry.register(
            "project.updated",
            Arc::new(move |_event| {
                let e = e.clone();
                Box::pin(async move {
                    e.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );
        let w = wildcard_hits.clone();
        registry.register_wildcard(Arc::new(move |_event| {
            let w = w.clone();
            Box::pin(async move {
                w.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }));

        registry.dispatch(Event::new("project.updated", "test", serde_json::json!({})));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_handler_failing_does_not_block_others() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry.register(
            "error",
            Arc::new(|_event| Box::pin(async move { Err("boom".to_string()) })),
        );
        let h = hits.clone();
        registry.register(
            "error",
            Arc::new(move |_event| {
                let h = h.clone();
                Box::pin(async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        registry.dispatch(Event::new("error", "test", serde_json::json!({})));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
