use std::collections::HashMap;
use std::sync::Arc;

use conduit_bus::HandlerRegistry;
use conduit_context::ContextManager;
use conduit_core::{Event, Message, ProjectState, Role};
use conduit_sessions::SessionStore;
use conduit_ws::{Hub, ServerFrame};
use serde_json::Value;

/// Wires the §4.G handler table: each inbound bus event both mutates the
/// session it names (patching `ProjectContext`, recording a validation
/// result, appending a system-role error message) and pushes a frame to
/// that session's WS connections via the Hub. Unmatched types fall to the
/// wildcard debug logger. A handler that errs is logged by the registry
/// dispatch loop and never blocks its siblings (`handler_failure`, §7).
pub fn register_handlers<S: SessionStore + 'static>(
    registry: &HandlerRegistry,
    context: Arc<ContextManager<S>>,
    hub: Arc<Hub>,
) {
    registry.register("project.updated", {
        let context = context.clone();
        let hub = hub.clone();
        Arc::new(move |event: Event| {
            let context = context.clone();
            let hub = hub.clone();
            Box::pin(async move {
                if let Some(session_id) = session_id_of(&event) {
                    let mut patch: HashMap<String, Value> = event
                        .data
                        .as_object()
                        .cloned()
                        .unwrap_or_default()
                        .into_iter()
                        .collect();
                    patch.remove("sessionId");
                    context
                        .patch_current_state(&session_id.into(), patch)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                push(&hub, &event, ServerFrame::ProjectUpdate { data: event.data.clone() });
                Ok(())
            })
        })
    });

    registry.register("project.generation.complete", {
        let context = context.clone();
        let hub = hub.clone();
        Arc::new(move |event: Event| {
            let context = context.clone();
            let hub = hub.clone();
            Box::pin(async move {
                if let Some(session_id) = session_id_of(&event) {
                    let failed = event
                        .data
                        .get("status")
                        .and_then(Value::as_str)
                        .map(|s| s.eq_ignore_ascii_case("failed"))
                        .unwrap_or(false);
                    let target = if failed { ProjectState::Failed } else { ProjectState::Completed };
                    context
                        .update_project_state(&session_id.into(), target)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                push(&hub, &event, ServerFrame::GenerationComplete { data: event.data.clone() });
                Ok(())
            })
        })
    });

    registry.register("validation.complete", {
        let context = context.clone();
        let hub = hub.clone();
        Arc::new(move |event: Event| {
            let context = context.clone();
            let hub = hub.clone();
            Box::pin(async move {
                let issues_present = event
                    .data
                    .get("issues")
                    .and_then(Value::as_array)
                    .map(|v| !v.is_empty())
                    .unwrap_or(false);
                if let Some(session_id) = session_id_of(&event) {
                    let mut patch = HashMap::new();
                    patch.insert("last_validation".to_string(), event.data.clone());
                    context
                        .patch_current_state(&session_id.into(), patch)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                if issues_present {
                    push(&hub, &event, ServerFrame::ValidationIssues { data: event.data.clone() });
                }
                Ok(())
            })
        })
    });

    registry.register("error", {
        let store = context_store(&context);
        let hub = hub.clone();
        Arc::new(move |event: Event| {
            let store = store.clone();
            let hub = hub.clone();
            Box::pin(async move {
                if let Some(session_id) = session_id_of(&event) {
                    let message = event
                        .data
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("an error occurred")
                        .to_string();
                    store
                        .append_message(&session_id.clone().into(), Message::new(Role::System, message))
                        .await
                        .map_err(|e| e.to_string())?;
                }
                push(
                    &hub,
                    &event,
                    ServerFrame::Error {
                        message: event
                            .data
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("an error occurred")
                            .to_string(),
                    },
                );
                Ok(())
            })
        })
    });

    // The driver (§4.F) emits these two directly once it has already moved
    // `ProjectState` itself — no mutation needed here, just the WS push.
    // `project.generation.complete` above stays the one registered for an
    // externally-sourced event that still needs the state written.
    for event_type in ["project.creation.completed", "project.modification.completed"] {
        let hub = hub.clone();
        registry.register(
            event_type,
            Arc::new(move |event: Event| {
                let hub = hub.clone();
                Box::pin(async move {
                    push(&hub, &event, ServerFrame::GenerationComplete { data: event.data.clone() });
                    Ok(())
                })
            }),
        );
    }

    registry.register("progress.update", {
        let hub = hub.clone();
        Arc::new(move |event: Event| {
            let hub = hub.clone();
            Box::pin(async move {
                push(&hub, &event, ServerFrame::Progress { data: event.data.clone() });
                Ok(())
            })
        })
    });

    registry.register("external.update", {
        let hub = hub.clone();
        Arc::new(move |event: Event| {
            let hub = hub.clone();
            Box::pin(async move {
                push(&hub, &event, ServerFrame::ExternalUpdate { data: event.data.clone() });
                Ok(())
            })
        })
    });

    // The driver has already moved `ProjectState` to `Modifying` and the
    // conversation to `awaiting_feedback` by the time it emits this (§4.F
    // step 2) — push-only, same as the two registrations above.
    registry.register("project.modification.confirmation_needed", {
        let hub = hub.clone();
        Arc::new(move |event: Event| {
            let hub = hub.clone();
            Box::pin(async move {
                push(&hub, &event, ServerFrame::ConfirmationNeeded { data: event.data.clone() });
                Ok(())
            })
        })
    });

    registry.register_wildcard(Arc::new(|event: Event| {
        Box::pin(async move {
            tracing::debug!(event_type = %event.event_type, "unhandled bus event");
            Ok(())
        })
    }));
}

fn session_id_of(event: &Event) -> Option<String> {
    event.data.get("sessionId").and_then(Value::as_str).map(str::to_string)
}

fn push(hub: &Hub, event: &Event, frame: ServerFrame) {
    match session_id_of(event) {
        Some(session_id) => hub.send_to_session(&session_id, &frame),
        None => hub.broadcast(&frame),
    }
}

/// `ContextManager` doesn't expose its store directly (no contract in §4.B
/// needs it), but the `error` handler needs to append a message — the one
/// mutation that belongs to the Session Store, not the Context Manager.
fn context_store<S: SessionStore + 'static>(context: &Arc<ContextManager<S>>) -> Arc<S> {
    context.store()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::SessionId;
    use conduit_sessions::FakeSessionStore;
    use std::time::Duration;

    fn setup() -> (Arc<HandlerRegistry>, Arc<Hub>, Arc<ContextManager<FakeSessionStore>>, Arc<FakeSessionStore>) {
        let store = Arc::new(FakeSessionStore::new());
        let context = Arc::new(ContextManager::new(store.clone()));
        let hub = Arc::new(Hub::new());
        let registry = Arc::new(HandlerRegistry::new());
        register_handlers(&registry, context.clone(), hub.clone());
        (registry, hub, context, store)
    }

    #[tokio::test]
    async fn project_update_reaches_named_session_and_patches_current_state() {
        let (registry, hub, context, store) = setup();
        let id = SessionId::from("s-1");
        store.create(&id).await.unwrap();
        context.initialize_project(&id, "proj-1", Some("web_app".to_string()), HashMap::new()).await.unwrap();

        let (_conn_id, mut rx) = hub.connect("s-1");
        rx.try_recv().unwrap();

        registry.dispatch(Event::new(
            "project.updated",
            "test",
            serde_json::json!({ "sessionId": "s-1", "foo": "bar" }),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let payload = rx.try_recv().expect("expected a forwarded frame");
        assert!(payload.contains("\"type\":\"project_update\""));
        assert!(payload.contains("\"foo\":\"bar\""));

        let project = context.project_context(&id).await.unwrap().unwrap();
        assert_eq!(project.current_state.get("foo"), Some(&serde_json::json!("bar")));
    }

    #[tokio::test]
    async fn generation_complete_sets_project_failed_on_failed_status() {
        let (registry, _hub, context, store) = setup();
        let id = SessionId::from("s-2");
        store.create(&id).await.unwrap();
        context.initialize_project(&id, "proj-2", Some("web_app".to_string()), HashMap::new()).await.unwrap();

        registry.dispatch(Event::new(
            "project.generation.complete",
            "test",
            serde_json::json!({ "sessionId": "s-2", "status": "failed" }),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let project = context.project_context(&id).await.unwrap().unwrap();
        assert_eq!(project.state, ProjectState::Failed);
    }

    #[tokio::test]
    async fn validation_complete_pushes_only_when_issues_present() {
        let (registry, hub, context, store) = setup();
        let id = SessionId::from("s-3");
        store.create(&id).await.unwrap();
        context.initialize_project(&id, "proj-3", Some("web_app".to_string()), HashMap::new()).await.unwrap();

        let (_conn_id, mut rx) = hub.connect("s-3");
        rx.try_recv().unwrap();

        registry.dispatch(Event::new(
            "validation.complete",
            "test",
            serde_json::json!({ "sessionId": "s-3", "status": "ok", "issues": [] }),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        let project = context.project_context(&id).await.unwrap().unwrap();
        assert!(project.current_state.get("last_validation").is_some());
    }

    #[tokio::test]
    async fn driver_emitted_creation_completed_pushes_without_remutating_state() {
        let (registry, hub, context, store) = setup();
        let id = SessionId::from("s-5");
        store.create(&id).await.unwrap();
        context.initialize_project(&id, "proj-5", Some("web_app".to_string()), HashMap::new()).await.unwrap();
        context.update_project_state(&id, ProjectState::Completed).await.unwrap();

        let (_conn_id, mut rx) = hub.connect("s-5");
        rx.try_recv().unwrap();

        registry.dispatch(Event::new(
            "project.creation.completed",
            "test",
            serde_json::json!({ "sessionId": "s-5", "validation": { "status": "ok" } }),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let payload = rx.try_recv().expect("expected a forwarded frame");
        assert!(payload.contains("\"type\":\"generation_complete\""));
        let project = context.project_context(&id).await.unwrap().unwrap();
        assert_eq!(project.state, ProjectState::Completed);
    }

    /// A high-risk modification's `confirmation_needed` event (emitted by
    /// the Workflow Driver at the point it stops short of running
    /// `update_components`) must reach the session's WS connections, not
    /// just fall through to the wildcard debug logger — otherwise the
    /// `awaiting_feedback`/`ResumeModification` path has nothing to tell
    /// the user a confirmation is needed.
    #[tokio::test]
    async fn modification_confirmation_needed_reaches_ws_client() {
        let (registry, hub, _context, store) = setup();
        let id = SessionId::from("s-6");
        store.create(&id).await.unwrap();

        let (_conn_id, mut rx) = hub.connect("s-6");
        rx.try_recv().unwrap();

        registry.dispatch(Event::new(
            "project.modification.confirmation_needed",
            "test",
            serde_json::json!({
                "sessionId": "s-6",
                "impact": { "riskLevel": "high", "affectedComponents": ["api", "schema"] },
            }),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let payload = rx.try_recv().expect("expected a forwarded frame");
        assert!(payload.contains("\"type\":\"confirmation_needed\""));
        assert!(payload.contains("\"riskLevel\":\"high\""));
    }

    #[tokio::test]
    async fn error_event_appends_system_message() {
        let (registry, _hub, _context, store) = setup();
        let id = SessionId::from("s-4");
        store.create(&id).await.unwrap();

        registry.dispatch(Event::new(
            "error",
            "test",
            serde_json::json!({ "sessionId": "s-4", "message": "mcp unreachable" }),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let history = store.history(&id, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[0].content, "mcp unreachable");
    }
}
