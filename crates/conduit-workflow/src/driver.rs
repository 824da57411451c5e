use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use conduit_bus::EventPublisher;
use conduit_context::ContextManager;
use conduit_core::{ConversationState, Modification, ProjectState, SessionId};
use conduit_mcp::{ImpactAnalysis, McpClient, ValidationScope};
use conduit_sessions::SessionStore;
use conduit_state::StateTracker;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::error::{Result, WorkflowError};

/// Result of running a workflow to completion (§4.F). The Coordinator
/// does not block on this — it is produced by the driver task handed the
/// workflow kickoff, independent of the Coordinator call that started it.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    Completed { project_id: String },
    /// High-risk modification: impact analysis ran, nothing else did. The
    /// driver re-enters only when conversation state is `awaiting_feedback`
    /// and the next inbound message classifies as a confirmation (§9).
    ConfirmationNeeded { project_id: String, impact: ImpactAnalysis },
    Failed { kind: &'static str, message: String },
}

/// Runs the two linear MCP workflows and is the sole writer of
/// `ProjectState` for workflow-initiated transitions (§4.F).
pub struct WorkflowDriver<S: SessionStore, B: EventPublisher> {
    context: Arc<ContextManager<S>>,
    state: Arc<StateTracker<S>>,
    mcp: Arc<McpClient>,
    bus: Arc<B>,
}

impl<S: SessionStore, B: EventPublisher> WorkflowDriver<S, B> {
    pub fn new(
        context: Arc<ContextManager<S>>,
        state: Arc<StateTracker<S>>,
        mcp: Arc<McpClient>,
        bus: Arc<B>,
    ) -> Self {
        Self { context, state, mcp, bus }
    }

    async fn emit_progress(&self, session_id: &SessionId, progress: f64, message: &str) -> Result<()> {
        self.bus.progress_update(&session_id.to_string(), progress, message).await?;
        Ok(())
    }

    /// Creation workflow (§4.F): `generate_project_structure` →
    /// `generate_backend`? → `generate_frontend`? → `setup_infrastructure`
    /// → `validate_consistency(full)`, progress strictly 0.1..1.0.
    #[instrument(skip(self, requirements), fields(session_id = %session_id, project_type))]
    pub async fn run_creation(
        &self,
        session_id: &SessionId,
        requirements: Value,
        project_type: &str,
    ) -> Result<WorkflowOutcome> {
        let structure = match self.mcp.generate_project_structure(&requirements, project_type).await {
            Ok(s) => s,
            Err(e) => return self.fail_creation(session_id, None, "mcp_error_or_unreachable".into(), e.into()).await,
        };
        let project_id = structure.project_id.clone();

        self.context
            .initialize_project(session_id, &project_id, Some(project_type.to_string()), as_map(&requirements))
            .await?;
        self.emit_progress(session_id, 0.1, "Analyzing requirements").await?;

        self.state.update_project(session_id, ProjectState::InProgress).await?;
        self.emit_progress(session_id, 0.3, "Setting up project structure").await?;

        let needs_backend = requirements.get("needs_backend").and_then(Value::as_bool).unwrap_or(true);
        if needs_backend {
            if let Err(e) = self.mcp.generate_backend(&project_id).await {
                return self.fail_creation(session_id, Some(&project_id), "mcp_error_or_unreachable".into(), e.into()).await;
            }
            self.emit_progress(session_id, 0.5, "Generating backend").await?;
        }

        let needs_frontend = requirements.get("needs_frontend").and_then(Value::as_bool).unwrap_or(true);
        if needs_frontend {
            if let Err(e) = self.mcp.generate_frontend(&project_id).await {
                return self.fail_creation(session_id, Some(&project_id), "mcp_error_or_unreachable".into(), e.into()).await;
            }
            self.emit_progress(session_id, 0.7, "Generating frontend").await?;
        }

        if let Err(e) = self.mcp.setup_infrastructure(&project_id).await {
            return self.fail_creation(session_id, Some(&project_id), "mcp_error_or_unreachable".into(), e.into()).await;
        }
        self.emit_progress(session_id, 0.9, "Setting up infrastructure").await?;

        let validation = match self.mcp.validate_consistency(&project_id, ValidationScope::Full).await {
            Ok(v) => v,
            Err(e) => return self.fail_creation(session_id, Some(&project_id), "mcp_error_or_unreachable".into(), e.into()).await,
        };
        self.emit_progress(session_id, 1.0, "Validating project").await?;

        self.state.update_project(session_id, ProjectState::Completed).await?;
        self.bus
            .project_event(
                "project.creation.completed",
                &project_id,
                json!({ "validation": validation, "sessionId": session_id.to_string() }),
            )
            .await?;
        info!(project_id, "creation workflow completed");
        Ok(WorkflowOutcome::Completed { project_id })
    }

    async fn fail_creation(
        &self,
        session_id: &SessionId,
        project_id: Option<&str>,
        _label: String,
        err: conduit_mcp::McpError,
    ) -> Result<WorkflowOutcome> {
        use conduit_core::HasErrorKind;
        let kind = err.kind().code();
        if project_id.is_some() {
            // Best-effort: the project exists once `generate_project_structure`
            // succeeded, so `update_project` can always move it to `Failed`.
            let _ = self.state.update_project(session_id, ProjectState::Failed).await;
        }
        if let Some(pid) = project_id {
            self.bus
                .project_event("project.creation.failed", pid, json!({ "errorType": kind, "message": err.to_string() }))
                .await?;
        }
        self.bus.error_event(&session_id.to_string(), kind, &err.to_string()).await?;
        let _ = self.state.transition_conversation(session_id, ConversationState::Error).await;
        Ok(WorkflowOutcome::Failed { kind, message: err.to_string() })
    }

    /// Modification workflow (§4.F): `analyze_change_impact` → (stop if
    /// high risk) → `update_components` per affected component →
    /// `validate_consistency(modified)` → record a Modification.
    #[instrument(skip(self, requested_change), fields(session_id = %session_id))]
    pub async fn run_modification(&self, session_id: &SessionId, requested_change: &str) -> Result<WorkflowOutcome> {
        let project = self
            .context
            .project_context(session_id)
            .await?
            .ok_or_else(|| WorkflowError::NoProject(session_id.to_string()))?;
        let project_id = project.project_id.clone();

        self.state.update_project(session_id, ProjectState::Modifying).await?;

        let current_state = serde_json::to_value(&project.current_state).unwrap_or(Value::Null);
        let impact = match self.mcp.analyze_change_impact(&project_id, requested_change, &current_state).await {
            Ok(i) => i,
            Err(e) => return self.fail_modification(session_id, &project_id, e).await,
        };
        self.emit_progress(session_id, 0.3, "Analyzing change impact").await?;

        if impact.is_high_risk() {
            self.bus
                .project_event(
                    "project.modification.confirmation_needed",
                    &project_id,
                    json!({ "impact": impact, "sessionId": session_id.to_string() }),
                )
                .await?;
            let _ = self.state.transition_conversation(session_id, ConversationState::AwaitingFeedback).await;
            return Ok(WorkflowOutcome::ConfirmationNeeded { project_id, impact });
        }

        for component in &impact.affected_components {
            if let Err(e) = self
                .mcp
                .update_components(&project_id, std::slice::from_ref(component), "modify")
                .await
            {
                return self.fail_modification(session_id, &project_id, e).await;
            }
        }
        self.emit_progress(session_id, 0.6, "Updating affected components").await?;

        let validation = match self.mcp.validate_consistency(&project_id, ValidationScope::Modified).await {
            Ok(v) => v,
            Err(e) => return self.fail_modification(session_id, &project_id, e).await,
        };
        self.emit_progress(session_id, 1.0, "Validating changes").await?;

        self.context
            .add_modification(
                session_id,
                Modification {
                    timestamp: Utc::now(),
                    original_text: requested_change.to_string(),
                    impact_analysis: Some(serde_json::to_value(&impact).unwrap_or(Value::Null)),
                    execution_result: Some(serde_json::to_value(&validation).unwrap_or(Value::Null)),
                },
            )
            .await?;
        self.state.update_project(session_id, ProjectState::Completed).await?;
        self.bus
            .project_event(
                "project.modification.completed",
                &project_id,
                json!({ "sessionId": session_id.to_string() }),
            )
            .await?;
        info!(project_id, "modification workflow completed");
        Ok(WorkflowOutcome::Completed { project_id })
    }

    async fn fail_modification(
        &self,
        session_id: &SessionId,
        project_id: &str,
        err: conduit_mcp::McpError,
    ) -> Result<WorkflowOutcome> {
        use conduit_core::HasErrorKind;
        let kind = err.kind().code();
        let _ = self.state.update_project(session_id, ProjectState::Failed).await;
        self.bus
            .project_event("project.modification.failed", project_id, json!({ "errorType": kind, "message": err.to_string() }))
            .await?;
        self.bus.error_event(&session_id.to_string(), kind, &err.to_string()).await?;
        let _ = self.state.transition_conversation(session_id, ConversationState::Error).await;
        Ok(WorkflowOutcome::Failed { kind, message: err.to_string() })
    }
}

fn as_map(requirements: &Value) -> HashMap<String, Value> {
    match requirements {
        Value::Object(map) => map.clone().into_iter().collect(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_bus::FakeEventPublisher;
    use conduit_context::ContextManager;
    use conduit_core::{ConversationState, SessionId};
    use conduit_sessions::FakeSessionStore;
    use conduit_state::StateTracker;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn as_map_extracts_object_fields() {
        let v = json!({ "needs_backend": true, "project_type": "web_app" });
        let map = as_map(&v);
        assert_eq!(map.get("needs_backend"), Some(&Value::Bool(true)));
    }

    fn driver(
        server: &MockServer,
    ) -> (
        WorkflowDriver<FakeSessionStore, FakeEventPublisher>,
        Arc<FakeSessionStore>,
        Arc<FakeEventPublisher>,
    ) {
        let store = Arc::new(FakeSessionStore::new());
        let context = Arc::new(ContextManager::new(store.clone()));
        let state = Arc::new(StateTracker::new(store.clone(), context.clone()));
        let mcp = Arc::new(McpClient::new(server.uri(), Duration::from_secs(5)));
        let bus = Arc::new(FakeEventPublisher::new());
        (WorkflowDriver::new(context, state, mcp, bus.clone()), store, bus)
    }

    #[tokio::test]
    async fn creation_happy_path_emits_monotonic_progress_and_completes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/generate-structure"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projectId": "proj-1", "structure": {}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/generate-backend"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/generate-frontend"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/setup-infrastructure"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok", "issues": []
            })))
            .mount(&server)
            .await;

        let (driver, store, bus) = driver(&server);
        let id = SessionId::from("wf-1");
        store.create(&id).await.unwrap();

        let requirements = json!({ "needs_backend": true, "needs_frontend": true });
        let outcome = driver.run_creation(&id, requirements, "web_app").await.unwrap();
        match outcome {
            WorkflowOutcome::Completed { project_id } => assert_eq!(project_id, "proj-1"),
            other => panic!("expected Completed, got {other:?}"),
        }

        let progress: Vec<f64> = bus
            .events()
            .iter()
            .filter(|e| e.event_type == "progress.update")
            .map(|e| e.data.get("progress").and_then(|v| v.as_f64()).unwrap())
            .collect();
        assert_eq!(progress, vec![0.1, 0.3, 0.5, 0.7, 0.9, 1.0]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!((*progress.last().unwrap() - 1.0).abs() < 1e-9);

        let project = store.get(&id).await.unwrap().unwrap().project.unwrap();
        assert_eq!(project.state, conduit_core::ProjectState::Completed);
        assert!(bus.events().iter().any(|e| e.event_type == "project.creation.completed"));
    }

    #[tokio::test]
    async fn creation_failure_marks_project_failed_and_emits_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/generate-structure"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projectId": "proj-2", "structure": {}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/generate-backend"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (driver, store, bus) = driver(&server);
        let id = SessionId::from("wf-2");
        store.create(&id).await.unwrap();

        let requirements = json!({ "needs_backend": true, "needs_frontend": false });
        let outcome = driver.run_creation(&id, requirements, "web_app").await.unwrap();
        match outcome {
            WorkflowOutcome::Failed { kind, .. } => assert_eq!(kind, "mcp_error"),
            other => panic!("expected Failed, got {other:?}"),
        }

        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.project.unwrap().state, conduit_core::ProjectState::Failed);
        assert_eq!(session.conversation_state, ConversationState::Error);
        assert!(bus.events().iter().any(|e| e.event_type == "project.creation.failed"));
        assert!(bus.events().iter().any(|e| e.event_type == "error"));
    }

    #[tokio::test]
    async fn modification_high_risk_stops_before_update_components() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/analyze-impact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "affectedComponents": ["api", "schema"],
                "riskLevel": "high",
                "breakingChanges": true,
                "requiredUpdates": ["schema"],
                "complexity": "high",
            })))
            .mount(&server)
            .await;

        let (driver, store, bus) = driver(&server);
        let id = SessionId::from("wf-3");
        store.create(&id).await.unwrap();
        let context = ContextManager::new(store.clone());
        context.initialize_project(&id, "proj-3", Some("web_app".to_string()), HashMap::new()).await.unwrap();
        context.update_project_state(&id, ProjectState::Completed).await.unwrap();

        let outcome = driver.run_modification(&id, "swap the database to mongo").await.unwrap();
        assert!(matches!(outcome, WorkflowOutcome::ConfirmationNeeded { .. }));

        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.conversation_state, ConversationState::AwaitingFeedback);
        assert_eq!(session.project.as_ref().unwrap().state, ProjectState::Modifying);

        let project_events: Vec<_> = bus.events().into_iter().filter(|e| e.event_type.starts_with("project.")).collect();
        assert_eq!(project_events.len(), 1);
        assert_eq!(project_events[0].event_type, "project.modification.confirmation_needed");
    }

    #[tokio::test]
    async fn modification_low_risk_runs_to_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/analyze-impact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "affectedComponents": ["api"],
                "riskLevel": "low",
                "breakingChanges": false,
                "requiredUpdates": [],
                "complexity": "low",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/update-components"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok", "issues": [] })))
            .mount(&server)
            .await;

        let (driver, store, bus) = driver(&server);
        let id = SessionId::from("wf-4");
        store.create(&id).await.unwrap();
        let context = ContextManager::new(store.clone());
        context.initialize_project(&id, "proj-4", Some("web_app".to_string()), HashMap::new()).await.unwrap();
        context.update_project_state(&id, ProjectState::Completed).await.unwrap();

        let outcome = driver.run_modification(&id, "rename the login button").await.unwrap();
        assert!(matches!(outcome, WorkflowOutcome::Completed { .. }));

        let session = store.get(&id).await.unwrap().unwrap();
        let project = session.project.unwrap();
        assert_eq!(project.state, ProjectState::Completed);
        assert_eq!(project.modifications.len(), 1);
        assert!(bus.events().iter().any(|e| e.event_type == "project.modification.completed"));
    }
}
