use async_trait::async_trait;
use conduit_core::{Intent, Message};
use conduit_state::ActionTag;

/// Everything the response generator needs to produce the user-visible
/// reply for one turn (§4.I step 7). Assembled by the Coordinator from
/// the system prompt, the last N messages, and the intent/next-action
/// tag — the three inputs handed to the LLM collaborator.
pub struct ResponseRequest {
    pub user_text: String,
    pub intent: Intent,
    pub action: ActionTag,
    pub next_action_message: String,
    pub recent_messages: Vec<Message>,
}

/// The LLM that drafts the user-visible reply is the only nondeterministic
/// collaborator in the whole engine (§9) and lives outside this core
/// (§1 Out of scope: "the LLM prompt library"). This trait is the seam a
/// real provider client plugs into; `TemplatedResponder` is a
/// deterministic stand-in so the rest of the engine stays testable
/// without one.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, request: ResponseRequest) -> String;
}

/// Deterministic canned responses keyed by intent/action. Used in place
/// of a real LLM client so every Coordinator code path is exercisable
/// without network access; production deployments swap this for a client
/// that calls out to the prompt library mentioned in §1.
pub struct TemplatedResponder;

#[async_trait]
impl ResponseGenerator for TemplatedResponder {
    async fn generate(&self, request: ResponseRequest) -> String {
        if !request.next_action_message.is_empty() {
            return request.next_action_message;
        }
        match request.intent {
            Intent::Greeting => "Hello! I can help you create or modify a project — what would you like to build?".to_string(),
            Intent::Help => "I can create new projects, modify existing ones, or report on project status. Just describe what you need in plain language.".to_string(),
            Intent::ProjectInfo => "Ask me for the status of your current project and I'll pull the latest details.".to_string(),
            Intent::GeneralQuery => "Could you tell me a bit more about what you're trying to do?".to_string(),
            Intent::Unknown => "I'm not sure I followed that — could you rephrase?".to_string(),
            _ => match request.action {
                ActionTag::StartProcessing | ActionTag::StartModification => {
                    "Got it, working on that now.".to_string()
                }
                ActionTag::ResumeModification => "Continuing with the change.".to_string(),
                ActionTag::AskClarifyingQuestion | ActionTag::ConfirmDetails => "Could you share a bit more detail?".to_string(),
                ActionTag::Respond => "Understood.".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn next_action_message_takes_priority() {
        let responder = TemplatedResponder;
        let reply = responder
            .generate(ResponseRequest {
                user_text: "hi".to_string(),
                intent: Intent::ProjectCreate,
                action: ActionTag::AskClarifyingQuestion,
                next_action_message: "What should this project do?".to_string(),
                recent_messages: vec![],
            })
            .await;
        assert_eq!(reply, "What should this project do?");
    }

    #[tokio::test]
    async fn greeting_falls_back_to_canned_reply() {
        let responder = TemplatedResponder;
        let reply = responder
            .generate(ResponseRequest {
                user_text: "hello".to_string(),
                intent: Intent::Greeting,
                action: ActionTag::Respond,
                next_action_message: String::new(),
                recent_messages: vec![],
            })
            .await;
        assert!(reply.to_lowercase().contains("hello"));
    }
}
