use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use ordermate_core::errors::ApplicationError;

use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError, ModelReply};
use crate::session::SessionLog;
use crate::tools::ToolRegistry;

pub const NO_CONTENT_REPLY: &str = "(no content)";
pub const TOOL_FAILURE_PREFIX: &str = "Error while performing the requested action: ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    AwaitingModel,
    ModelRepliedDirectly,
    ModelRequestedTools,
    ExecutingTools,
    AwaitingModelSummary,
    TurnComplete,
}

impl TurnState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingModel => "awaiting_model",
            Self::ModelRepliedDirectly => "model_replied_directly",
            Self::ModelRequestedTools => "model_requested_tools",
            Self::ExecutingTools => "executing_tools",
            Self::AwaitingModelSummary => "awaiting_model_summary",
            Self::TurnComplete => "turn_complete",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ModelRepliedDirectly | Self::TurnComplete)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::AwaitingModel, Self::ModelRepliedDirectly)
                | (Self::AwaitingModel, Self::ModelRequestedTools)
                | (Self::ModelRequestedTools, Self::ExecutingTools)
                | (Self::ExecutingTools, Self::AwaitingModelSummary)
                | (Self::ExecutingTools, Self::TurnComplete)
                | (Self::AwaitingModelSummary, Self::TurnComplete)
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Turn<'a> {
    session_id: &'a str,
    correlation_id: String,
    state: TurnState,
}

impl<'a> Turn<'a> {
    fn start(session_id: &'a str) -> Self {
        let turn = Self {
            session_id,
            correlation_id: Uuid::new_v4().to_string(),
            state: TurnState::AwaitingModel,
        };
        info!(
            event_name = "agent.turn.started",
            session_id = turn.session_id,
            correlation_id = %turn.correlation_id,
            "turn started"
        );
        turn
    }

    fn advance(&mut self, next: TurnState) {
        debug_assert!(self.state.can_transition_to(next), "{} -> {next}", self.state);
        debug!(
            event_name = "agent.turn.transition",
            session_id = self.session_id,
            correlation_id = %self.correlation_id,
            from = %self.state,
            to = %next,
            "turn state changed"
        );
        self.state = next;
        if next.is_terminal() {
            info!(
                event_name = "agent.turn.completed",
                session_id = self.session_id,
                correlation_id = %self.correlation_id,
                state = %next,
                "turn completed"
            );
        }
    }

    fn model_failed(&self, error: &LlmError) -> ApplicationError {
        warn!(
            event_name = "agent.turn.model_failed",
            session_id = self.session_id,
            correlation_id = %self.correlation_id,
            state = %self.state,
            error = %error,
            "model call failed"
        );
        match error {
            LlmError::NotConfigured(message) => ApplicationError::Configuration(message.clone()),
            _ => ApplicationError::ModelUnavailable(error.to_string()),
        }
    }
}

/// Drives one utterance through the model and the tool registry.
#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    temperature: f32,
    max_tokens: u32,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self { llm, tools, temperature, max_tokens }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Runs a turn against `log`, which the caller holds exclusively.
    ///
    /// Tool failures never fail the turn; they end it with a combined error
    /// reply and no summary call. Model failures propagate.
    pub async fn run_turn(
        &self,
        session_id: &str,
        log: &mut SessionLog,
        utterance: &str,
    ) -> Result<String, ApplicationError> {
        let mut turn = Turn::start(session_id);
        log.push(ChatMessage::user(utterance));

        let reply = self
            .complete(log, true)
            .await
            .map_err(|error| turn.model_failed(&error))?;

        if reply.tool_calls.is_empty() {
            turn.advance(TurnState::ModelRepliedDirectly);
            return Ok(finish(log, reply));
        }

        turn.advance(TurnState::ModelRequestedTools);
        turn.advance(TurnState::ExecutingTools);

        let mut failures = Vec::new();
        for invocation in reply.tool_calls {
            let result = self.tools.execute(&invocation).await;
            if let Some(error) = result.error() {
                failures.push(format!("{}: {error}", invocation.name));
            }
            log.push(ChatMessage::assistant_tool_call(invocation.clone()));
            log.push(ChatMessage::tool_result(&invocation, result.to_content()));
        }

        if !failures.is_empty() {
            let text = format!("{TOOL_FAILURE_PREFIX}{}", failures.join(" | "));
            log.push(ChatMessage::assistant(text.clone()));
            turn.advance(TurnState::TurnComplete);
            return Ok(text);
        }

        turn.advance(TurnState::AwaitingModelSummary);
        let summary = self
            .complete(log, false)
            .await
            .map_err(|error| turn.model_failed(&error))?;
        turn.advance(TurnState::TurnComplete);

        Ok(finish(log, summary))
    }

    async fn complete(&self, log: &SessionLog, offer_tools: bool) -> Result<ModelReply, LlmError> {
        let request = ChatRequest {
            messages: log.messages().to_vec(),
            tools: if offer_tools { self.tools.catalog() } else { Vec::new() },
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        self.llm.complete(request).await
    }
}

fn finish(log: &mut SessionLog, reply: ModelReply) -> String {
    let content = reply.content.unwrap_or_default();
    let text = if content.is_empty() { NO_CONTENT_REPLY.to_string() } else { content.clone() };
    log.push(ChatMessage::Assistant { content: Some(content), tool_calls: Vec::new() });
    text
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use ordermate_core::errors::ApplicationError;
    use ordermate_db::RecordStore;

    use super::{Orchestrator, TurnState, NO_CONTENT_REPLY};
    use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError, ModelReply, ToolInvocation};
    use crate::locks::KeyedLocks;
    use crate::session::SessionLog;
    use crate::tools::ToolRegistry;

    #[derive(Default)]
    struct Script {
        replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl LlmClient for Script {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ChatRequest) -> Result<ModelReply, LlmError> {
            self.requests.lock().expect("requests").push(request);
            self.replies
                .lock()
                .expect("replies")
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Parse("script exhausted".to_string())))
        }
    }

    fn orchestrator(replies: Vec<Result<ModelReply, LlmError>>) -> (Orchestrator, Arc<Script>) {
        let script = Arc::new(Script { replies: Mutex::new(replies.into()), ..Script::default() });
        let tools = ToolRegistry::for_store(&RecordStore::in_memory(), KeyedLocks::new());
        (Orchestrator::new(script.clone(), tools, 0.2, 800), script)
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolInvocation {
        ToolInvocation { id: id.to_string(), name: name.to_string(), arguments: arguments.to_string() }
    }

    #[test]
    fn turn_states_only_move_forward() {
        assert!(TurnState::AwaitingModel.can_transition_to(TurnState::ModelRepliedDirectly));
        assert!(TurnState::ExecutingTools.can_transition_to(TurnState::TurnComplete));
        assert!(!TurnState::TurnComplete.can_transition_to(TurnState::AwaitingModel));
        assert!(!TurnState::AwaitingModel.can_transition_to(TurnState::ExecutingTools));
        assert!(TurnState::ModelRepliedDirectly.is_terminal());
        assert!(!TurnState::AwaitingModelSummary.is_terminal());
    }

    #[tokio::test]
    async fn direct_reply_is_returned_and_logged() {
        let (orchestrator, script) = orchestrator(vec![Ok(ModelReply::text("Hi there"))]);
        let mut log = SessionLog::new("prompt");

        let reply = orchestrator.run_turn("s-1", &mut log, "hello").await.expect("turn");

        assert_eq!(reply, "Hi there");
        assert_eq!(log.len(), 3);
        assert_eq!(log.messages()[1], ChatMessage::user("hello"));
        let requests = script.requests.lock().expect("requests");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 5);
        assert_eq!(requests[0].max_tokens, 800);
    }

    #[tokio::test]
    async fn empty_reply_is_substituted() {
        let (orchestrator, _) = orchestrator(vec![Ok(ModelReply::default())]);
        let mut log = SessionLog::new("prompt");

        let reply = orchestrator.run_turn("s-1", &mut log, "hello").await.expect("turn");

        assert_eq!(reply, NO_CONTENT_REPLY);
    }

    #[tokio::test]
    async fn summary_call_is_made_without_tools() {
        let (orchestrator, script) = orchestrator(vec![
            Ok(ModelReply::tools(vec![call(
                "call_1",
                "create_customer",
                r#"{"name":"Alice","email":"a@x.com"}"#,
            )])),
            Ok(ModelReply::text("Registered Alice.")),
        ]);
        let mut log = SessionLog::new("prompt");

        let reply = orchestrator.run_turn("s-1", &mut log, "sign me up").await.expect("turn");

        assert_eq!(reply, "Registered Alice.");
        let requests = script.requests.lock().expect("requests");
        assert_eq!(requests.len(), 2);
        assert!(requests[1].tools.is_empty());
        let roles: Vec<_> = log.messages().iter().map(ChatMessage::role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);
    }

    #[tokio::test]
    async fn failed_invocation_short_circuits_the_summary() {
        let (orchestrator, script) = orchestrator(vec![Ok(ModelReply::tools(vec![
            call("call_1", "get_order_status", r#"{"order_id":"missing"}"#),
            call("call_2", "refund_order", "{}"),
        ]))]);
        let mut log = SessionLog::new("prompt");

        let reply = orchestrator.run_turn("s-1", &mut log, "status?").await.expect("turn");

        assert_eq!(
            reply,
            "Error while performing the requested action: get_order_status: order `missing` not \
             found | refund_order: Unknown tool refund_order"
        );
        assert_eq!(script.requests.lock().expect("requests").len(), 1);
        assert_eq!(log.last(), Some(&ChatMessage::assistant(reply.clone())));
    }

    #[tokio::test]
    async fn model_failure_is_reported_as_unavailable() {
        let (orchestrator, _) =
            orchestrator(vec![Err(LlmError::Unauthorized("bad key".to_string()))]);
        let mut log = SessionLog::new("prompt");

        let error = orchestrator.run_turn("s-1", &mut log, "hello").await.expect_err("model down");

        assert_eq!(error, ApplicationError::ModelUnavailable("unauthorized: bad key".to_string()));
    }

    #[tokio::test]
    async fn unconfigured_client_is_a_configuration_failure() {
        let (orchestrator, _) = orchestrator(vec![Err(LlmError::NotConfigured(
            "llm.api_key is not set".to_string(),
        ))]);
        let mut log = SessionLog::new("prompt");

        let error = orchestrator.run_turn("s-1", &mut log, "hello").await.expect_err("no key");

        assert_eq!(error, ApplicationError::Configuration("llm.api_key is not set".to_string()));
    }
}
