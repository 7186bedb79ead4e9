use std::sync::Arc;

use tracing::{info, warn};

use ordermate_core::config::{AppConfig, LlmConfig};
use ordermate_core::errors::ApplicationError;
use ordermate_db::RecordStore;

use crate::conversation::Orchestrator;
use crate::llm::{LlmClient, LlmError};
use crate::locks::KeyedLocks;
use crate::openai::OpenAiClient;
use crate::prompt::SYSTEM_PROMPT;
use crate::session::SessionStore;
use crate::tools::ToolRegistry;

pub const LLM_NOT_CONFIGURED_REPLY: &str =
    "LLM client not initialized. Set ORDERMATE_LLM_API_KEY.";

/// Entry point for transports: one call per user message.
#[derive(Clone)]
pub struct AgentRuntime {
    sessions: SessionStore,
    orchestrator: Option<Orchestrator>,
    tools: ToolRegistry,
    store: RecordStore,
}

impl AgentRuntime {
    pub fn new(store: RecordStore, llm: Option<Arc<dyn LlmClient>>, config: &AppConfig) -> Self {
        let tools = ToolRegistry::for_store(&store, KeyedLocks::new());
        let orchestrator = llm.map(|llm| {
            Orchestrator::new(llm, tools.clone(), config.llm.temperature, config.llm.max_tokens)
        });

        Self {
            sessions: SessionStore::new(SYSTEM_PROMPT, &config.session),
            orchestrator,
            tools,
            store,
        }
    }

    /// Runs one turn for `session_id`. Turns on the same session queue behind
    /// each other.
    pub async fn handle_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<String, ApplicationError> {
        let Some(orchestrator) = &self.orchestrator else {
            warn!(
                event_name = "agent.llm.not_configured",
                session_id,
                "message received without a configured model"
            );
            return Ok(LLM_NOT_CONFIGURED_REPLY.to_string());
        };

        let session = self.sessions.session(session_id);
        let mut log = session.lock().await;
        orchestrator.run_turn(session_id, &mut log, message).await
    }

    pub fn is_llm_configured(&self) -> bool {
        self.orchestrator.is_some()
    }

    pub fn model(&self) -> Option<&str> {
        self.orchestrator.as_ref().map(Orchestrator::model)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// Builds the model client, or `None` when no credentials are configured.
pub fn llm_from_config(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>, LlmError> {
    if !config.is_configured() {
        return Ok(None);
    }

    let client = OpenAiClient::new(config)?;
    info!(
        event_name = "agent.llm.configured",
        provider = ?config.provider,
        model = %config.model,
        "language model client ready"
    );
    Ok(Some(Arc::new(client)))
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use ordermate_core::config::{AppConfig, LlmProvider};
    use ordermate_db::RecordStore;

    use super::{llm_from_config, AgentRuntime, LLM_NOT_CONFIGURED_REPLY};

    #[tokio::test]
    async fn runtime_without_model_replies_with_setup_hint() {
        let runtime = AgentRuntime::new(RecordStore::in_memory(), None, &AppConfig::default());

        let reply = runtime.handle_message("s-1", "hello").await.expect("reply");

        assert_eq!(reply, LLM_NOT_CONFIGURED_REPLY);
        assert!(!runtime.is_llm_configured());
        assert!(runtime.sessions().is_empty());
    }

    #[test]
    fn llm_is_built_only_with_credentials() {
        let mut config = AppConfig::default();
        assert!(llm_from_config(&config.llm).expect("build").is_none());

        config.llm.api_key = Some(SecretString::from("sk-test".to_string()));
        let client = llm_from_config(&config.llm).expect("build").expect("configured");
        assert_eq!(client.model(), config.llm.model);

        config.llm.api_key = None;
        config.llm.provider = LlmProvider::Ollama;
        assert!(llm_from_config(&config.llm).expect("build").is_some());
    }
}
