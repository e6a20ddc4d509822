//! ReAct runtime - alternates model calls and SQL tool calls

use futures_core::Stream;
use futures_util::stream::LocalBoxStream;
use sqlagent_core::error::provider_failed;
use sqlagent_core::{
    ChatMessage, CompletionRequest, LlmProvider, SqlToolkit, ToolDefinition, UsageTracker,
};
use sqlagent_error::{Error, Result};
use std::cell::RefCell;
use std::sync::Arc;

/// Snapshot of the conversation after one step of a turn.
///
/// Carries the full message list, not a diff.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEvent {
    pub messages: Vec<ChatMessage>,
}

impl QueryEvent {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// The newest message, the one a renderer shows
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Lazy, finite sequence of events produced by one submission
pub type EventStream<'a> = LocalBoxStream<'a, Result<QueryEvent>>;

/// Anything that turns a conversation into a stream of events
pub trait AgentRuntime {
    fn stream(&self, messages: Vec<ChatMessage>) -> EventStream<'_>;
}

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model override, `None` uses the provider default
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// Model calls allowed per turn
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            max_steps: 25,
        }
    }
}

/// Tool-calling agent over a SQL toolkit
pub struct ReactAgent<P> {
    system_prompt: String,
    toolkit: SqlToolkit<P>,
    llm: Arc<P>,
    config: AgentConfig,
    usage: RefCell<UsageTracker>,
}

impl<P: LlmProvider> ReactAgent<P> {
    pub fn new(system_prompt: impl Into<String>, toolkit: SqlToolkit<P>, llm: Arc<P>) -> Self {
        Self::with_config(system_prompt, toolkit, llm, AgentConfig::default())
    }

    pub fn with_config(
        system_prompt: impl Into<String>,
        toolkit: SqlToolkit<P>,
        llm: Arc<P>,
        config: AgentConfig,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            toolkit,
            llm,
            config,
            usage: RefCell::new(UsageTracker::new()),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn toolkit(&self) -> &SqlToolkit<P> {
        &self.toolkit
    }

    /// Token usage accumulated over every model call so far
    pub fn usage(&self) -> UsageTracker {
        self.usage.borrow().clone()
    }

    fn events(&self, messages: Vec<ChatMessage>) -> impl Stream<Item = Result<QueryEvent>> + '_ {
        async_stream::try_stream! {
            let mut state = messages;
            yield QueryEvent::new(state.clone());

            let tools = self.toolkit.definitions();
            let mut steps = 0;
            loop {
                if steps >= self.config.max_steps {
                    Err::<(), Error>(Error::step_limit_exceeded(self.config.max_steps))?;
                }
                steps += 1;

                let reply = self.call_model(&state, &tools).await?;
                let requested = reply.requested_tools().to_vec();
                tracing::debug!(step = steps, tool_calls = requested.len(), "model replied");
                state.push(reply);
                yield QueryEvent::new(state.clone());

                if requested.is_empty() {
                    break;
                }

                for call in &requested {
                    state.push(self.toolkit.invoke(call).await);
                }
                yield QueryEvent::new(state.clone());
            }
        }
    }

    async fn call_model(&self, state: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ChatMessage> {
        let mut messages = Vec::with_capacity(state.len() + 1);
        messages.push(ChatMessage::system(&self.system_prompt));
        messages.extend_from_slice(state);

        let mut request = CompletionRequest::new(messages)
            .with_temperature(self.config.temperature)
            .with_tools(tools.to_vec());
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }

        let response = self.llm.complete(request).await.map_err(provider_failed)?;
        self.usage.borrow_mut().track(&response.model, &response.usage);
        Ok(response.into_message())
    }
}

impl<P: LlmProvider> AgentRuntime for ReactAgent<P> {
    fn stream(&self, messages: Vec<ChatMessage>) -> EventStream<'_> {
        Box::pin(self.events(messages))
    }
}
