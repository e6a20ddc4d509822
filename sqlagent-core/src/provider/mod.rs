//! # LLM Provider Interface
//!
//! A trait-based abstraction for talking to a chat-completions backend with
//! tool calling.
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface
//! - `OpenAIProvider` covers OpenAI and every OpenAI-compatible server
//! - `ChatMessage` is also the unit of conversation history and rendering
//! - Usage tracking across calls

pub mod openai;

pub use openai::OpenAIProvider;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Width of the `=== Title ===` bar in rendered messages.
const TITLE_WIDTH: usize = 80;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool that produced a tool-role message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// An assistant turn that requests tool invocations
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    /// Tool calls requested by this message (empty for non-assistant roles)
    pub fn requested_tools(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    /// Human-readable block: a title bar for the role, then the content.
    ///
    /// Tool calls are listed as an itemized sub-block, one line per argument.
    pub fn pretty_repr(&self) -> String {
        let mut out = title_bar(&format!("{} Message", self.role.title()));
        if let Some(name) = &self.name {
            out.push_str("\nName: ");
            out.push_str(name);
        }
        out.push_str("\n\n");
        out.push_str(self.content.as_deref().unwrap_or(""));

        let tool_calls = self.requested_tools();
        if tool_calls.is_empty() {
            return out;
        }

        let mut lines = vec!["Tool Calls:".to_string()];
        for tc in tool_calls {
            lines.push(format!("  {} ({})", tc.name, tc.id));
            lines.push(format!(" Call ID: {}", tc.id));
            match serde_json::from_str::<serde_json::Value>(&tc.arguments) {
                Ok(serde_json::Value::Object(args)) => {
                    if !args.is_empty() {
                        lines.push("  Args:".to_string());
                        for (key, value) in &args {
                            let value = match value {
                                serde_json::Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            lines.push(format!("    {}: {}", key, value));
                        }
                    }
                }
                _ if tc.arguments.trim().is_empty() => {}
                _ => {
                    lines.push("  Args:".to_string());
                    lines.push(format!("    {}", tc.arguments));
                }
            }
        }

        format!("{}\n{}", out.trim(), lines.join("\n")).trim().to_string()
    }
}

/// Center `title` in a bar of `=` characters.
fn title_bar(title: &str) -> String {
    let padded = format!(" {} ", title);
    let sep_len = TITLE_WIDTH.saturating_sub(padded.len()) / 2;
    let sep = "=".repeat(sep_len);
    let second_sep = if padded.len() % 2 == 1 { format!("{}=", sep) } else { sep.clone() };
    format!("{}{}{}", sep, padded, second_sep)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Display name used in rendered message titles
    pub fn title(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "Human",
            Role::Assistant => "Ai",
            Role::Tool => "Tool",
        }
    }
}

/// A tool/function that the model can call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as sent by the model
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: Option<f32>) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl CompletionResponse {
    /// The assistant message this response contributes to the conversation
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::assistant_tool_calls(self.content, self.tool_calls)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    pub fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Error type for provider operations
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Rate limited
    RateLimited { retry_after: Option<u64> },
    /// Invalid request
    InvalidRequest(String),
    /// Authentication failed
    AuthenticationFailed,
    /// Other error
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after {
                    write!(f, " (retry after {}s)", secs)?;
                }
                Ok(())
            }
            Self::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            Self::AuthenticationFailed => write!(f, "Authentication failed"),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

/// The main LLM provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider {
    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Simple prompt -> response helper
    async fn prompt(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]);
        let response = self.complete(request).await?;
        response.content.ok_or_else(|| ProviderError::Other("No content in response".into()))
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: Some("https://api.openai.com/v1".into()),
            default_model: Some("gpt-4o-mini".into()),
            timeout_secs: Some(120),
        }
    }

    /// Any OpenAI-compatible server without authentication (vLLM, Ollama, ...)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            timeout_secs: Some(300),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Tracks token usage across multiple calls
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    pub total_calls: usize,
    pub total_prompt_tokens: usize,
    pub total_completion_tokens: usize,
    pub by_model: HashMap<String, Usage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, model: &str, usage: &Usage) {
        self.total_calls += 1;
        self.total_prompt_tokens += usage.prompt_tokens;
        self.total_completion_tokens += usage.completion_tokens;

        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.total_tokens += usage.total_tokens;
    }

    pub fn total_tokens(&self) -> usize {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_bar_is_centered() {
        let bar = title_bar("Human Message");
        assert_eq!(bar.len(), TITLE_WIDTH);
        assert_eq!(
            bar,
            "================================ Human Message ================================="
        );

        let bar = title_bar("Ai Message");
        assert_eq!(bar.len(), TITLE_WIDTH);
        assert!(bar.starts_with("================================== Ai Message"));
    }

    #[test]
    fn test_pretty_repr_user() {
        let msg = ChatMessage::user("list the tables");
        let text = msg.pretty_repr();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().contains(" Human Message "));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some("list the tables"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_pretty_repr_tool_calls_are_itemized() {
        let msg = ChatMessage::assistant_tool_calls(
            None,
            vec![ToolCall::new("call_1", "sql_db_query", r#"{"query":"SELECT 1"}"#)],
        );
        let text = msg.pretty_repr();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains(" Ai Message "));
        assert_eq!(
            &lines[1..],
            &[
                "Tool Calls:",
                "  sql_db_query (call_1)",
                " Call ID: call_1",
                "  Args:",
                "    query: SELECT 1",
            ]
        );
    }

    #[test]
    fn test_pretty_repr_tool_result_has_name() {
        let msg = ChatMessage::tool_result("call_1", "sql_db_list_tables", "Album, Artist");
        let text = msg.pretty_repr();
        assert!(text.contains(" Tool Message "));
        assert!(text.contains("\nName: sql_db_list_tables\n\nAlbum, Artist"));
    }

    #[test]
    fn test_pretty_repr_raw_arguments() {
        let msg = ChatMessage::assistant_tool_calls(
            Some("checking".into()),
            vec![ToolCall::new("c", "sql_db_schema", "Album")],
        );
        let text = msg.pretty_repr();
        assert!(text.contains("checking\nTool Calls:"));
        assert!(text.ends_with("  Args:\n    Album"));
    }

    #[test]
    fn test_empty_tool_calls_collapse_to_none() {
        let msg = ChatMessage::assistant_tool_calls(Some("done".into()), vec![]);
        assert!(msg.tool_calls.is_none());
        assert!(msg.requested_tools().is_empty());
    }

    #[test]
    fn test_tool_definition() {
        let tool = ToolDefinition::new("sql_db_query", "Run a query")
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" }
                },
                "required": ["query"]
            }));

        assert_eq!(tool.name, "sql_db_query");
        assert!(tool.parameters["properties"]["query"].is_object());
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Hello")])
            .with_model("gpt-4o-mini")
            .with_temperature(Some(0.0))
            .with_tools(vec![]);

        assert_eq!(request.model, Some("gpt-4o-mini".into()));
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.tools.is_none());
    }

    #[test]
    fn test_finish_reason_from_api() {
        assert_eq!(FinishReason::from_api(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_api(None), FinishReason::Unknown);
    }

    #[test]
    fn test_usage_tracker() {
        let mut tracker = UsageTracker::new();

        tracker.track("gpt-4o-mini", &Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        });

        tracker.track("gpt-4o-mini", &Usage {
            prompt_tokens: 200,
            completion_tokens: 100,
            total_tokens: 300,
        });

        assert_eq!(tracker.total_calls, 2);
        assert_eq!(tracker.total_tokens(), 450);
        assert_eq!(tracker.by_model["gpt-4o-mini"].total_tokens, 450);
    }
}
