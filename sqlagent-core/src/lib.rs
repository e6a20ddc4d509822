//! # sqlagent core
//!
//! The collaborators the interactive SQL agent is assembled from.
//!
//! ## Core Concepts
//! - **Provider**: trait-based LLM communication (OpenAI-compatible chat completions)
//! - **Database**: a SQLite handle provisioned from a remote script or a local file
//! - **Toolkit**: the SQL tools the model may call (list, schema, query, check)
//! - **Prompt**: chat prompt templates resolved from a registry and formatted once

pub mod error;
pub mod provider;
pub mod database;
pub mod toolkit;
pub mod prompt;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderError,
    ChatMessage, Role, CompletionRequest, CompletionResponse,
    ToolDefinition, ToolCall, FinishReason, Usage, UsageTracker,
    OpenAIProvider,
};
pub use database::{DatabaseSource, SqlDatabase, CHINOOK_SCRIPT_URL};
pub use toolkit::{SqlTool, SqlToolkit};
pub use prompt::{MessageTemplate, PromptSource, PromptTemplate, SQL_AGENT_PROMPT_REPO};
