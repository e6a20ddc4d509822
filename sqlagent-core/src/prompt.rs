//! # Prompt templates
//!
//! Chat prompt templates with `{variable}` placeholders (`{{` and `}}`
//! escape literal braces). Templates are resolved once at start-up from the
//! LangChain Hub, a local file, or the built-in copy of the SQL agent
//! system prompt, and formatted into the single system message the agent
//! is constructed with.

use crate::error::{Error, ErrorKind, Result};
use crate::provider::{ChatMessage, Role};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Hub repository of the SQL agent system prompt
pub const SQL_AGENT_PROMPT_REPO: &str = "langchain-ai/sql-agent-system-prompt";

pub const DEFAULT_HUB_API_URL: &str = "https://api.hub.langchain.com";

const BUILTIN_SQL_AGENT_PROMPT: &str = "You are an agent designed to interact with a SQL database.
Given an input question, create a syntactically correct {dialect} query to run, then look at the results of the query and return the answer.
Unless the user specifies a specific number of examples they wish to obtain, always limit your query to at most {top_k} results.
You can order the results by a relevant column to return the most interesting examples in the database.
Never query for all the columns from a specific table, only ask for the relevant columns given the question.
You have access to tools for interacting with the database.
Only use the below tools. Only use the information returned by the below tools to construct your final answer.
You MUST double check your query before executing it. If you get an error while executing a query, rewrite the query and try again.

DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the database.

To start you should ALWAYS look at the tables in the database to see what you can query.
Do NOT skip this step.
Then you should query the schema of the most relevant tables.";

/// One role-tagged message of a chat template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub role: Role,
    pub template: String,
}

/// An ordered list of message templates and the variables they need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    messages: Vec<MessageTemplate>,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    /// Build a template, validating every placeholder.
    pub fn new(messages: Vec<MessageTemplate>) -> Result<Self> {
        let mut vars = BTreeSet::new();
        for message in &messages {
            vars.extend(placeholders(&message.template)?);
        }
        Ok(Self {
            messages,
            input_variables: vars.into_iter().collect(),
        })
    }

    pub fn system(template: impl Into<String>) -> Result<Self> {
        Self::new(vec![MessageTemplate {
            role: Role::System,
            template: template.into(),
        }])
    }

    /// The SQL agent system prompt shipped with the binary
    pub fn builtin_sql_agent() -> Self {
        Self {
            messages: vec![MessageTemplate {
                role: Role::System,
                template: BUILTIN_SQL_AGENT_PROMPT.to_string(),
            }],
            input_variables: vec!["dialect".to_string(), "top_k".to_string()],
        }
    }

    pub fn messages(&self) -> &[MessageTemplate] {
        &self.messages
    }

    /// Sorted, de-duplicated placeholder names
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Fail unless the template consists of exactly one message.
    pub fn single_message(self) -> Result<Self> {
        if self.messages.len() != 1 {
            return Err(Error::template_invalid(format!(
                "expected exactly one message, found {}",
                self.messages.len()
            ))
            .with_operation("prompt::single_message"));
        }
        Ok(self)
    }

    pub fn format_messages(&self, vars: &[(&str, &str)]) -> Result<Vec<ChatMessage>> {
        let missing: Vec<&str> = self
            .input_variables
            .iter()
            .filter(|v| !vars.iter().any(|(name, _)| name == v))
            .map(|v| v.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::template_invalid(format!(
                "missing variables: {}",
                missing.join(", ")
            ))
            .with_operation("prompt::format"));
        }

        self.messages
            .iter()
            .map(|m| {
                let content = substitute(&m.template, vars)?;
                Ok(match m.role {
                    Role::System => ChatMessage::system(content),
                    Role::User => ChatMessage::user(content),
                    Role::Assistant => ChatMessage::assistant(content),
                    Role::Tool => {
                        return Err(Error::template_invalid("tool messages cannot be templated"))
                    }
                })
            })
            .collect()
    }

    /// Format into a single string: one `Role: content` line group per
    /// message, joined by newlines.
    pub fn format(&self, vars: &[(&str, &str)]) -> Result<String> {
        let messages = self.format_messages(vars)?;
        let parts: Vec<String> = messages
            .iter()
            .map(|m| {
                let prefix = match m.role {
                    Role::System => "System",
                    Role::User => "Human",
                    Role::Assistant => "AI",
                    Role::Tool => "Tool",
                };
                format!("{}: {}", prefix, m.content.as_deref().unwrap_or(""))
            })
            .collect();
        Ok(parts.join("\n"))
    }

    /// Parse a LangChain serialized prompt (`ChatPromptTemplate` manifest).
    pub fn from_manifest(manifest: &serde_json::Value) -> Result<Self> {
        let class = lc_class(manifest);
        if class != Some("ChatPromptTemplate") {
            return Err(Error::new(
                ErrorKind::Unsupported,
                format!("unsupported prompt manifest type: {}", class.unwrap_or("<none>")),
            )
            .with_operation("prompt::from_manifest"));
        }

        let entries = manifest["kwargs"]["messages"]
            .as_array()
            .ok_or_else(|| Error::template_invalid("manifest has no messages"))?;

        let messages = entries
            .iter()
            .map(message_from_manifest)
            .collect::<Result<Vec<_>>>()?;
        Self::new(messages)
    }
}

fn lc_class(value: &serde_json::Value) -> Option<&str> {
    value["id"].as_array()?.last()?.as_str()
}

fn message_from_manifest(entry: &serde_json::Value) -> Result<MessageTemplate> {
    let class = lc_class(entry).unwrap_or("");
    let role = if class.starts_with("System") {
        Role::System
    } else if class.starts_with("Human") {
        Role::User
    } else if class.starts_with("AI") {
        Role::Assistant
    } else {
        return Err(Error::template_invalid(format!("unsupported message type: {}", class)));
    };

    let kwargs = &entry["kwargs"];
    let template = if let Some(template) = kwargs["prompt"]["kwargs"]["template"].as_str() {
        template.to_string()
    } else if let Some(content) = kwargs["content"].as_str() {
        // A literal message: its braces are not placeholders
        content.replace('{', "{{").replace('}', "}}")
    } else {
        return Err(Error::template_invalid(format!("message {} has no template", class)));
    };
    Ok(MessageTemplate { role, template })
}

/// Walk a template, handing literal text and placeholder names to `visit`.
fn scan<'a>(template: &'a str, mut visit: impl FnMut(Segment<'a>) -> Result<()>) -> Result<()> {
    let invalid = |msg: &str| Error::template_invalid(msg.to_string()).with_operation("prompt::parse");
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        visit(Segment::Literal(&rest[..pos]))?;
        let tail = &rest[pos..];
        if tail.starts_with("{{") {
            visit(Segment::Literal("{"))?;
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            visit(Segment::Literal("}"))?;
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return Err(invalid("single '}' encountered in template"));
        } else {
            let end = tail.find('}').ok_or_else(|| invalid("unclosed '{' in template"))?;
            let field = &tail[1..end];
            let name = field.split([':', '!']).next().unwrap_or("");
            if name.is_empty() {
                return Err(invalid("positional placeholders are not supported"));
            }
            visit(Segment::Variable(name))?;
            rest = &tail[end + 1..];
        }
    }
    visit(Segment::Literal(rest))
}

enum Segment<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

fn placeholders(template: &str) -> Result<Vec<String>> {
    let mut vars = Vec::new();
    scan(template, |segment| {
        if let Segment::Variable(name) = segment {
            vars.push(name.to_string());
        }
        Ok(())
    })?;
    Ok(vars)
}

fn substitute(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    scan(template, |segment| {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Variable(name) => {
                let value = vars
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| Error::template_invalid(format!("missing variable: {}", name)))?;
                out.push_str(value);
            }
        }
        Ok(())
    })?;
    Ok(out)
}

/// Where the system prompt template comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// LangChain Hub commit API
    Hub {
        api_url: String,
        owner_repo: String,
        api_key: Option<String>,
    },
    /// A local file: a serialized manifest (JSON) or a plain system template
    File(PathBuf),
    Builtin,
}

impl PromptSource {
    pub fn hub(repo: impl Into<String>) -> Self {
        PromptSource::Hub {
            api_url: DEFAULT_HUB_API_URL.to_string(),
            owner_repo: repo.into(),
            api_key: None,
        }
    }

    pub async fn resolve(&self) -> Result<PromptTemplate> {
        match self {
            PromptSource::Builtin => Ok(PromptTemplate::builtin_sql_agent()),
            PromptSource::File(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::prompt_unavailable(format!("cannot read prompt file: {}", e))
                        .with_operation("prompt::resolve")
                        .with_context("path", path.display().to_string())
                        .set_source(e)
                })?;
                parse_prompt_file(&text)
            }
            PromptSource::Hub { api_url, owner_repo, api_key } => {
                fetch_hub_manifest(api_url, owner_repo, api_key.as_deref()).await
            }
        }
    }
}

fn parse_prompt_file(text: &str) -> Result<PromptTemplate> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if value.is_object() => {
            let manifest = value.get("manifest").unwrap_or(&value);
            PromptTemplate::from_manifest(manifest)
        }
        _ => PromptTemplate::system(text.trim_end()),
    }
}

async fn fetch_hub_manifest(api_url: &str, repo: &str, api_key: Option<&str>) -> Result<PromptTemplate> {
    let url = format!("{}/commits/{}/latest", api_url.trim_end_matches('/'), repo);
    tracing::info!(%url, "pulling prompt template");

    let unavailable = |e: reqwest::Error| {
        Error::prompt_unavailable(format!("failed to pull prompt: {}", e))
            .with_operation("prompt::fetch_hub_manifest")
            .with_context("repo", repo)
            .set_source(e)
    };

    let mut request = reqwest::Client::new().get(&url);
    if let Some(key) = api_key {
        request = request.header("x-api-key", key);
    }
    let body: serde_json::Value = request
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(unavailable)?
        .json()
        .await
        .map_err(unavailable)?;

    let manifest = body.get("manifest").ok_or_else(|| {
        Error::prompt_unavailable("hub response has no manifest").with_context("repo", repo)
    })?;
    PromptTemplate::from_manifest(manifest).map_err(|e| e.with_context("repo", repo))
}
