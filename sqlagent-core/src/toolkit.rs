//! # SQL Toolkit
//!
//! The tools the agent may call against the database. Every invocation
//! produces a tool-role message; failures are reported in that message so
//! the model can correct itself instead of aborting the turn.

use crate::database::SqlDatabase;
use crate::error::{self, Error, Result};
use crate::provider::{ChatMessage, LlmProvider, ToolCall, ToolDefinition};
use std::sync::Arc;

const QUERY_CHECKER_PROMPT: &str = "{query}
Double check the {dialect} query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

Output the final SQL query only.

SQL Query: ";

/// One of the SQL tools exposed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTool {
    Query,
    Schema,
    ListTables,
    QueryChecker,
}

impl SqlTool {
    pub const ALL: [SqlTool; 4] = [
        SqlTool::Query,
        SqlTool::Schema,
        SqlTool::ListTables,
        SqlTool::QueryChecker,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SqlTool::Query => "sql_db_query",
            SqlTool::Schema => "sql_db_schema",
            SqlTool::ListTables => "sql_db_list_tables",
            SqlTool::QueryChecker => "sql_db_query_checker",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// The single argument each tool takes
    fn argument(&self) -> &'static str {
        match self {
            SqlTool::Query | SqlTool::QueryChecker => "query",
            SqlTool::Schema => "table_names",
            SqlTool::ListTables => "tool_input",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SqlTool::Query => {
                "Input to this tool is a detailed and correct SQL query, output is a result from the database. \
                 If the query is not correct, an error message will be returned. \
                 If an error is returned, rewrite the query, check the query, and try again. \
                 If you encounter an issue with Unknown column 'xxxx' in 'field list', \
                 use sql_db_schema to query the correct table fields."
            }
            SqlTool::Schema => {
                "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. \
                 Be sure that the tables actually exist by calling sql_db_list_tables first! \
                 Example Input: table1, table2, table3"
            }
            SqlTool::ListTables => {
                "Input is an empty string, output is a comma-separated list of tables in the database."
            }
            SqlTool::QueryChecker => {
                "Use this tool to double check if your query is correct before executing it. \
                 Always use this tool before executing a query with sql_db_query!"
            }
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, required) = match self {
            SqlTool::Query => ("A detailed and correct SQL query.", true),
            SqlTool::QueryChecker => ("A detailed and SQL query to be checked.", true),
            SqlTool::Schema => (
                "A comma-separated list of the table names for which to return the schema. \
                 Example input: 'table1, table2, table3'",
                true,
            ),
            SqlTool::ListTables => ("An empty string", false),
        };
        let arg = self.argument();
        ToolDefinition::new(self.name(), self.description()).with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                arg: { "type": "string", "description": description }
            },
            "required": if required { vec![arg] } else { vec![] }
        }))
    }

    /// Pull this tool's argument out of the raw call arguments. A bare JSON
    /// string, or non-JSON text, is taken as the argument itself.
    fn extract_argument(&self, raw: &str) -> Result<String> {
        let arg = self.argument();
        let extracted = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => match map.get(arg) {
                Some(serde_json::Value::String(s)) => Ok(s.clone()),
                Some(other) => Ok(other.to_string()),
                None if *self == SqlTool::ListTables => Ok(String::new()),
                None => Err(Error::invalid_argument(format!("missing argument '{}'", arg))),
            },
            Ok(serde_json::Value::String(s)) => Ok(s),
            Ok(serde_json::Value::Null) => Ok(String::new()),
            _ if raw.trim().is_empty() && *self == SqlTool::ListTables => Ok(String::new()),
            Ok(_) | Err(_) => Ok(raw.to_string()),
        };
        extracted.map_err(|e| e.with_context("tool", self.name()))
    }
}

/// The database plus LLM handle, packaged as callable tools
pub struct SqlToolkit<P> {
    db: Arc<SqlDatabase>,
    llm: Arc<P>,
}

impl<P: LlmProvider> SqlToolkit<P> {
    pub fn new(db: Arc<SqlDatabase>, llm: Arc<P>) -> Self {
        Self { db, llm }
    }

    pub fn database(&self) -> &SqlDatabase {
        &self.db
    }

    pub fn tools(&self) -> &'static [SqlTool] {
        &SqlTool::ALL
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools().iter().map(SqlTool::definition).collect()
    }

    /// Run a tool call and wrap the outcome as the matching tool message.
    pub async fn invoke(&self, call: &ToolCall) -> ChatMessage {
        let content = match SqlTool::from_name(&call.name) {
            None => {
                tracing::warn!(tool = %call.name, "model requested an unknown tool");
                let valid = self.tools().iter().map(|t| t.name()).collect::<Vec<_>>();
                let err = Error::tool_unknown(&call.name, &valid).with_operation("toolkit::invoke");
                format!("Error: {}", err.message())
            }
            Some(tool) => {
                tracing::debug!(tool = tool.name(), args = %call.arguments, "invoking tool");
                match self.call(tool, &call.arguments).await {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::debug!(tool = tool.name(), error = %e, "tool failed");
                        format!("Error: {}\n Please fix your mistakes.", e.message())
                    }
                }
            }
        };
        ChatMessage::tool_result(call.id.clone(), call.name.clone(), content)
    }

    /// Run `tool` with raw JSON arguments.
    pub async fn call(&self, tool: SqlTool, raw_arguments: &str) -> Result<String> {
        let arg = tool.extract_argument(raw_arguments)?;
        match tool {
            SqlTool::Query => Ok(self.db.run_no_throw(&arg)),
            SqlTool::Schema => {
                let names: Vec<String> = arg
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                Ok(self.db.table_info_no_throw(Some(&names)))
            }
            SqlTool::ListTables => Ok(self.db.table_names()?.join(", ")),
            SqlTool::QueryChecker => self.check_query(&arg).await,
        }
    }

    async fn check_query(&self, query: &str) -> Result<String> {
        let prompt = QUERY_CHECKER_PROMPT
            .replace("{dialect}", self.db.dialect())
            .replacen("{query}", query, 1);
        self.llm
            .prompt(&prompt)
            .await
            .map_err(|e| error::provider_failed(e).with_operation("toolkit::check_query"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, ProviderError, Role, Usage};
    use std::sync::Mutex;

    /// Answers every prompt with a fixed reply and remembers what it was asked
    struct FixedProvider {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedProvider {
        fn new(reply: Option<&str>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn default_model(&self) -> &str {
            "fixed-model"
        }

        async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
            let prompt = request.messages.last().and_then(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            match &self.reply {
                Some(reply) => Ok(CompletionResponse {
                    id: "1".into(),
                    model: "fixed-model".into(),
                    content: Some(reply.clone()),
                    tool_calls: vec![],
                    finish_reason: FinishReason::Stop,
                    usage: Usage::default(),
                }),
                None => Err(ProviderError::Network("connection refused".into())),
            }
        }
    }

    fn toolkit(reply: Option<&str>) -> SqlToolkit<FixedProvider> {
        let db = SqlDatabase::from_script(
            "CREATE TABLE Artist (ArtistId INTEGER, Name TEXT);
             CREATE TABLE Album (AlbumId INTEGER, Title TEXT);
             INSERT INTO Artist VALUES (1, 'AC/DC');",
        )
        .unwrap();
        SqlToolkit::new(Arc::new(db), Arc::new(FixedProvider::new(reply)))
    }

    fn call(name: &str, args: &str) -> ToolCall {
        ToolCall::new("call_1", name, args)
    }

    #[test]
    fn test_definitions() {
        let defs = toolkit(None).definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["sql_db_query", "sql_db_schema", "sql_db_list_tables", "sql_db_query_checker"]
        );
        assert_eq!(defs[1].parameters["required"][0], "table_names");
        assert!(defs[2].parameters["required"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_list_tables() {
        let msg = tokio_test::block_on(toolkit(None).invoke(&call("sql_db_list_tables", "{}")));
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.name.as_deref(), Some("sql_db_list_tables"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.content.as_deref(), Some("Album, Artist"));
    }

    #[test]
    fn test_query_and_query_error() {
        let kit = toolkit(None);
        let ok = tokio_test::block_on(kit.invoke(&call("sql_db_query", r#"{"query":"SELECT Name FROM Artist"}"#)));
        assert_eq!(ok.content.as_deref(), Some("[('AC/DC',)]"));

        let bad = tokio_test::block_on(kit.invoke(&call("sql_db_query", r#"{"query":"SELECT Nmae FROM Artist"}"#)));
        assert!(bad.content.unwrap().starts_with("Error: no such column"));
    }

    #[test]
    fn test_schema_splits_names() {
        let msg = tokio_test::block_on(toolkit(None).invoke(&call("sql_db_schema", r#"{"table_names":" Artist , "}"#)));
        let content = msg.content.unwrap();
        assert!(content.contains("CREATE TABLE Artist"));
        assert!(!content.contains("CREATE TABLE Album"));
    }

    #[test]
    fn test_missing_argument_is_reported() {
        let msg = tokio_test::block_on(toolkit(None).invoke(&call("sql_db_query", r#"{"sql":"SELECT 1"}"#)));
        assert_eq!(
            msg.content.as_deref(),
            Some("Error: missing argument 'query'\n Please fix your mistakes.")
        );
    }

    #[test]
    fn test_raw_string_argument() {
        let msg = tokio_test::block_on(toolkit(None).invoke(&call("sql_db_schema", "Album")));
        assert!(msg.content.unwrap().contains("CREATE TABLE Album"));
    }

    #[test]
    fn test_unknown_tool() {
        let msg = tokio_test::block_on(toolkit(None).invoke(&call("drop_everything", "{}")));
        let content = msg.content.unwrap();
        assert!(content.starts_with("Error: drop_everything is not a valid tool"));
        assert_eq!(
            content,
            "Error: drop_everything is not a valid tool, try one of \
             [sql_db_query, sql_db_schema, sql_db_list_tables, sql_db_query_checker]."
        );
    }

    #[test]
    fn test_query_checker_uses_llm() {
        let kit = toolkit(Some("SELECT Name FROM Artist LIMIT 5"));
        let msg = tokio_test::block_on(kit.invoke(&call("sql_db_query_checker", r#"{"query":"SELECT Name FROM Artist"}"#)));
        assert_eq!(msg.content.as_deref(), Some("SELECT Name FROM Artist LIMIT 5"));

        let prompts = kit.llm.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("SELECT Name FROM Artist\nDouble check the sqlite query above"));
    }

    #[test]
    fn test_query_checker_llm_failure() {
        let msg = tokio_test::block_on(toolkit(None).invoke(&call("sql_db_query_checker", r#"{"query":"SELECT 1"}"#)));
        assert!(msg.content.unwrap().starts_with("Error: Network error: connection refused"));
    }
}
