//! # sqlagent agent
//!
//! The agent drives the LLM <-> database loop:
//! 1. The user types a natural-language question
//! 2. The model decides which SQL tools to call
//! 3. The toolkit runs them against the database
//! 4. Tool results go back to the model
//! 5. Repeat until the model answers without calling a tool
//!
//! Every intermediate state is emitted as a [`QueryEvent`], and the
//! [`SessionLoop`] renders the newest message of each one as it arrives.

mod agent;
mod session;

pub use agent::{AgentConfig, AgentRuntime, EventStream, QueryEvent, ReactAgent};
pub use session::{
    is_quit_command, ExitReason, Session, SessionLoop, SessionOptions, SessionSummary,
    TurnOutcome, EXIT_MESSAGE, QUERY_PROMPT,
};
