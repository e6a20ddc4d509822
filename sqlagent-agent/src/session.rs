//! Interactive query loop
//!
//! Reads one line at a time, submits it to an [`AgentRuntime`], and renders
//! the newest message of every event the runtime emits, in order, before
//! asking for the next query.

use crate::agent::AgentRuntime;
use futures_util::StreamExt;
use sqlagent_core::ChatMessage;
use sqlagent_error::{Error, Result};
use std::io::{BufRead, Write};

pub const QUERY_PROMPT: &str = "Enter your query (or 'q' to quit): ";
pub const EXIT_MESSAGE: &str = "Exiting...";

/// True for `q` in any case, ignoring surrounding whitespace.
pub fn is_quit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}

/// Conversation context that outlives a single turn
#[derive(Debug, Clone, Default)]
pub struct Session {
    history: Vec<ChatMessage>,
    terminated: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Submit earlier turns along with each new query. When off, every
    /// query starts from an empty conversation.
    pub carry_history: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { carry_history: true }
    }
}

#[derive(Debug)]
pub enum TurnOutcome {
    Completed { events: usize },
    /// The stream failed after `events` were rendered
    Failed { events: usize, error: Error },
}

impl TurnOutcome {
    pub fn events(&self) -> usize {
        match self {
            TurnOutcome::Completed { events } | TurnOutcome::Failed { events, .. } => *events,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    EndOfInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub turns: usize,
    pub failed_turns: usize,
    pub exit: ExitReason,
}

/// Drives a runtime from a line-oriented reader and writes rendered
/// messages to `output`.
pub struct SessionLoop<'a, A, R, W> {
    runtime: &'a A,
    input: R,
    output: W,
    session: Session,
    options: SessionOptions,
}

impl<'a, A: AgentRuntime, R: BufRead, W: Write> SessionLoop<'a, A, R, W> {
    pub fn new(runtime: &'a A, input: R, output: W) -> Self {
        Self::with_options(runtime, input, output, SessionOptions::default())
    }

    pub fn with_options(runtime: &'a A, input: R, output: W, options: SessionOptions) -> Self {
        Self {
            runtime,
            input,
            output,
            session: Session::new(),
            options,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Loop until the user quits or input runs out.
    ///
    /// Turn failures are rendered and survived; only a failure to write
    /// output ends the loop with an error.
    pub async fn run(&mut self) -> Result<SessionSummary> {
        let mut turns = 0;
        let mut failed_turns = 0;

        let exit = loop {
            write!(self.output, "{}", QUERY_PROMPT).map_err(output_failed)?;
            self.output.flush().map_err(output_failed)?;

            let Some(line) = self.read_line() else {
                tracing::debug!("input closed");
                break ExitReason::EndOfInput;
            };

            if is_quit_command(&line) {
                writeln!(self.output, "{}", EXIT_MESSAGE).map_err(output_failed)?;
                break ExitReason::Quit;
            }

            turns += 1;
            if let TurnOutcome::Failed { .. } = self.run_turn(line).await? {
                failed_turns += 1;
            }
        };

        self.session.terminated = true;
        Ok(SessionSummary { turns, failed_turns, exit })
    }

    /// Submit one query and render every event of the resulting stream.
    pub async fn run_turn(&mut self, query: impl Into<String>) -> Result<TurnOutcome> {
        let mut messages = if self.options.carry_history {
            self.session.history.clone()
        } else {
            Vec::new()
        };
        messages.push(ChatMessage::user(query));

        let runtime = self.runtime;
        let mut stream = runtime.stream(messages);
        let mut events = 0;
        let mut state = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    events += 1;
                    if let Some(message) = event.last() {
                        writeln!(self.output, "{}", message.pretty_repr()).map_err(output_failed)?;
                    }
                    state = Some(event.messages);
                }
                Err(error) => {
                    tracing::warn!(%error, events, "turn failed");
                    writeln!(self.output, "Error: {}", error.message()).map_err(output_failed)?;
                    self.output.flush().map_err(output_failed)?;
                    return Ok(TurnOutcome::Failed { events, error });
                }
            }
        }

        // A failed turn leaves the history untouched so no dangling tool
        // call is ever replayed to the model.
        if let Some(state) = state {
            self.session.history = state;
        }
        self.output.flush().map_err(output_failed)?;
        Ok(TurnOutcome::Completed { events })
    }

    /// Next line without its terminator. `None` on end of input or a read
    /// error, both of which end the session.
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Some(line)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read input");
                None
            }
        }
    }
}

fn output_failed(err: std::io::Error) -> Error {
    Error::from(err).with_operation("session::render")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{EventStream, QueryEvent};
    use sqlagent_core::{Role, ToolCall};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Plays back one scripted event list per submission
    struct ScriptedRuntime {
        turns: RefCell<VecDeque<Vec<Result<QueryEvent>>>>,
        submissions: RefCell<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedRuntime {
        fn new(turns: Vec<Vec<Result<QueryEvent>>>) -> Self {
            Self {
                turns: RefCell::new(turns.into()),
                submissions: RefCell::new(Vec::new()),
            }
        }

        /// `count` turns that each answer with `reply`
        fn echo(count: usize, reply: &str) -> Self {
            Self::new((0..count).map(|_| vec![event(ChatMessage::assistant(reply))]).collect())
        }

        fn submissions(&self) -> Vec<Vec<ChatMessage>> {
            self.submissions.borrow().clone()
        }
    }

    impl AgentRuntime for ScriptedRuntime {
        fn stream(&self, messages: Vec<ChatMessage>) -> EventStream<'_> {
            self.submissions.borrow_mut().push(messages.clone());
            let scripted = self.turns.borrow_mut().pop_front().unwrap_or_default();
            // Prefix the submitted conversation so events carry full state
            let events: Vec<Result<QueryEvent>> = scripted
                .into_iter()
                .map(|item| {
                    item.map(|event| {
                        let mut full = messages.clone();
                        full.extend(event.messages);
                        QueryEvent::new(full)
                    })
                })
                .collect();
            Box::pin(futures_util::stream::iter(events))
        }
    }

    fn event(message: ChatMessage) -> Result<QueryEvent> {
        Ok(QueryEvent::new(vec![message]))
    }

    async fn run(runtime: &ScriptedRuntime, input: &str) -> (SessionSummary, String) {
        run_with(runtime, input, SessionOptions::default()).await
    }

    async fn run_with(runtime: &ScriptedRuntime, input: &str, options: SessionOptions) -> (SessionSummary, String) {
        let mut session = SessionLoop::with_options(runtime, Cursor::new(input.to_string()), Vec::new(), options);
        let summary = session.run().await.unwrap();
        assert!(session.session().is_terminated());
        let output = String::from_utf8(session.into_output()).unwrap();
        (summary, output)
    }

    #[test]
    fn test_quit_command() {
        for line in ["q", "Q", " q ", " Q ", "\tq\t"] {
            assert!(is_quit_command(line), "{:?}", line);
        }
        for line in ["", "qq", "quit", "q q", "exit"] {
            assert!(!is_quit_command(line), "{:?}", line);
        }
    }

    #[tokio::test]
    async fn test_quit_variants_never_submit() {
        for input in ["q\n", "Q\n", " q \n", " Q \r\n"] {
            let runtime = ScriptedRuntime::new(vec![]);
            let (summary, output) = run(&runtime, input).await;

            assert_eq!(summary.exit, ExitReason::Quit);
            assert_eq!(summary.turns, 0);
            assert!(runtime.submissions().is_empty());
            assert_eq!(output, format!("{}{}\n", QUERY_PROMPT, EXIT_MESSAGE));
        }
    }

    #[tokio::test]
    async fn test_renders_every_event_in_order() {
        let call = ToolCall::new("call_1", "sql_db_list_tables", "{}");
        let blocks = [
            ChatMessage::assistant_tool_calls(None, vec![call]),
            ChatMessage::tool_result("call_1", "sql_db_list_tables", "Album, Artist"),
            ChatMessage::assistant("There are two tables: Album and Artist."),
        ];
        let runtime = ScriptedRuntime::new(vec![vec![
            Ok(QueryEvent::new(vec![])),
            event(blocks[0].clone()),
            Ok(QueryEvent::new(vec![blocks[0].clone(), blocks[1].clone()])),
            Ok(QueryEvent::new(blocks.to_vec())),
        ]]);

        let (summary, output) = run(&runtime, "list the tables\nq\n").await;

        let user = ChatMessage::user("list the tables");
        let mut expected = QUERY_PROMPT.to_string();
        for message in std::iter::once(&user).chain(blocks.iter()) {
            expected.push_str(&message.pretty_repr());
            expected.push('\n');
        }
        expected.push_str(QUERY_PROMPT);
        expected.push_str("Exiting...\n");

        assert_eq!(output, expected);
        assert_eq!(summary, SessionSummary { turns: 1, failed_turns: 0, exit: ExitReason::Quit });

        let submissions = runtime.submissions();
        assert_eq!(submissions, vec![vec![user]]);
    }

    #[tokio::test]
    async fn test_same_query_twice_submits_twice() {
        let runtime = ScriptedRuntime::echo(2, "42");
        let options = SessionOptions { carry_history: false };
        let (summary, output) = run_with(&runtime, "how many?\nhow many?\n", options).await;

        assert_eq!(summary.turns, 2);
        assert_eq!(summary.exit, ExitReason::EndOfInput);
        let submissions = runtime.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0], submissions[1]);
        assert_eq!(output.matches("42").count(), 2);
    }

    #[tokio::test]
    async fn test_empty_line_is_submitted() {
        let runtime = ScriptedRuntime::echo(1, "What would you like to know?");
        let (summary, _) = run(&runtime, "\nq\n").await;

        assert_eq!(summary.turns, 1);
        let submissions = runtime.submissions();
        assert_eq!(submissions[0], vec![ChatMessage::user("")]);
    }

    #[tokio::test]
    async fn test_end_of_input() {
        let runtime = ScriptedRuntime::new(vec![]);
        let (summary, output) = run(&runtime, "").await;

        assert_eq!(summary.exit, ExitReason::EndOfInput);
        assert_eq!(output, QUERY_PROMPT);
        assert!(!output.contains(EXIT_MESSAGE));
    }

    #[tokio::test]
    async fn test_line_terminators_stripped() {
        let runtime = ScriptedRuntime::echo(2, "ok");
        let _ = run(&runtime, "  first  \r\nsecond").await;

        let submissions = runtime.submissions();
        assert_eq!(submissions[0][0].content.as_deref(), Some("  first  "));
        assert_eq!(submissions[1].last().unwrap().content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_failed_turn_is_survived() {
        let runtime = ScriptedRuntime::new(vec![
            vec![event(ChatMessage::assistant("first answer"))],
            vec![
                event(ChatMessage::assistant("partial")),
                Err(Error::inference_failed("model unavailable")),
            ],
            vec![event(ChatMessage::assistant("third answer"))],
        ]);

        let (summary, output) = run(&runtime, "one\ntwo\nthree\nq\n").await;

        assert_eq!(summary, SessionSummary { turns: 3, failed_turns: 1, exit: ExitReason::Quit });
        let first = output.find("first answer").unwrap();
        let partial = output.find("partial").unwrap();
        let error = output.find("Error: model unavailable\n").unwrap();
        let third = output.find("third answer").unwrap();
        assert!(first < partial && partial < error && error < third);
        assert_eq!(output.matches(QUERY_PROMPT).count(), 4);

        // Turn three sees turn one but nothing of the failed turn
        let submissions = runtime.submissions();
        let contents: Vec<&str> = submissions[2]
            .iter()
            .filter_map(|m| m.content.as_deref())
            .collect();
        assert_eq!(contents, vec!["one", "first answer", "three"]);
    }

    #[tokio::test]
    async fn test_history_carried_between_turns() {
        let runtime = ScriptedRuntime::echo(2, "answer");
        let mut session = SessionLoop::new(&runtime, Cursor::new(String::new()), Vec::new());

        let outcome = session.run_turn("first").await.unwrap();
        assert_eq!(outcome.events(), 1);
        session.run_turn("second").await.unwrap();

        let roles: Vec<Role> = session.session().history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(runtime.submissions()[1].len(), 3);
    }

    #[tokio::test]
    async fn test_stateless_turns() {
        let runtime = ScriptedRuntime::echo(2, "answer");
        let options = SessionOptions { carry_history: false };
        let _ = run_with(&runtime, "first\nsecond\n", options).await;

        let submissions = runtime.submissions();
        assert_eq!(submissions[1], vec![ChatMessage::user("second")]);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_output_failure_is_fatal() {
        let runtime = ScriptedRuntime::new(vec![]);
        let mut session = SessionLoop::new(&runtime, Cursor::new("hello\n".to_string()), BrokenPipe);

        let err = session.run().await.unwrap_err();
        assert_eq!(err.operation(), "session::render");
        assert!(runtime.submissions().is_empty());
    }
}
