//! Command grammar and dispatch.
//!
//! A command line is a verb followed by an optional remainder, split on the
//! first whitespace. The same grammar is used by the dashboard's `:` line and
//! by the shell.
//!
//! | Verb | Arguments | Action |
//! |------|-----------|--------|
//! | `help` | | list commands |
//! | `agents` | | list agents and their status |
//! | `ticket` | `<id>` | show a ticket |
//! | `thread` | `<id>` | show a thread |
//! | `goal` | `<text>` | activate a goal |
//! | `new` | `<title>` | create a ticket |
//! | `assign` | `<ticket> <agent>` | assign a ticket |
//! | `post` | `<thread> <text>` | post to a thread |
//! | `wake` | `<agent>` | wake an agent |
//! | `answer` | `<request-id> <text>` | answer an escalation |
//! | `pending` | | list open escalations |
//! | `tickets` | | list tickets |
//! | `status` | | show vitals |
//! | `watch` | | stream events (observational) |
//! | `quit` / `exit` | | leave |

use std::fmt::Write as _;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_core::{ActionService, RequestResponseRegistry, Result, VigilError};

use crate::executor::CommandResult;
use crate::presenter::ViewStatePresenter;

/// Text printed by `help`.
pub const HELP_TEXT: &str = "\
Commands:
  help                      show this list
  agents                    list agents and their status
  ticket <id>               show a ticket
  thread <id>               show a thread
  goal <text>               activate a goal
  new <title>               create a ticket
  assign <ticket> <agent>   assign a ticket to an agent
  post <thread> <text>      post a message to a thread
  wake <agent>              wake an agent
  answer <request-id> <text>  answer a pending escalation
  pending                   list pending escalations
  tickets                   list tickets
  status                    show vitals
  watch                     stream live events
  quit                      leave";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Agents,
    Ticket(String),
    Thread(String),
    Goal(String),
    Quit,
    New(String),
    Assign { ticket: String, agent: String },
    Post { thread: String, text: String },
    Wake(String),
    Answer { request_id: String, text: String },
    Pending,
    Tickets,
    Status,
    Watch,
}

impl Command {
    /// Parse a command line. A leading `:` is ignored.
    pub fn parse(line: &str) -> Result<Command> {
        let line = line.trim();
        let line = line.strip_prefix(':').unwrap_or(line).trim_start();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "help" | "?" => Command::Help,
            "agents" => Command::Agents,
            "ticket" => Command::Ticket(required(rest, "ticket <id>")?),
            "thread" => Command::Thread(required(rest, "thread <id>")?),
            "goal" => Command::Goal(required(rest, "goal <text>")?),
            "quit" | "exit" => Command::Quit,
            "new" => Command::New(required(rest, "new <title>")?),
            "assign" => {
                let (ticket, agent) = two_args(rest, "assign <ticket> <agent>")?;
                Command::Assign { ticket, agent }
            }
            "post" => {
                let (thread, text) = two_args(rest, "post <thread> <text>")?;
                Command::Post { thread, text }
            }
            "wake" => Command::Wake(required(rest, "wake <agent>")?),
            "answer" => {
                let (request_id, text) = two_args(rest, "answer <request-id> <text>")?;
                Command::Answer { request_id, text }
            }
            "pending" => Command::Pending,
            "tickets" => Command::Tickets,
            "status" => Command::Status,
            "watch" => Command::Watch,
            "" => return Err(VigilError::CommandUsage { usage: "<command> [args], try help" }),
            other => {
                return Err(VigilError::UnknownCommand {
                    verb: other.to_string(),
                });
            }
        };
        Ok(command)
    }

    /// Returns true for commands that stream until interrupted.
    pub fn is_observational(&self) -> bool {
        matches!(self, Command::Watch)
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Agents => "agents",
            Command::Ticket(_) => "ticket",
            Command::Thread(_) => "thread",
            Command::Goal(_) => "goal",
            Command::Quit => "quit",
            Command::New(_) => "new",
            Command::Assign { .. } => "assign",
            Command::Post { .. } => "post",
            Command::Wake(_) => "wake",
            Command::Answer { .. } => "answer",
            Command::Pending => "pending",
            Command::Tickets => "tickets",
            Command::Status => "status",
            Command::Watch => "watch",
        }
    }
}

fn required(rest: &str, usage: &'static str) -> Result<String> {
    if rest.is_empty() {
        Err(VigilError::CommandUsage { usage })
    } else {
        Ok(rest.to_string())
    }
}

fn two_args(rest: &str, usage: &'static str) -> Result<(String, String)> {
    match rest.split_once(char::is_whitespace) {
        Some((first, second)) if !second.trim().is_empty() => {
            Ok((first.to_string(), second.trim().to_string()))
        }
        _ => Err(VigilError::CommandUsage { usage }),
    }
}

/// Maps commands onto action services, the escalation registry and the
/// presenter's view state.
#[derive(Clone)]
pub struct CommandDispatcher {
    actions: Arc<dyn ActionService>,
    registry: RequestResponseRegistry,
    presenter: Arc<ViewStatePresenter>,
}

impl CommandDispatcher {
    pub fn new(
        actions: Arc<dyn ActionService>,
        registry: RequestResponseRegistry,
        presenter: Arc<ViewStatePresenter>,
    ) -> Self {
        Self {
            actions,
            registry,
            presenter,
        }
    }

    /// Run a non-observational command.
    ///
    /// Observational commands are driven by the caller; here they only
    /// acknowledge.
    pub async fn run(&self, command: Command, cancel: CancellationToken) -> Result<CommandResult> {
        if cancel.is_cancelled() {
            return Ok(CommandResult::Error(crate::executor::INTERRUPTED.to_string()));
        }
        info!(verb = command.verb(), "dispatching command");

        let output = match command {
            Command::Help => HELP_TEXT.to_string(),
            Command::Quit => return Ok(CommandResult::Quit),
            Command::Watch => "Watching live events".to_string(),
            Command::Agents => self.agents(),
            Command::Status => self.status(),
            Command::Pending => self.pending(),
            Command::Ticket(id) => self.actions.ticket(&id).await?.describe(),
            Command::Tickets => {
                let tickets = self.actions.tickets().await?;
                if tickets.is_empty() {
                    "No tickets".to_string()
                } else {
                    tickets
                        .iter()
                        .map(|t| t.describe())
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Command::Thread(id) => {
                let thread = self.actions.thread(&id).await?;
                let mut out = format!("#{} ({} messages)", thread.id, thread.messages.len());
                for message in &thread.messages {
                    let _ = write!(
                        out,
                        "\n  {} {}: {}",
                        message.posted_at.format("%H:%M:%S"),
                        message.author,
                        message.body
                    );
                }
                out
            }
            Command::Goal(text) => {
                let goal = self.actions.activate_goal(&text).await?;
                format!("Activated {}: {}", goal.id, goal.text)
            }
            Command::New(title) => {
                let ticket = self.actions.create_ticket(&title).await?;
                format!("Created {}", ticket.describe())
            }
            Command::Assign { ticket, agent } => {
                let ticket = self.actions.assign_ticket(&ticket, &agent).await?;
                format!("Assigned {}", ticket.describe())
            }
            Command::Post { thread, text } => {
                self.actions.post_message(&thread, &text).await?;
                format!("Posted to #{thread}")
            }
            Command::Wake(agent) => {
                self.actions.wake_agent(&agent).await?;
                format!("Woke {agent}")
            }
            Command::Answer { request_id, text } => {
                if !self.registry.provide_response(&request_id, text.clone()) {
                    return Err(VigilError::EscalationNotFound { request_id });
                }
                format!("Answered {request_id}: {text}")
            }
        };
        Ok(CommandResult::Success(output))
    }

    /// Parse and run a raw command line.
    pub async fn run_line(&self, line: &str, cancel: CancellationToken) -> Result<CommandResult> {
        let command = Command::parse(line)?;
        self.run(command, cancel).await
    }

    fn agents(&self) -> String {
        let state = self.presenter.get_view_state();
        if state.agent_states.is_empty() {
            return "No agents seen yet".to_string();
        }
        state
            .agent_states
            .values()
            .map(|agent| {
                format!(
                    "{:<12} {:<9} {}",
                    agent.agent_id, agent.status.to_string(), agent.last_summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn status(&self) -> String {
        let vitals = self.presenter.get_view_state().vitals.clone();
        format!(
            "agents {} active | tickets {} open, {} done | escalations {} pending | events {} seen, {} dropped",
            vitals.active_agents,
            vitals.tickets_open,
            vitals.tickets_done,
            self.registry.pending_count(),
            vitals.events_seen,
            vitals.dropped_events,
        )
    }

    fn pending(&self) -> String {
        let pending = self.registry.pending();
        if pending.is_empty() {
            return "No pending escalations".to_string();
        }
        pending
            .iter()
            .map(|esc| {
                if esc.options.is_empty() {
                    format!("{}: {}", esc.request_id, esc.question)
                } else {
                    format!("{}: {} [{}]", esc.request_id, esc.question, esc.options.join("/"))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
