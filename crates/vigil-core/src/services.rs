//! Action services exposed by the agent runtime.
//!
//! Every call is a request/response round trip that may be slow, so callers
//! run them inside a command executor and never on a render path.
//! [`InMemoryActionService`] is a self-contained runtime stand-in that keeps
//! tickets, threads and goals in memory and announces every change on the
//! event bus.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, VigilError};
use crate::feed::EventBus;
use crate::types::{AgentId, Event, EventKind, Source, Timestamp, Urgency, now};

/// Ticket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    Assigned,
    Done,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Assigned => write!(f, "assigned"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Unit of work tracked by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub status: TicketStatus,
    pub assignee: Option<AgentId>,
    pub created_at: Timestamp,
}

impl Ticket {
    /// One-line description for command output.
    pub fn describe(&self) -> String {
        match &self.assignee {
            Some(agent) => format!("{} [{}] {} -> {}", self.id, self.status, self.title, agent),
            None => format!("{} [{}] {}", self.id, self.status, self.title),
        }
    }
}

/// A message in a conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub author: Source,
    pub body: String,
    pub posted_at: Timestamp,
}

/// Conversation between agents and the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub messages: Vec<ThreadMessage>,
}

/// An activated high-level goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub text: String,
    pub activated_at: Timestamp,
}

/// Request/response calls into the agent runtime.
#[async_trait]
pub trait ActionService: Send + Sync {
    async fn create_ticket(&self, title: &str) -> Result<Ticket>;
    async fn assign_ticket(&self, ticket_id: &str, agent_id: &str) -> Result<Ticket>;
    async fn post_message(&self, thread_id: &str, body: &str) -> Result<ThreadMessage>;
    async fn wake_agent(&self, agent_id: &str) -> Result<()>;
    async fn activate_goal(&self, text: &str) -> Result<Goal>;
    async fn ticket(&self, ticket_id: &str) -> Result<Ticket>;
    async fn thread(&self, thread_id: &str) -> Result<Thread>;
    async fn tickets(&self) -> Result<Vec<Ticket>>;
}

#[derive(Debug, Default)]
struct RuntimeState {
    next_ticket: u64,
    next_goal: u64,
    tickets: BTreeMap<String, Ticket>,
    threads: BTreeMap<String, Thread>,
    goals: Vec<Goal>,
    agents: BTreeSet<AgentId>,
}

/// In-memory runtime stand-in.
pub struct InMemoryActionService {
    bus: Arc<EventBus>,
    state: RwLock<RuntimeState>,
    latency: Duration,
}

impl InMemoryActionService {
    /// Create a service that announces changes on `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: RwLock::new(RuntimeState::default()),
            latency: Duration::ZERO,
        }
    }

    /// Simulate round-trip latency on every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make an agent known to the runtime so it can be assigned and woken.
    pub async fn register_agent(&self, agent_id: impl Into<AgentId>) {
        self.state.write().await.agents.insert(agent_id.into());
    }

    /// Mark a ticket done on behalf of its assignee.
    pub async fn complete_ticket(&self, ticket_id: &str) -> Result<Ticket> {
        self.round_trip().await;
        let ticket = {
            let mut state = self.state.write().await;
            let ticket = state
                .tickets
                .get_mut(ticket_id)
                .ok_or_else(|| VigilError::TicketNotFound {
                    ticket_id: ticket_id.to_string(),
                })?;
            ticket.status = TicketStatus::Done;
            ticket.clone()
        };
        let source = ticket
            .assignee
            .clone()
            .map(Source::Agent)
            .unwrap_or(Source::Human);
        self.bus.publish(Event::new(
            EventKind::TaskCompleted,
            source,
            format!("{} completed: {}", ticket.id, ticket.title),
        ));
        Ok(ticket)
    }

    /// Post to a thread as a specific author.
    pub async fn post_as(&self, author: Source, thread_id: &str, body: &str) -> Result<ThreadMessage> {
        self.round_trip().await;
        if body.trim().is_empty() {
            return Err(VigilError::action_failed("postMessage", "message body is empty"));
        }
        let message = ThreadMessage {
            author: author.clone(),
            body: body.to_string(),
            posted_at: now(),
        };
        {
            let mut state = self.state.write().await;
            state
                .threads
                .entry(thread_id.to_string())
                .or_insert_with(|| Thread {
                    id: thread_id.to_string(),
                    messages: Vec::new(),
                })
                .messages
                .push(message.clone());
        }
        self.bus.publish(Event::new(
            EventKind::MessagePosted,
            author,
            format!("#{thread_id}: {}", preview(body, 60)),
        ));
        Ok(message)
    }

    /// Create a ticket on behalf of `source`.
    pub async fn create_ticket_as(&self, source: Source, title: &str) -> Result<Ticket> {
        self.round_trip().await;
        let title = title.trim();
        if title.is_empty() {
            return Err(VigilError::action_failed("createTicket", "title is empty"));
        }
        let ticket = {
            let mut state = self.state.write().await;
            state.next_ticket += 1;
            let ticket = Ticket {
                id: format!("T-{}", state.next_ticket),
                title: title.to_string(),
                status: TicketStatus::Open,
                assignee: None,
                created_at: now(),
            };
            state.tickets.insert(ticket.id.clone(), ticket.clone());
            ticket
        };
        info!(ticket_id = %ticket.id, "ticket created");
        self.bus.publish(Event::new(
            EventKind::TaskCreated,
            source,
            format!("{} created: {}", ticket.id, ticket.title),
        ));
        Ok(ticket)
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ActionService for InMemoryActionService {
    async fn create_ticket(&self, title: &str) -> Result<Ticket> {
        self.create_ticket_as(Source::Human, title).await
    }

    async fn assign_ticket(&self, ticket_id: &str, agent_id: &str) -> Result<Ticket> {
        self.round_trip().await;
        let ticket = {
            let mut state = self.state.write().await;
            if !state.agents.contains(agent_id) {
                return Err(VigilError::AgentNotFound {
                    agent_id: agent_id.to_string(),
                });
            }
            let ticket = state
                .tickets
                .get_mut(ticket_id)
                .ok_or_else(|| VigilError::TicketNotFound {
                    ticket_id: ticket_id.to_string(),
                })?;
            if ticket.status == TicketStatus::Done {
                return Err(VigilError::action_failed(
                    "assignTicket",
                    format!("{ticket_id} is already done"),
                ));
            }
            ticket.status = TicketStatus::Assigned;
            ticket.assignee = Some(agent_id.to_string());
            ticket.clone()
        };
        debug!(ticket_id, agent_id, "ticket assigned");
        self.bus.publish(Event::new(
            EventKind::TaskAssigned,
            Source::agent(agent_id),
            format!("{} assigned to {}", ticket.id, agent_id),
        ));
        Ok(ticket)
    }

    async fn post_message(&self, thread_id: &str, body: &str) -> Result<ThreadMessage> {
        self.post_as(Source::Human, thread_id, body).await
    }

    async fn wake_agent(&self, agent_id: &str) -> Result<()> {
        self.round_trip().await;
        if !self.state.read().await.agents.contains(agent_id) {
            return Err(VigilError::AgentNotFound {
                agent_id: agent_id.to_string(),
            });
        }
        self.bus.publish(
            Event::new(
                EventKind::AgentThinking,
                Source::agent(agent_id),
                format!("{agent_id} woken by operator"),
            )
            .with_urgency(Urgency::Medium),
        );
        Ok(())
    }

    async fn activate_goal(&self, text: &str) -> Result<Goal> {
        self.round_trip().await;
        let text = text.trim();
        if text.is_empty() {
            return Err(VigilError::action_failed("activateGoal", "goal text is empty"));
        }
        let goal = {
            let mut state = self.state.write().await;
            state.next_goal += 1;
            let goal = Goal {
                id: format!("G-{}", state.next_goal),
                text: text.to_string(),
                activated_at: now(),
            };
            state.goals.push(goal.clone());
            goal
        };
        self.bus.publish(
            Event::new(
                EventKind::GoalActivated,
                Source::Human,
                format!("{}: {}", goal.id, preview(&goal.text, 60)),
            )
            .with_urgency(Urgency::Medium),
        );
        Ok(goal)
    }

    async fn ticket(&self, ticket_id: &str) -> Result<Ticket> {
        self.round_trip().await;
        self.state
            .read()
            .await
            .tickets
            .get(ticket_id)
            .cloned()
            .ok_or_else(|| VigilError::TicketNotFound {
                ticket_id: ticket_id.to_string(),
            })
    }

    async fn thread(&self, thread_id: &str) -> Result<Thread> {
        self.round_trip().await;
        self.state
            .read()
            .await
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| VigilError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })
    }

    async fn tickets(&self) -> Result<Vec<Ticket>> {
        self.round_trip().await;
        Ok(self.state.read().await.tickets.values().cloned().collect())
    }
}

/// Truncate to `max` characters with an ellipsis.
pub fn preview(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::feed::EventFeed;
    use crate::filter::SubscriptionFilter;

    fn service() -> (Arc<EventBus>, InMemoryActionService) {
        let bus = Arc::new(EventBus::default());
        let svc = InMemoryActionService::new(Arc::clone(&bus));
        (bus, svc)
    }

    #[tokio::test]
    async fn test_create_and_assign_ticket() {
        let (bus, svc) = service();
        let mut sub = bus.subscribe(SubscriptionFilter::all());
        svc.register_agent("coder").await;

        let ticket = svc.create_ticket("Fix login").await.unwrap();
        assert_eq!(ticket.id, "T-1");
        assert_eq!(ticket.status, TicketStatus::Open);

        let assigned = svc.assign_ticket("T-1", "coder").await.unwrap();
        assert_eq!(assigned.assignee.as_deref(), Some("coder"));

        let created = timeout(Duration::from_secs(1), sub.next_event()).await.unwrap().unwrap();
        assert_eq!(created.kind, EventKind::TaskCreated);
        let assigned_evt = timeout(Duration::from_secs(1), sub.next_event()).await.unwrap().unwrap();
        assert_eq!(assigned_evt.kind, EventKind::TaskAssigned);
        assert_eq!(assigned_evt.source, Source::agent("coder"));
    }

    #[tokio::test]
    async fn test_failures_are_reported() {
        let (_bus, svc) = service();
        assert!(matches!(
            svc.ticket("T-99").await,
            Err(VigilError::TicketNotFound { .. })
        ));
        assert!(matches!(
            svc.wake_agent("ghost").await,
            Err(VigilError::AgentNotFound { .. })
        ));
        assert!(svc.create_ticket("   ").await.is_err());
        assert!(svc.thread("general").await.is_err());
    }

    #[tokio::test]
    async fn test_threads_and_goals() {
        let (_bus, svc) = service();
        svc.post_message("general", "hello agents").await.unwrap();
        svc.post_as(Source::agent("planner"), "general", "hi").await.unwrap();

        let thread = svc.thread("general").await.unwrap();
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[1].author, Source::agent("planner"));

        let goal = svc.activate_goal("ship v1").await.unwrap();
        assert_eq!(goal.id, "G-1");
    }

    #[tokio::test]
    async fn test_done_ticket_cannot_be_reassigned() {
        let (_bus, svc) = service();
        svc.register_agent("a").await;
        svc.create_ticket("task").await.unwrap();
        svc.complete_ticket("T-1").await.unwrap();
        assert!(svc.assign_ticket("T-1", "a").await.is_err());
        assert_eq!(svc.tickets().await.unwrap()[0].status, TicketStatus::Done);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghijkl", 8), "abcde...");
    }
}
