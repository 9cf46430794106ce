//! Shared type definitions used across VIGIL crates.
//!
//! The runtime owns every [`Event`]; VIGIL only ever reads them.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VigilError;

/// Unique identifier for an agent.
pub type AgentId = String;

/// Unique identifier for an escalation request.
pub type RequestId = String;

/// Timestamp type used throughout VIGIL.
pub type Timestamp = DateTime<Utc>;

/// Get the current UTC timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Kind of runtime event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AgentStarted,
    AgentStopped,
    AgentIdle,
    AgentThinking,
    AgentWorking,
    AgentWaiting,
    Heartbeat,
    ToolInvoked,
    TaskCreated,
    TaskAssigned,
    TaskCompleted,
    MessagePosted,
    QuestionRaised,
    QuestionAnswered,
    CodeSubmitted,
    GoalActivated,
    MemoryStored,
    MemoryRecalled,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 18] = [
        EventKind::AgentStarted,
        EventKind::AgentStopped,
        EventKind::AgentIdle,
        EventKind::AgentThinking,
        EventKind::AgentWorking,
        EventKind::AgentWaiting,
        EventKind::Heartbeat,
        EventKind::ToolInvoked,
        EventKind::TaskCreated,
        EventKind::TaskAssigned,
        EventKind::TaskCompleted,
        EventKind::MessagePosted,
        EventKind::QuestionRaised,
        EventKind::QuestionAnswered,
        EventKind::CodeSubmitted,
        EventKind::GoalActivated,
        EventKind::MemoryStored,
        EventKind::MemoryRecalled,
    ];

    /// Stable name used in filters and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AgentStarted => "AgentStarted",
            Self::AgentStopped => "AgentStopped",
            Self::AgentIdle => "AgentIdle",
            Self::AgentThinking => "AgentThinking",
            Self::AgentWorking => "AgentWorking",
            Self::AgentWaiting => "AgentWaiting",
            Self::Heartbeat => "Heartbeat",
            Self::ToolInvoked => "ToolInvoked",
            Self::TaskCreated => "TaskCreated",
            Self::TaskAssigned => "TaskAssigned",
            Self::TaskCompleted => "TaskCompleted",
            Self::MessagePosted => "MessagePosted",
            Self::QuestionRaised => "QuestionRaised",
            Self::QuestionAnswered => "QuestionAnswered",
            Self::CodeSubmitted => "CodeSubmitted",
            Self::GoalActivated => "GoalActivated",
            Self::MemoryStored => "MemoryStored",
            Self::MemoryRecalled => "MemoryRecalled",
        }
    }

    /// Status implied for the emitting agent, if this kind carries one.
    pub fn implied_status(&self) -> Option<AgentStatus> {
        match self {
            Self::AgentStarted | Self::AgentIdle | Self::TaskCompleted => Some(AgentStatus::Idle),
            Self::AgentThinking => Some(AgentStatus::Thinking),
            Self::AgentWorking | Self::ToolInvoked | Self::CodeSubmitted => {
                Some(AgentStatus::Working)
            }
            Self::AgentWaiting | Self::QuestionRaised => Some(AgentStatus::Waiting),
            Self::AgentStopped => Some(AgentStatus::Offline),
            _ => None,
        }
    }

    /// Kinds that are worth surfacing even at low urgency.
    pub fn is_notable(&self) -> bool {
        matches!(
            self,
            Self::AgentStarted
                | Self::AgentStopped
                | Self::TaskCreated
                | Self::TaskAssigned
                | Self::TaskCompleted
                | Self::MessagePosted
                | Self::QuestionRaised
                | Self::QuestionAnswered
                | Self::CodeSubmitted
                | Self::GoalActivated
                | Self::MemoryStored
        )
    }

    /// Returns true for memory bookkeeping kinds.
    pub fn is_memory_op(&self) -> bool {
        matches!(self, Self::MemoryStored | Self::MemoryRecalled)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| VigilError::UnknownEventKind { name: s.to_string() })
    }
}

/// Who emitted an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// An agent inside the runtime
    Agent(AgentId),
    /// The human operator
    Human,
}

impl Source {
    /// Convenience constructor for an agent source.
    pub fn agent(id: impl Into<AgentId>) -> Self {
        Self::Agent(id.into())
    }

    /// Agent id if the source is an agent.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Agent(id) => Some(id),
            Self::Human => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(id) => write!(f, "{id}"),
            Self::Human => write!(f, "human"),
        }
    }
}

/// Event urgency as assigned by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Single-character marker for compact displays.
    pub fn marker(&self) -> char {
        match self {
            Self::Low => ' ',
            Self::Medium => '*',
            Self::High => '!',
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Whether an event is shown to the operator by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Significance {
    Significant,
    Routine,
}

/// Derived status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Thinking,
    Working,
    Waiting,
    Offline,
}

impl AgentStatus {
    /// Returns true unless the agent has stopped.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Offline)
    }

    /// One-character glyph for activity strips.
    pub fn glyph(&self) -> char {
        match self {
            Self::Idle => '.',
            Self::Thinking => ':',
            Self::Working => '#',
            Self::Waiting => '?',
            Self::Offline => ' ',
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Thinking => write!(f, "thinking"),
            Self::Working => write!(f, "working"),
            Self::Waiting => write!(f, "waiting"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Immutable record emitted by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub kind: EventKind,
    pub timestamp: Timestamp,
    pub source: Source,
    pub urgency: Urgency,
    pub summary: String,
}

impl Event {
    /// Create an event stamped now with a fresh id.
    pub fn new(kind: EventKind, source: Source, summary: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp: now(),
            source,
            urgency: Urgency::Low,
            summary: summary.into(),
        }
    }

    /// Set urgency and return self for chaining.
    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// Set timestamp and return self for chaining.
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set id and return self for chaining.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Significance derived from urgency and kind, never from the summary.
    pub fn significance(&self) -> Significance {
        if self.urgency >= Urgency::Medium || self.kind.is_notable() {
            Significance::Significant
        } else {
            Significance::Routine
        }
    }

    /// Check the structural invariants the presenter relies on.
    pub fn validate(&self) -> Result<(), VigilError> {
        if self.id.trim().is_empty() {
            return Err(VigilError::malformed("<empty>", "missing event id"));
        }
        if let Source::Agent(agent_id) = &self.source {
            if agent_id.trim().is_empty() {
                return Err(VigilError::malformed(&self.id, "empty agent id"));
            }
        }
        if self.summary.trim().is_empty() {
            return Err(VigilError::malformed(&self.id, "empty summary"));
        }
        Ok(())
    }
}

/// A runtime question waiting for a human answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEscalation {
    pub request_id: RequestId,
    pub question: String,
    pub options: Vec<String>,
    pub created_at: Timestamp,
}

impl PendingEscalation {
    /// Create an escalation stamped now.
    pub fn new(request_id: impl Into<RequestId>, question: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            question: question.into(),
            options: Vec::new(),
            created_at: now(),
        }
    }

    /// Set answer options and return self for chaining.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Answer applied when the operator does not respond in time.
    pub fn default_choice(&self) -> String {
        self.options.first().cloned().unwrap_or_default()
    }
}

/// Parse a whitespace or comma separated list of event kind names.
pub fn parse_kinds(spec: &str) -> Result<HashSet<EventKind>, VigilError> {
    spec.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(EventKind::from_str)
        .collect()
}
