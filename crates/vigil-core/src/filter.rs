//! Subscription filters for narrowing the live event stream.

use std::collections::HashSet;
use std::fmt;

use crate::types::{Event, EventKind, Source};

/// Predicate over events. An absent or empty field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub event_types: Option<HashSet<EventKind>>,
    pub sources: Option<HashSet<Source>>,
}

impl SubscriptionFilter {
    /// Filter that matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter restricted to the given event kinds.
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            event_types: Some(kinds.into_iter().collect()),
            sources: None,
        }
    }

    /// Restrict the filter to the given sources.
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.sources = Some(sources.into_iter().collect());
        self
    }

    /// Returns true if this filter lets every event through.
    pub fn is_match_all(&self) -> bool {
        self.event_types.as_ref().is_none_or(HashSet::is_empty)
            && self.sources.as_ref().is_none_or(HashSet::is_empty)
    }

    /// Check an event against the filter.
    pub fn matches(&self, event: &Event) -> bool {
        let type_ok = match &self.event_types {
            Some(kinds) if !kinds.is_empty() => kinds.contains(&event.kind),
            _ => true,
        };
        let source_ok = match &self.sources {
            Some(sources) if !sources.is_empty() => sources.contains(&event.source),
            _ => true,
        };
        type_ok && source_ok
    }
}

/// Named filters the shell cycles through with Ctrl+E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPreset {
    #[default]
    All,
    Tasks,
    Messages,
    Escalations,
    Agents,
}

impl FilterPreset {
    /// Cycle order.
    pub const ALL: [FilterPreset; 5] = [
        FilterPreset::All,
        FilterPreset::Tasks,
        FilterPreset::Messages,
        FilterPreset::Escalations,
        FilterPreset::Agents,
    ];

    /// Next preset in the cycle, wrapping around.
    pub fn next(&self) -> FilterPreset {
        let idx = Self::ALL.iter().position(|p| p == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Tasks => "tasks",
            Self::Messages => "messages",
            Self::Escalations => "escalations",
            Self::Agents => "agents",
        }
    }

    /// Concrete filter for this preset.
    pub fn filter(&self) -> SubscriptionFilter {
        match self {
            Self::All => SubscriptionFilter::all(),
            Self::Tasks => SubscriptionFilter::kinds([
                EventKind::TaskCreated,
                EventKind::TaskAssigned,
                EventKind::TaskCompleted,
                EventKind::CodeSubmitted,
            ]),
            Self::Messages => SubscriptionFilter::kinds([EventKind::MessagePosted]),
            Self::Escalations => {
                SubscriptionFilter::kinds([EventKind::QuestionRaised, EventKind::QuestionAnswered])
            }
            Self::Agents => SubscriptionFilter::kinds([
                EventKind::AgentStarted,
                EventKind::AgentStopped,
                EventKind::AgentIdle,
                EventKind::AgentThinking,
                EventKind::AgentWorking,
                EventKind::AgentWaiting,
            ]),
        }
    }
}

impl fmt::Display for FilterPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, source: Source) -> Event {
        Event::new(kind, source, "test")
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = SubscriptionFilter::all();
        assert!(filter.is_match_all());
        for kind in EventKind::ALL {
            assert!(filter.matches(&event(kind, Source::Human)));
        }

        let empty_sets = SubscriptionFilter {
            event_types: Some(HashSet::new()),
            sources: Some(HashSet::new()),
        };
        assert!(empty_sets.is_match_all());
        assert!(empty_sets.matches(&event(EventKind::Heartbeat, Source::agent("a"))));
    }

    #[test]
    fn test_type_filter() {
        let filter = SubscriptionFilter::kinds([EventKind::TaskCreated]);
        assert!(filter.matches(&event(EventKind::TaskCreated, Source::agent("a"))));
        assert!(!filter.matches(&event(EventKind::MessagePosted, Source::agent("a"))));
    }

    #[test]
    fn test_source_and_type_combined() {
        let filter = SubscriptionFilter::kinds([EventKind::MessagePosted])
            .with_sources([Source::agent("reviewer")]);
        assert!(filter.matches(&event(EventKind::MessagePosted, Source::agent("reviewer"))));
        assert!(!filter.matches(&event(EventKind::MessagePosted, Source::agent("coder"))));
        assert!(!filter.matches(&event(EventKind::TaskCreated, Source::agent("reviewer"))));
    }

    #[test]
    fn test_preset_cycle_wraps() {
        let mut preset = FilterPreset::default();
        let mut seen = vec![preset];
        for _ in 0..FilterPreset::ALL.len() {
            preset = preset.next();
            seen.push(preset);
        }
        assert_eq!(seen.first(), seen.last());
        assert_eq!(FilterPreset::Escalations.next(), FilterPreset::Agents);
    }

    #[test]
    fn test_preset_filters() {
        assert!(FilterPreset::All.filter().is_match_all());
        let escalations = FilterPreset::Escalations.filter();
        assert!(escalations.matches(&event(EventKind::QuestionRaised, Source::agent("a"))));
        assert!(!escalations.matches(&event(EventKind::TaskCreated, Source::agent("a"))));
    }
}
