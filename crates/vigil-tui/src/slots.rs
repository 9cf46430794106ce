//! Stable number-key slots for active agents.
//!
//! Keys `1`..`9` focus agents. An agent keeps its slot for as long as it stays
//! active; a freed slot goes to the next newly seen agent, lowest number
//! first. A tenth concurrently active agent gets no slot.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;
use vigil_core::AgentId;

use crate::presenter::AgentState;

/// Number of focusable slots.
pub const MAX_SLOTS: usize = 9;

/// Bijection between slots `1..=9` and active agent ids.
#[derive(Debug, Clone, Default)]
pub struct AgentIndexSlotMap {
    slots: [Option<AgentId>; MAX_SLOTS],
    by_agent: HashMap<AgentId, u8>,
}

impl AgentIndexSlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync slots with the presenter's agent states.
    ///
    /// Active agents are those not offline. New agents are assigned in order
    /// of first appearance.
    pub fn update(&mut self, agent_states: &BTreeMap<AgentId, AgentState>) {
        let mut active: Vec<(&AgentId, &AgentState)> = agent_states
            .iter()
            .filter(|(_, state)| state.status.is_active())
            .collect();
        active.sort_by(|(a_id, a), (b_id, b)| a.first_seen.cmp(&b.first_seen).then(a_id.cmp(b_id)));
        self.update_active(active.into_iter().map(|(id, _)| id.as_str()));
    }

    /// Sync slots with an ordered list of currently active agent ids.
    pub fn update_active<'a>(&mut self, active: impl IntoIterator<Item = &'a str>) {
        let active: Vec<&str> = active.into_iter().collect();

        for slot in self.slots.iter_mut() {
            let gone = slot
                .as_deref()
                .is_some_and(|agent| !active.contains(&agent));
            if gone {
                if let Some(agent) = slot.take() {
                    debug!(agent_id = %agent, "agent slot freed");
                    self.by_agent.remove(&agent);
                }
            }
        }

        for agent in active {
            if self.by_agent.contains_key(agent) {
                continue;
            }
            let Some(free) = self.slots.iter().position(Option::is_none) else {
                debug!(agent_id = %agent, "no free slot for agent");
                continue;
            };
            self.slots[free] = Some(agent.to_string());
            let index = (free + 1) as u8;
            self.by_agent.insert(agent.to_string(), index);
            debug!(agent_id = %agent, index, "agent slot assigned");
        }
    }

    /// Slot number for `agent_id`, if it has one.
    pub fn get_index(&self, agent_id: &str) -> Option<u8> {
        self.by_agent.get(agent_id).copied()
    }

    /// Returns true if `agent_id` currently holds a slot.
    pub fn is_agent_active(&self, agent_id: &str) -> bool {
        self.by_agent.contains_key(agent_id)
    }

    /// Agent holding slot `index` (1-based).
    pub fn agent_at(&self, index: u8) -> Option<&AgentId> {
        let idx = usize::from(index).checked_sub(1)?;
        self.slots.get(idx)?.as_ref()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.by_agent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_agent.is_empty()
    }

    /// Occupied slots in index order.
    pub fn assignments(&self) -> impl Iterator<Item = (u8, &AgentId)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|agent| ((i + 1) as u8, agent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigns_lowest_free_slot() {
        let mut slots = AgentIndexSlotMap::new();
        slots.update_active(["a", "b", "c"]);
        assert_eq!(slots.get_index("a"), Some(1));
        assert_eq!(slots.get_index("b"), Some(2));
        assert_eq!(slots.get_index("c"), Some(3));

        slots.update_active(["a", "c"]);
        assert_eq!(slots.get_index("b"), None);
        assert!(!slots.is_agent_active("b"));

        slots.update_active(["a", "c", "d"]);
        assert_eq!(slots.get_index("d"), Some(2));
    }

    #[test]
    fn test_index_stable_while_active() {
        let mut slots = AgentIndexSlotMap::new();
        slots.update_active(["x", "y"]);
        for round in 0..20 {
            let others = format!("other-{round}");
            slots.update_active(["y", others.as_str(), "x"]);
            assert_eq!(slots.get_index("x"), Some(1));
            assert_eq!(slots.get_index("y"), Some(2));
        }
    }

    #[test]
    fn test_tenth_agent_gets_no_slot() {
        let mut slots = AgentIndexSlotMap::new();
        let agents: Vec<String> = (1..=10).map(|i| format!("agent-{i}")).collect();
        slots.update_active(agents.iter().map(String::as_str));
        assert_eq!(slots.len(), MAX_SLOTS);
        assert_eq!(slots.get_index("agent-9"), Some(9));
        assert_eq!(slots.get_index("agent-10"), None);

        // The tenth agent picks up a slot once one frees up.
        let without_first: Vec<&str> = agents.iter().skip(1).map(String::as_str).collect();
        slots.update_active(without_first);
        assert_eq!(slots.get_index("agent-10"), Some(1));
    }

    #[test]
    fn test_agent_at() {
        let mut slots = AgentIndexSlotMap::new();
        slots.update_active(["a", "b"]);
        assert_eq!(slots.agent_at(2).map(String::as_str), Some("b"));
        assert_eq!(slots.agent_at(3), None);
        assert_eq!(slots.agent_at(0), None);
        assert_eq!(slots.agent_at(42), None);
        assert_eq!(slots.assignments().count(), 2);
    }
}
