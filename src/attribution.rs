use std::collections::HashMap;

use tracing::debug;

use crate::types::ParticipantId;

#[derive(Clone, Copy, Debug)]
pub struct AttributionOptions {
    pub window_ms: u64,
}

impl Default for AttributionOptions {
    fn default() -> Self {
        Self {
            window_ms: crate::constants::ATTRIBUTION_WINDOW_MS,
        }
    }
}

/// Who last hit whom. Expiry is evaluated at query time, there is no sweep.
#[derive(Clone, Debug, Default)]
pub struct AttackAttributionTracker {
    options: AttributionOptions,
    hits: HashMap<(ParticipantId, ParticipantId), u64>,
}

impl AttackAttributionTracker {
    pub fn new(options: AttributionOptions) -> Self {
        Self {
            options,
            hits: HashMap::new(),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.options.window_ms
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn record(&mut self, attacker: &ParticipantId, victim: &ParticipantId, now_ms: u64) {
        if attacker == victim {
            return;
        }
        debug!(%attacker, %victim, now_ms, "recorded hit");
        self.hits.insert((attacker.clone(), victim.clone()), now_ms);
    }

    pub fn last_attacker(
        &self,
        victim: &ParticipantId,
        now_ms: u64,
        window_ms: u64,
    ) -> Option<ParticipantId> {
        self.hits
            .iter()
            .filter(|((_, hit_victim), _)| hit_victim == victim)
            .filter(|(_, at)| now_ms.saturating_sub(**at) <= window_ms)
            .max_by(|((left_attacker, _), left_at), ((right_attacker, _), right_at)| {
                // ties resolve to the lower identity so lookups stay deterministic
                left_at
                    .cmp(right_at)
                    .then_with(|| right_attacker.cmp(left_attacker))
            })
            .map(|((attacker, _), _)| attacker.clone())
    }

    /// Uses the configured window.
    pub fn recent_attacker(&self, victim: &ParticipantId, now_ms: u64) -> Option<ParticipantId> {
        self.last_attacker(victim, now_ms, self.options.window_ms)
    }

    pub fn clear(&mut self, participant: &ParticipantId) {
        self.hits
            .retain(|(attacker, victim), _| attacker != participant && victim != participant);
    }

    pub fn clear_all(&mut self) {
        self.hits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> ParticipantId {
        ParticipantId::from(value)
    }

    fn tracker() -> AttackAttributionTracker {
        AttackAttributionTracker::new(AttributionOptions { window_ms: 15_000 })
    }

    #[test]
    fn hit_inside_window_is_attributed() {
        let mut tracker = tracker();
        tracker.record(&id("attacker"), &id("victim"), 1_000);
        assert_eq!(
            tracker.recent_attacker(&id("victim"), 11_000),
            Some(id("attacker"))
        );
    }

    #[test]
    fn hit_outside_window_expires() {
        let mut tracker = tracker();
        tracker.record(&id("attacker"), &id("victim"), 1_000);
        assert_eq!(tracker.recent_attacker(&id("victim"), 21_000), None);
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let mut tracker = tracker();
        tracker.record(&id("attacker"), &id("victim"), 0);
        assert!(tracker.recent_attacker(&id("victim"), 15_000).is_some());
        assert!(tracker.recent_attacker(&id("victim"), 15_001).is_none());
    }

    #[test]
    fn most_recent_attacker_wins() {
        let mut tracker = tracker();
        tracker.record(&id("early"), &id("victim"), 1_000);
        tracker.record(&id("late"), &id("victim"), 2_000);
        tracker.record(&id("other"), &id("bystander"), 3_000);
        assert_eq!(
            tracker.recent_attacker(&id("victim"), 4_000),
            Some(id("late"))
        );

        tracker.record(&id("early"), &id("victim"), 5_000);
        assert_eq!(
            tracker.recent_attacker(&id("victim"), 6_000),
            Some(id("early"))
        );
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn self_hits_are_ignored() {
        let mut tracker = tracker();
        tracker.record(&id("a"), &id("a"), 1_000);
        assert!(tracker.is_empty());
    }

    #[test]
    fn clear_removes_victim_and_attacker_records() {
        let mut tracker = tracker();
        tracker.record(&id("a"), &id("b"), 1_000);
        tracker.record(&id("b"), &id("c"), 1_000);
        tracker.record(&id("c"), &id("a"), 1_000);
        tracker.clear(&id("b"));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.recent_attacker(&id("a"), 2_000), Some(id("c")));
        assert_eq!(tracker.recent_attacker(&id("c"), 2_000), None);
    }
}
