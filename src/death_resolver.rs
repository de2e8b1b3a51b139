use tracing::{info, warn};

use crate::attribution::AttackAttributionTracker;
use crate::chain_ring::ChainRing;
use crate::config::RespawnDelayConfig;
use crate::registry::ParticipantRegistry;
use crate::types::{DeathCause, DeathClassification, DeathOutcome, ParticipantId, SessionEvent};
use crate::win_condition;

#[derive(Clone, Debug)]
pub struct DeathReport {
    pub victim: ParticipantId,
    pub killer: Option<ParticipantId>,
    pub cause: DeathCause,
    pub now_ms: u64,
}

impl DeathReport {
    pub fn new(
        victim: ParticipantId,
        killer: Option<ParticipantId>,
        cause: DeathCause,
        now_ms: u64,
    ) -> Self {
        Self {
            victim,
            killer,
            cause,
            now_ms,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DeathResolver {
    respawn: RespawnDelayConfig,
}

impl DeathResolver {
    pub fn new(respawn: RespawnDelayConfig) -> Self {
        Self { respawn }
    }

    pub fn resolve(
        &self,
        registry: &mut ParticipantRegistry,
        tracker: &mut AttackAttributionTracker,
        ring: &mut ChainRing,
        report: &DeathReport,
        events: &mut Vec<SessionEvent>,
    ) -> DeathOutcome {
        let victim = &report.victim;
        let Some(death_count) = registry.increment_death_count(victim) else {
            warn!(%victim, "death of unknown participant ignored");
            return DeathOutcome::untracked(victim.clone(), win_condition::evaluate(registry));
        };
        let respawn_delay_ms = self.respawn.delay_for(death_count);
        let killer = self.effective_killer(registry, tracker, report);

        let classification = self.classify(registry, victim, killer.as_ref());
        let classification = match (classification, killer.as_ref()) {
            (DeathClassification::CorrectCapture, Some(killer)) => {
                match ring.capture_on_correct_kill(registry, killer, victim) {
                    Some(capture) => {
                        events.push(SessionEvent::CorrectCapture {
                            killer: capture.killer,
                            victim: capture.victim,
                            new_target: capture.new_target,
                        });
                        DeathClassification::CorrectCapture
                    }
                    None => DeathClassification::NaturalDeath,
                }
            }
            (DeathClassification::WrongCapture, Some(killer)) => {
                match ring.capture_on_wrong_kill(registry, killer, victim) {
                    Some(capture) => {
                        events.push(SessionEvent::WrongCapture {
                            killer: capture.killer,
                            victim: capture.victim,
                        });
                        DeathClassification::WrongCapture
                    }
                    None => DeathClassification::NaturalDeath,
                }
            }
            (other, _) => other,
        };

        let owner = registry
            .get(victim)
            .and_then(|participant| participant.owner().cloned());
        match classification {
            DeathClassification::FollowerDeath => events.push(SessionEvent::FollowerDeath {
                victim: victim.clone(),
                owner: owner.clone(),
            }),
            DeathClassification::NaturalDeath => events.push(SessionEvent::NaturalDeath {
                victim: victim.clone(),
                cause: report.cause,
            }),
            _ => {}
        }

        let resolved_killer = match classification {
            DeathClassification::CorrectCapture | DeathClassification::WrongCapture => killer,
            _ => None,
        };
        info!(
            %victim,
            ?classification,
            killer = ?resolved_killer,
            death_count,
            respawn_delay_ms,
            "death resolved"
        );

        tracker.clear(victim);

        DeathOutcome {
            victim: victim.clone(),
            classification,
            resolved_killer,
            death_count,
            respawn_delay_ms,
            place_near_owner: classification != DeathClassification::NaturalDeath,
            owner,
            win: win_condition::evaluate(registry),
        }
    }

    fn effective_killer(
        &self,
        registry: &ParticipantRegistry,
        tracker: &AttackAttributionTracker,
        report: &DeathReport,
    ) -> Option<ParticipantId> {
        let active = |id: &ParticipantId| *id != report.victim && registry.contains(id);
        match &report.killer {
            Some(reported) if active(reported) => Some(reported.clone()),
            Some(reported) => {
                warn!(victim = %report.victim, killer = %reported, "reported killer is not active");
                None
            }
            None => tracker
                .recent_attacker(&report.victim, report.now_ms)
                .filter(|attacker| active(attacker)),
        }
    }

    fn classify(
        &self,
        registry: &ParticipantRegistry,
        victim: &ParticipantId,
        killer: Option<&ParticipantId>,
    ) -> DeathClassification {
        let victim_captured = registry
            .get(victim)
            .is_some_and(|participant| participant.is_captured());
        if victim_captured {
            return DeathClassification::FollowerDeath;
        }
        let Some(killer) = killer.and_then(|killer| registry.get(killer)) else {
            return DeathClassification::NaturalDeath;
        };
        if !killer.is_hunter() {
            return DeathClassification::NaturalDeath;
        }
        if killer.chase_target() == Some(victim) {
            DeathClassification::CorrectCapture
        } else {
            DeathClassification::WrongCapture
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::AttributionOptions;
    use crate::types::{Role, WinOutcome};

    fn id(value: &str) -> ParticipantId {
        ParticipantId::from(value)
    }

    struct Fixture {
        registry: ParticipantRegistry,
        tracker: AttackAttributionTracker,
        ring: ChainRing,
        resolver: DeathResolver,
        events: Vec<SessionEvent>,
    }

    impl Fixture {
        fn ring(names: &[&str]) -> Self {
            let mut registry = ParticipantRegistry::new();
            for name in names {
                registry.insert(id(name));
            }
            let order: Vec<ParticipantId> = names.iter().map(|name| id(name)).collect();
            ChainRing::link_in_order(&mut registry, &order);
            Self {
                registry,
                tracker: AttackAttributionTracker::new(AttributionOptions { window_ms: 15_000 }),
                ring: ChainRing::new(1),
                resolver: DeathResolver::default(),
                events: Vec::new(),
            }
        }

        fn die(&mut self, victim: &str, killer: Option<&str>, now_ms: u64) -> DeathOutcome {
            let report = DeathReport::new(
                id(victim),
                killer.map(id),
                if killer.is_some() {
                    DeathCause::Combat
                } else {
                    DeathCause::Fall
                },
                now_ms,
            );
            self.resolver.resolve(
                &mut self.registry,
                &mut self.tracker,
                &mut self.ring,
                &report,
                &mut self.events,
            )
        }

        fn target_of(&self, name: &str) -> Option<ParticipantId> {
            self.registry
                .get(&id(name))
                .and_then(|participant| participant.chase_target().cloned())
        }

        fn owner_of(&self, name: &str) -> Option<ParticipantId> {
            self.registry
                .get(&id(name))
                .and_then(|participant| participant.owner().cloned())
        }
    }

    #[test]
    fn correct_then_wrong_capture_scenario() {
        let mut fx = Fixture::ring(&["A", "B", "C", "D"]);

        let first = fx.die("B", Some("A"), 1_000);
        assert_eq!(first.classification, DeathClassification::CorrectCapture);
        assert_eq!(first.resolved_killer, Some(id("A")));
        assert!(first.place_near_owner);
        assert_eq!(first.owner, Some(id("A")));
        assert_eq!(fx.target_of("A"), Some(id("C")));
        assert_eq!(fx.target_of("C"), Some(id("D")));
        assert_eq!(fx.target_of("D"), Some(id("A")));

        let second = fx.die("C", Some("D"), 2_000);
        assert_eq!(second.classification, DeathClassification::WrongCapture);
        assert_eq!(second.owner, Some(id("D")));
        assert_eq!(fx.owner_of("C"), Some(id("D")));
        assert_eq!(fx.target_of("D"), Some(id("A")));
        assert_eq!(second.win, WinOutcome::NoDecision);
    }

    #[test]
    fn recent_hit_is_attributed_inside_window() {
        let mut fx = Fixture::ring(&["A", "B", "C"]);
        fx.tracker.record(&id("A"), &id("B"), 0);
        let outcome = fx.die("B", None, 10_000);
        assert_eq!(outcome.classification, DeathClassification::CorrectCapture);
        assert_eq!(outcome.resolved_killer, Some(id("A")));
    }

    #[test]
    fn stale_hit_becomes_natural_death() {
        let mut fx = Fixture::ring(&["A", "B", "C"]);
        fx.tracker.record(&id("A"), &id("B"), 0);
        let outcome = fx.die("B", None, 20_000);
        assert_eq!(outcome.classification, DeathClassification::NaturalDeath);
        assert!(outcome.resolved_killer.is_none());
        assert!(!outcome.place_near_owner);
        assert!(outcome.owner.is_none());
        assert_eq!(
            fx.registry.get(&id("B")).map(|participant| participant.role()),
            Some(Role::Hunter)
        );
    }

    #[test]
    fn death_clears_attribution_for_victim() {
        let mut fx = Fixture::ring(&["A", "B", "C"]);
        fx.tracker.record(&id("C"), &id("B"), 0);
        fx.tracker.record(&id("B"), &id("A"), 0);
        fx.die("B", None, 30_000);
        assert!(fx.tracker.is_empty());
    }

    #[test]
    fn follower_death_mutates_nothing() {
        let mut fx = Fixture::ring(&["A", "B", "C"]);
        fx.die("B", Some("A"), 1_000);
        let outcome = fx.die("B", Some("C"), 2_000);
        assert_eq!(outcome.classification, DeathClassification::FollowerDeath);
        assert_eq!(outcome.owner, Some(id("A")));
        assert!(outcome.place_near_owner);
        assert_eq!(fx.owner_of("B"), Some(id("A")));
        assert_eq!(fx.target_of("C"), Some(id("A")));
    }

    #[test]
    fn unknown_victim_is_untracked() {
        let mut fx = Fixture::ring(&["A", "B"]);
        let outcome = fx.die("ghost", Some("A"), 1_000);
        assert_eq!(outcome.classification, DeathClassification::Untracked);
        assert_eq!(outcome.death_count, 0);
        assert!(fx.events.is_empty());
    }

    #[test]
    fn inactive_reported_killer_degrades_to_natural() {
        let mut fx = Fixture::ring(&["A", "B"]);
        let outcome = fx.die("B", Some("departed"), 1_000);
        assert_eq!(outcome.classification, DeathClassification::NaturalDeath);
        assert!(matches!(
            fx.events.last(),
            Some(SessionEvent::NaturalDeath { .. })
        ));
    }

    #[test]
    fn captured_killer_causes_natural_death() {
        let mut fx = Fixture::ring(&["A", "B", "C"]);
        fx.die("B", Some("A"), 1_000);
        let outcome = fx.die("C", Some("B"), 2_000);
        assert_eq!(outcome.classification, DeathClassification::NaturalDeath);
    }

    #[test]
    fn respawn_delay_grows_with_deaths() {
        let mut fx = Fixture::ring(&["A", "B", "C"]);
        let first = fx.die("C", None, 1_000);
        let second = fx.die("C", None, 2_000);
        assert_eq!(first.death_count, 1);
        assert_eq!(first.respawn_delay_ms, 60_000);
        assert_eq!(second.death_count, 2);
        assert_eq!(second.respawn_delay_ms, 72_000);
    }

    #[test]
    fn final_capture_reports_winner() {
        let mut fx = Fixture::ring(&["A", "B", "C"]);
        fx.die("B", Some("A"), 1_000);
        let outcome = fx.die("C", Some("A"), 2_000);
        assert_eq!(outcome.classification, DeathClassification::CorrectCapture);
        assert_eq!(
            outcome.win,
            WinOutcome::SessionEnded {
                winner: Some(id("A"))
            }
        );
        assert_eq!(fx.target_of("A"), Some(id("A")));
    }
}
