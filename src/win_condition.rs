use crate::registry::ParticipantRegistry;
use crate::types::WinOutcome;

/// Pure query over the registry. Ending the session is the caller's job.
pub fn evaluate(registry: &ParticipantRegistry) -> WinOutcome {
    if registry.is_empty() {
        return WinOutcome::SessionEnded { winner: None };
    }

    let hunters = registry.hunter_ids();
    let [leader] = hunters.as_slice() else {
        return WinOutcome::NoDecision;
    };

    let everyone_follows = registry
        .iter()
        .filter(|participant| participant.id() != leader)
        .all(|participant| participant.owner() == Some(leader));
    if everyone_follows {
        WinOutcome::SessionEnded {
            winner: Some(leader.clone()),
        }
    } else {
        WinOutcome::NoDecision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticipantId;

    fn id(value: &str) -> ParticipantId {
        ParticipantId::from(value)
    }

    fn registry_with(names: &[&str]) -> ParticipantRegistry {
        let mut registry = ParticipantRegistry::new();
        for name in names {
            registry.insert(id(name));
        }
        registry
    }

    #[test]
    fn empty_registry_ends_without_winner() {
        assert_eq!(
            evaluate(&ParticipantRegistry::new()),
            WinOutcome::SessionEnded { winner: None }
        );
    }

    #[test]
    fn single_hunter_owning_everyone_wins() {
        let mut registry = registry_with(&["A", "B", "C"]);
        registry.make_hunter(&id("A"), Some(id("A")));
        registry.make_captured(&id("B"), id("A"));
        registry.make_captured(&id("C"), id("A"));
        assert_eq!(
            evaluate(&registry),
            WinOutcome::SessionEnded {
                winner: Some(id("A"))
            }
        );
    }

    #[test]
    fn lone_hunter_wins() {
        let mut registry = registry_with(&["A"]);
        registry.make_hunter(&id("A"), Some(id("A")));
        assert!(evaluate(&registry).is_ended());
    }

    #[test]
    fn two_hunters_is_no_decision() {
        let mut registry = registry_with(&["A", "B", "C"]);
        registry.make_hunter(&id("A"), Some(id("B")));
        registry.make_hunter(&id("B"), Some(id("A")));
        registry.make_captured(&id("C"), id("A"));
        assert_eq!(evaluate(&registry), WinOutcome::NoDecision);
    }

    #[test]
    fn abandoned_follower_blocks_victory() {
        let mut registry = registry_with(&["A", "B", "C"]);
        registry.make_hunter(&id("A"), Some(id("A")));
        registry.make_captured(&id("B"), id("A"));
        // C still names B, who is no longer a hunter
        registry.make_captured(&id("C"), id("B"));
        assert_eq!(evaluate(&registry), WinOutcome::NoDecision);
    }

    #[test]
    fn unassigned_participants_are_no_decision() {
        let registry = registry_with(&["A", "B"]);
        assert_eq!(evaluate(&registry), WinOutcome::NoDecision);
    }
}
