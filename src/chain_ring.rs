use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::registry::ParticipantRegistry;
use crate::rng::Rng;
use crate::types::ParticipantId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub killer: ParticipantId,
    pub victim: ParticipantId,
    /// The killer's chase target after the capture.
    pub new_target: Option<ParticipantId>,
    /// Followers the victim owned before being captured. Their owner is left
    /// pointing at the victim, who is no longer a hunter.
    pub abandoned_followers: Vec<ParticipantId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepartureOutcome {
    Unknown,
    NotHunter,
    Broken {
        orphaned: Vec<ParticipantId>,
    },
    Succeeded {
        successor: ParticipantId,
        inherited_target: Option<ParticipantId>,
        reassigned: Vec<ParticipantId>,
        repointed: Vec<ParticipantId>,
    },
}

/// Hunter cycles plus the hunters whose chain currently ends in a gap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RingShape {
    pub cycles: Vec<Vec<ParticipantId>>,
    pub broken_at: Vec<ParticipantId>,
}

impl RingShape {
    pub fn is_single_cycle(&self) -> bool {
        self.cycles.len() == 1 && self.broken_at.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ChainRing {
    rng: Rng,
}

impl ChainRing {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Rng::new(seed),
        }
    }

    /// Shuffles every registered participant into one cycle and makes them
    /// all hunters. Returns the order used.
    pub fn setup_ring(&mut self, registry: &mut ParticipantRegistry) -> Vec<ParticipantId> {
        let mut order = registry.ids();
        self.rng.shuffle(&mut order);
        Self::link_in_order(registry, &order);
        info!(participants = order.len(), "ring set up");
        order
    }

    /// Each entry chases the next one, the last wraps to the first. A single
    /// entry chases itself. Unknown identities are skipped.
    pub fn link_in_order(registry: &mut ParticipantRegistry, order: &[ParticipantId]) {
        let order: Vec<&ParticipantId> = order.iter().filter(|id| registry.contains(id)).collect();
        for (idx, current) in order.iter().enumerate() {
            let next = order[(idx + 1) % order.len()];
            registry.make_hunter(current, Some(next.clone()));
        }
    }

    pub fn capture_on_correct_kill(
        &mut self,
        registry: &mut ParticipantRegistry,
        killer: &ParticipantId,
        victim: &ParticipantId,
    ) -> Option<CaptureOutcome> {
        let (killer_data, victim_data) = match (registry.get(killer), registry.get(victim)) {
            (Some(k), Some(v)) => (k, v),
            _ => {
                warn!(%killer, %victim, "correct capture skipped: participant missing");
                return None;
            }
        };
        if killer == victim
            || !killer_data.is_hunter()
            || killer_data.chase_target() != Some(victim)
        {
            warn!(%killer, %victim, "correct capture skipped: victim is not the killer's target");
            return None;
        }

        let inherited = victim_data.chase_target().cloned();
        let abandoned_followers = registry.followers_of(victim);

        registry.make_captured(victim, killer.clone());
        registry.set_chase_target(killer, inherited.clone());
        info!(
            %killer,
            %victim,
            new_target = ?inherited,
            "correct capture, ring contracted"
        );

        Some(CaptureOutcome {
            killer: killer.clone(),
            victim: victim.clone(),
            new_target: inherited,
            abandoned_followers,
        })
    }

    pub fn capture_on_wrong_kill(
        &mut self,
        registry: &mut ParticipantRegistry,
        killer: &ParticipantId,
        victim: &ParticipantId,
    ) -> Option<CaptureOutcome> {
        let Some(killer_data) = registry.get(killer) else {
            warn!(%killer, %victim, "wrong capture skipped: killer missing");
            return None;
        };
        if !registry.contains(victim) {
            warn!(%killer, %victim, "wrong capture skipped: victim missing");
            return None;
        }
        if killer == victim
            || !killer_data.is_hunter()
            || killer_data.chase_target() == Some(victim)
        {
            warn!(%killer, %victim, "wrong capture skipped: preconditions not met");
            return None;
        }

        let kept_target = killer_data.chase_target().cloned();
        let abandoned_followers = registry.followers_of(victim);
        registry.make_captured(victim, killer.clone());
        info!(%killer, %victim, "wrong capture, killer keeps target");

        Some(CaptureOutcome {
            killer: killer.clone(),
            victim: victim.clone(),
            new_target: kept_target,
            abandoned_followers,
        })
    }

    /// Runs before the caller removes `leaving` from the registry.
    pub fn handle_hunter_departure(
        &mut self,
        registry: &mut ParticipantRegistry,
        leaving: &ParticipantId,
    ) -> DepartureOutcome {
        let Some(leaving_data) = registry.get(leaving) else {
            warn!(%leaving, "departure skipped: participant missing");
            return DepartureOutcome::Unknown;
        };
        if !leaving_data.is_hunter() {
            return DepartureOutcome::NotHunter;
        }

        let old_target = leaving_data.chase_target().cloned();
        let followers = registry.followers_of(leaving);
        let pointing_at_leaving: Vec<ParticipantId> = registry
            .hunters_targeting(leaving)
            .into_iter()
            .filter(|id| id != leaving)
            .collect();

        if followers.is_empty() {
            for hunter in &pointing_at_leaving {
                registry.set_chase_target(hunter, None);
            }
            info!(
                %leaving,
                orphaned = pointing_at_leaving.len(),
                "hunter left without followers, ring broken"
            );
            return DepartureOutcome::Broken {
                orphaned: pointing_at_leaving,
            };
        }

        let successor = followers[self.rng.pick_index(followers.len())].clone();
        let inherited_target = match old_target {
            Some(target) if target == *leaving => Some(successor.clone()),
            other => other,
        };
        registry.make_hunter(&successor, inherited_target.clone());

        let reassigned: Vec<ParticipantId> = followers
            .into_iter()
            .filter(|id| *id != successor)
            .collect();
        for follower in &reassigned {
            registry.make_captured(follower, successor.clone());
        }
        for hunter in &pointing_at_leaving {
            registry.set_chase_target(hunter, Some(successor.clone()));
        }
        info!(
            %leaving,
            %successor,
            inherited_target = ?inherited_target,
            reassigned = reassigned.len(),
            "hunter left, follower promoted"
        );

        DepartureOutcome::Succeeded {
            successor,
            inherited_target,
            reassigned,
            repointed: pointing_at_leaving,
        }
    }

    /// Not triggered by any event; an operator tool for repairing a split ring.
    pub fn reorganize_remaining_hunters(
        &mut self,
        registry: &mut ParticipantRegistry,
    ) -> Vec<ParticipantId> {
        let mut hunters = registry.hunter_ids();
        if hunters.is_empty() {
            warn!("ring reorganisation skipped: no hunters remain");
            return hunters;
        }
        self.rng.shuffle(&mut hunters);
        Self::link_in_order(registry, &hunters);
        info!(hunters = hunters.len(), "ring reorganised");
        hunters
    }

    pub fn ring_shape(registry: &ParticipantRegistry) -> RingShape {
        let next: BTreeMap<ParticipantId, Option<ParticipantId>> = registry
            .iter()
            .filter(|participant| participant.is_hunter())
            .map(|participant| {
                let target = participant
                    .chase_target()
                    .filter(|target| registry.get(target).is_some_and(|t| t.is_hunter()))
                    .cloned();
                (participant.id().clone(), target)
            })
            .collect();

        let mut shape = RingShape::default();
        for (hunter, target) in &next {
            if target.is_none() {
                shape.broken_at.push(hunter.clone());
            }
        }

        let mut settled: BTreeSet<ParticipantId> = BTreeSet::new();
        for start in next.keys() {
            if settled.contains(start) {
                continue;
            }
            let mut path: Vec<ParticipantId> = Vec::new();
            let mut cursor = Some(start.clone());
            while let Some(current) = cursor {
                if settled.contains(&current) {
                    break;
                }
                if let Some(pos) = path.iter().position(|id| *id == current) {
                    shape.cycles.push(path[pos..].to_vec());
                    break;
                }
                path.push(current.clone());
                cursor = next.get(&current).cloned().flatten();
            }
            settled.extend(path);
        }
        shape
    }
}
