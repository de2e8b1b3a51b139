use tracing::{debug, warn};

use crate::config::PlacementConfig;
use crate::types::{Location, ParticipantId, RespawnAnchor};

pub trait SpawnLocator {
    fn find_safe_location(
        &mut self,
        center: Location,
        radius: u32,
        min_distance: u32,
        attempts: u32,
    ) -> Option<Location>;
}

/// Restores health, inventory and movement mode. Never touches roles.
pub trait StateReset {
    fn reset(&mut self, participant: &ParticipantId);
}

pub trait ZoneGeometry {
    fn zone_center(&self) -> Location;
    fn zone_size(&self) -> u32;
    fn world_spawn(&self) -> Location;
    fn location_of(&self, participant: &ParticipantId) -> Option<Location>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RespawnPlan {
    pub participant_id: ParticipantId,
    /// Team leader to respawn beside, resolved when the timer fired.
    pub leader: Option<ParticipantId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub location: Location,
    pub anchor: RespawnAnchor,
}

/// Everything a respawn needs from the host world.
pub trait RespawnWorld: SpawnLocator + StateReset + ZoneGeometry {}

impl<T: SpawnLocator + StateReset + ZoneGeometry + ?Sized> RespawnWorld for T {}

pub fn place_respawn<W>(plan: &RespawnPlan, placement: &PlacementConfig, world: &mut W) -> Placement
where
    W: RespawnWorld + ?Sized,
{
    let near_leader = plan
        .leader
        .as_ref()
        .and_then(|leader| world.location_of(leader))
        .and_then(|center| {
            world.find_safe_location(
                center,
                placement.near_owner_radius,
                placement.near_owner_min_distance,
                placement.near_owner_attempts,
            )
        });

    let placed = match near_leader {
        Some(location) => Placement {
            location,
            anchor: RespawnAnchor::Leader,
        },
        None => {
            if plan.leader.is_some() {
                debug!(participant = %plan.participant_id, "no spot near leader, using zone");
            }
            let center = world.zone_center();
            let size = world.zone_size();
            match world.find_safe_location(center, size, 0, placement.zone_attempts) {
                Some(location) => Placement {
                    location,
                    anchor: RespawnAnchor::Zone,
                },
                None => {
                    warn!(
                        participant = %plan.participant_id,
                        "no safe spot in zone, using world spawn"
                    );
                    Placement {
                        location: world.world_spawn(),
                        anchor: RespawnAnchor::WorldSpawn,
                    }
                }
            }
        }
    };

    world.reset(&plan.participant_id);
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    fn id(value: &str) -> ParticipantId {
        ParticipantId::from(value)
    }

    fn at(x: f64, z: f64) -> Location {
        Location { x, y: 64.0, z }
    }

    #[derive(Default)]
    struct ScriptedWorld {
        positions: HashMap<ParticipantId, Location>,
        answers: VecDeque<Option<Location>>,
        searches: Vec<(Location, u32, u32, u32)>,
        resets: Vec<ParticipantId>,
    }

    impl SpawnLocator for ScriptedWorld {
        fn find_safe_location(
            &mut self,
            center: Location,
            radius: u32,
            min_distance: u32,
            attempts: u32,
        ) -> Option<Location> {
            self.searches.push((center, radius, min_distance, attempts));
            self.answers.pop_front().flatten()
        }
    }

    impl StateReset for ScriptedWorld {
        fn reset(&mut self, participant: &ParticipantId) {
            self.resets.push(participant.clone());
        }
    }

    impl ZoneGeometry for ScriptedWorld {
        fn zone_center(&self) -> Location {
            at(0.0, 0.0)
        }

        fn zone_size(&self) -> u32 {
            300
        }

        fn world_spawn(&self) -> Location {
            at(-1.0, -1.0)
        }

        fn location_of(&self, participant: &ParticipantId) -> Option<Location> {
            self.positions.get(participant).copied()
        }
    }

    fn plan(leader: Option<&str>) -> RespawnPlan {
        RespawnPlan {
            participant_id: id("victim"),
            leader: leader.map(id),
        }
    }

    #[test]
    fn places_near_leader_first() {
        let mut world = ScriptedWorld::default();
        world.positions.insert(id("leader"), at(100.0, 100.0));
        world.answers.push_back(Some(at(120.0, 100.0)));

        let placed = place_respawn(
            &plan(Some("leader")),
            &PlacementConfig::default(),
            &mut world,
        );
        assert_eq!(placed.anchor, RespawnAnchor::Leader);
        assert_eq!(placed.location, at(120.0, 100.0));
        assert_eq!(world.searches, vec![(at(100.0, 100.0), 50, 10, 100)]);
        assert_eq!(world.resets, vec![id("victim")]);
    }

    #[test]
    fn falls_back_to_zone_when_leader_spot_fails() {
        let mut world = ScriptedWorld::default();
        world.positions.insert(id("leader"), at(100.0, 100.0));
        world.answers.push_back(None);
        world.answers.push_back(Some(at(5.0, 5.0)));

        let placed = place_respawn(
            &plan(Some("leader")),
            &PlacementConfig::default(),
            &mut world,
        );
        assert_eq!(placed.anchor, RespawnAnchor::Zone);
        assert_eq!(world.searches.len(), 2);
        assert_eq!(world.searches[1], (at(0.0, 0.0), 300, 0, 500));
    }

    #[test]
    fn leader_without_position_goes_straight_to_zone() {
        let mut world = ScriptedWorld::default();
        world.answers.push_back(Some(at(5.0, 5.0)));
        let placed = place_respawn(
            &plan(Some("leader")),
            &PlacementConfig::default(),
            &mut world,
        );
        assert_eq!(placed.anchor, RespawnAnchor::Zone);
        assert_eq!(world.searches.len(), 1);
    }

    #[test]
    fn world_spawn_is_last_resort() {
        let mut world = ScriptedWorld::default();
        let placed = place_respawn(&plan(None), &PlacementConfig::default(), &mut world);
        assert_eq!(placed.anchor, RespawnAnchor::WorldSpawn);
        assert_eq!(placed.location, at(-1.0, -1.0));
        assert_eq!(world.resets, vec![id("victim")]);
    }
}
