use std::collections::BTreeMap;

use crate::types::{ParticipantId, ParticipantView, Role};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Standing {
    Unassigned,
    Hunter { chase_target: Option<ParticipantId> },
    Captured { owner: ParticipantId },
}

#[derive(Clone, Debug)]
pub struct Participant {
    id: ParticipantId,
    standing: Standing,
    death_count: u32,
}

impl Participant {
    fn new(id: ParticipantId) -> Self {
        Self {
            id,
            standing: Standing::Unassigned,
            death_count: 0,
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    pub fn role(&self) -> Role {
        match self.standing {
            Standing::Unassigned => Role::Unassigned,
            Standing::Hunter { .. } => Role::Hunter,
            Standing::Captured { .. } => Role::Captured,
        }
    }

    pub fn is_hunter(&self) -> bool {
        matches!(self.standing, Standing::Hunter { .. })
    }

    pub fn is_captured(&self) -> bool {
        matches!(self.standing, Standing::Captured { .. })
    }

    pub fn chase_target(&self) -> Option<&ParticipantId> {
        match &self.standing {
            Standing::Hunter { chase_target } => chase_target.as_ref(),
            _ => None,
        }
    }

    pub fn owner(&self) -> Option<&ParticipantId> {
        match &self.standing {
            Standing::Captured { owner } => Some(owner),
            _ => None,
        }
    }

    pub fn death_count(&self) -> u32 {
        self.death_count
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.id.clone(),
            role: self.role(),
            chase_target: self.chase_target().cloned(),
            owner: self.owner().cloned(),
            death_count: self.death_count,
        }
    }
}

/// Arena of active participants. Role fields are only reachable through the
/// crate-private mutators below, which the ring and the resolver call.
#[derive(Clone, Debug, Default)]
pub struct ParticipantRegistry {
    participants: BTreeMap<ParticipantId, Participant>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the identity is already registered.
    pub fn insert(&mut self, id: ParticipantId) -> bool {
        if self.participants.contains_key(&id) {
            return false;
        }
        self.participants.insert(id.clone(), Participant::new(id));
        true
    }

    pub fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        self.participants.remove(id)
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        self.participants.keys().cloned().collect()
    }

    pub fn hunter_ids(&self) -> Vec<ParticipantId> {
        self.iter()
            .filter(|participant| participant.is_hunter())
            .map(|participant| participant.id.clone())
            .collect()
    }

    pub fn followers_of(&self, owner: &ParticipantId) -> Vec<ParticipantId> {
        self.iter()
            .filter(|participant| participant.owner() == Some(owner))
            .map(|participant| participant.id.clone())
            .collect()
    }

    pub fn hunters_targeting(&self, target: &ParticipantId) -> Vec<ParticipantId> {
        self.iter()
            .filter(|participant| participant.chase_target() == Some(target))
            .map(|participant| participant.id.clone())
            .collect()
    }

    pub fn views(&self) -> Vec<ParticipantView> {
        self.iter().map(Participant::view).collect()
    }

    pub(crate) fn make_hunter(
        &mut self,
        id: &ParticipantId,
        chase_target: Option<ParticipantId>,
    ) -> bool {
        let Some(participant) = self.participants.get_mut(id) else {
            return false;
        };
        participant.standing = Standing::Hunter { chase_target };
        true
    }

    /// No-op unless the participant is currently a hunter.
    pub(crate) fn set_chase_target(
        &mut self,
        id: &ParticipantId,
        target: Option<ParticipantId>,
    ) -> bool {
        let Some(participant) = self.participants.get_mut(id) else {
            return false;
        };
        match &mut participant.standing {
            Standing::Hunter { chase_target } => {
                *chase_target = target;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn make_captured(&mut self, id: &ParticipantId, owner: ParticipantId) -> bool {
        let Some(participant) = self.participants.get_mut(id) else {
            return false;
        };
        participant.standing = Standing::Captured { owner };
        true
    }

    pub(crate) fn increment_death_count(&mut self, id: &ParticipantId) -> Option<u32> {
        let participant = self.participants.get_mut(id)?;
        participant.death_count = participant.death_count.saturating_add(1);
        Some(participant.death_count)
    }
}
