use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingRespawn {
    pub due_at_ms: u64,
    pub place_near_owner: bool,
}

impl ChainTagSession {
    pub(super) fn schedule_respawn(
        &mut self,
        id: &ParticipantId,
        now_ms: u64,
        delay_ms: u64,
        place_near_owner: bool,
    ) {
        self.pending_respawns.insert(
            id.clone(),
            PendingRespawn {
                due_at_ms: now_ms.saturating_add(delay_ms),
                place_near_owner,
            },
        );
        self.events.push(SessionEvent::RespawnScheduled {
            participant_id: id.clone(),
            delay_ms,
        });
    }

    pub fn pending_respawn(&self, id: &ParticipantId) -> Option<&PendingRespawn> {
        self.pending_respawns.get(id)
    }

    pub fn next_respawn_due_ms(&self) -> Option<u64> {
        self.pending_respawns
            .values()
            .map(|pending| pending.due_at_ms)
            .min()
    }

    /// Consumes the pending entry once it is due. Departed participants have no
    /// entry, so a timer that outlived them resolves to `None`.
    pub fn fire_respawn(&mut self, id: &ParticipantId, now_ms: u64) -> Option<RespawnPlan> {
        let pending = *self.pending_respawns.get(id)?;
        if !self.registry.contains(id) {
            self.pending_respawns.remove(id);
            return None;
        }
        if now_ms < pending.due_at_ms {
            return None;
        }
        self.pending_respawns.remove(id);

        // resolved now: the owner may have changed since the death
        let leader = if pending.place_near_owner {
            self.team_leader_of(id).filter(|leader| leader != id)
        } else {
            None
        };
        Some(RespawnPlan {
            participant_id: id.clone(),
            leader,
        })
    }

    pub fn respawn_into<W>(
        &mut self,
        id: &ParticipantId,
        now_ms: u64,
        world: &mut W,
    ) -> Option<Placement>
    where
        W: RespawnWorld + ?Sized,
    {
        let plan = self.fire_respawn(id, now_ms)?;
        let placed = place_respawn(&plan, &self.config.placement, world);
        info!(
            participant = %id,
            anchor = ?placed.anchor,
            "participant respawned"
        );
        self.events.push(SessionEvent::Respawned {
            participant_id: id.clone(),
            anchor: placed.anchor,
        });
        Some(placed)
    }

    /// Fires every respawn due at `now_ms`.
    pub fn respawn_due<W>(&mut self, now_ms: u64, world: &mut W) -> Vec<(ParticipantId, Placement)>
    where
        W: RespawnWorld + ?Sized,
    {
        let due: Vec<ParticipantId> = self
            .pending_respawns
            .iter()
            .filter(|(_, pending)| pending.due_at_ms <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();
        let mut placed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(placement) = self.respawn_into(&id, now_ms, world) {
                placed.push((id, placement));
            }
        }
        placed
    }
}
