use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::attribution::{AttackAttributionTracker, AttributionOptions};
use crate::chain_ring::{ChainRing, DepartureOutcome};
use crate::config::SessionConfig;
use crate::death_resolver::{DeathReport, DeathResolver};
use crate::registry::{Participant, ParticipantRegistry};
use crate::respawn::{place_respawn, Placement, RespawnPlan, RespawnWorld};
use crate::types::{
    DeathClassification, DeathOutcome, HitVerdict, ParticipantId, SessionEndReason, SessionEvent,
    SessionSnapshot, SessionStatus, SessionSummary, WinOutcome,
};
use crate::win_condition;

mod lifecycle;
mod respawn_system;

pub use self::respawn_system::PendingRespawn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session is not accepting joins while {0:?}")]
    NotWaiting(SessionStatus),
    #[error("session is already running")]
    AlreadyRunning,
    #[error("session is not running")]
    NotRunning,
    #[error("no countdown in progress")]
    NoCountdown,
    #[error("need at least {required} participants, have {current}")]
    NotEnoughPlayers { required: usize, current: usize },
    #[error("session is full ({max} participants)")]
    SessionFull { max: usize },
    #[error("{0} already joined")]
    AlreadyJoined(ParticipantId),
    #[error("{0} is not in the session")]
    NotInSession(ParticipantId),
    #[error("participants cannot leave during the countdown")]
    CountdownInProgress,
    #[error("session coordinator has stopped")]
    CoordinatorClosed,
}

/// Owns every piece of session state. All mutation goes through `&mut self`,
/// so a single owner (the coordinator task) serialises triggers.
#[derive(Clone, Debug)]
pub struct ChainTagSession {
    config: SessionConfig,
    status: SessionStatus,
    registry: ParticipantRegistry,
    tracker: AttackAttributionTracker,
    ring: ChainRing,
    resolver: DeathResolver,
    pending_respawns: BTreeMap<ParticipantId, PendingRespawn>,
    events: Vec<SessionEvent>,
    started_at_ms: u64,
    countdown_epoch: u64,
    last_summary: Option<SessionSummary>,
}

impl ChainTagSession {
    pub fn new(config: SessionConfig) -> Self {
        let config = config.validated();
        let seed = config.seed.unwrap_or_else(rand::random::<u32>);
        let tracker = AttackAttributionTracker::new(AttributionOptions {
            window_ms: config.attribution_window_ms,
        });
        let resolver = DeathResolver::new(config.respawn);
        Self {
            config,
            status: SessionStatus::Waiting,
            registry: ParticipantRegistry::new(),
            tracker,
            ring: ChainRing::new(seed),
            resolver,
            pending_respawns: BTreeMap::new(),
            events: Vec::new(),
            started_at_ms: 0,
            countdown_epoch: 0,
            last_summary: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::InGame
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.registry.get(id)
    }

    pub fn owner_of(&self, id: &ParticipantId) -> Option<ParticipantId> {
        self.registry
            .get(id)
            .and_then(|participant| participant.owner().cloned())
    }

    /// A hunter leads itself; a captured participant is led by its owner.
    pub fn team_leader_of(&self, id: &ParticipantId) -> Option<ParticipantId> {
        let participant = self.registry.get(id)?;
        if participant.is_hunter() {
            return Some(participant.id().clone());
        }
        participant.owner().cloned()
    }

    /// Teammates share a leader, or one directly owns the other.
    pub fn are_teammates(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        if self.owner_of(a).as_ref() == Some(b) || self.owner_of(b).as_ref() == Some(a) {
            return true;
        }
        match (self.team_leader_of(a), self.team_leader_of(b)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    pub fn on_combat_hit(
        &mut self,
        attacker: &ParticipantId,
        victim: &ParticipantId,
        now_ms: u64,
    ) -> HitVerdict {
        if !self.is_running()
            || attacker == victim
            || !self.registry.contains(attacker)
            || !self.registry.contains(victim)
        {
            return HitVerdict::Ignored;
        }
        if self.are_teammates(attacker, victim) {
            debug!(%attacker, %victim, "hit between teammates blocked");
            return HitVerdict::BlockedSameTeam;
        }
        self.tracker.record(attacker, victim, now_ms);
        HitVerdict::Recorded
    }

    pub fn on_death(&mut self, report: &DeathReport) -> DeathOutcome {
        if !self.is_running() {
            return DeathOutcome::untracked(report.victim.clone(), WinOutcome::NoDecision);
        }

        let outcome = self.resolver.resolve(
            &mut self.registry,
            &mut self.tracker,
            &mut self.ring,
            report,
            &mut self.events,
        );

        if let WinOutcome::SessionEnded { winner } = &outcome.win {
            self.end_session(winner.clone(), report.now_ms);
        } else if outcome.classification != DeathClassification::Untracked {
            self.schedule_respawn(
                &outcome.victim,
                report.now_ms,
                outcome.respawn_delay_ms,
                outcome.place_near_owner,
            );
        }
        outcome
    }

    /// Runs departure handling while in game and plain removal otherwise,
    /// then re-evaluates the win condition.
    pub fn on_participant_leave(&mut self, id: &ParticipantId, now_ms: u64) -> WinOutcome {
        if !self.registry.contains(id) {
            warn!(participant = %id, "departure of unknown participant ignored");
            return WinOutcome::NoDecision;
        }

        if self.is_running() {
            match self.ring.handle_hunter_departure(&mut self.registry, id) {
                DepartureOutcome::Succeeded {
                    successor,
                    inherited_target,
                    ..
                } => self.events.push(SessionEvent::HunterSucceeded {
                    departed: id.clone(),
                    successor,
                    inherited_target,
                }),
                DepartureOutcome::Broken { orphaned } => {
                    self.events.push(SessionEvent::RingBroken {
                        departed: id.clone(),
                        orphaned,
                    });
                }
                DepartureOutcome::NotHunter | DepartureOutcome::Unknown => {}
            }
        }

        self.registry.remove(id);
        self.tracker.clear(id);
        self.pending_respawns.remove(id);
        self.events.push(SessionEvent::ParticipantLeft {
            participant_id: id.clone(),
            remaining: self.registry.len(),
        });
        info!(participant = %id, remaining = self.registry.len(), "participant left");

        self.poll_win_condition(now_ms)
    }

    /// Operator tool for re-linking a split ring.
    pub fn reorganize_ring(&mut self) -> Result<Vec<ParticipantId>, SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        let order = self.ring.reorganize_remaining_hunters(&mut self.registry);
        self.events.push(SessionEvent::RingReorganized {
            order: order.clone(),
        });
        Ok(order)
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn take_summary(&mut self) -> Option<SessionSummary> {
        self.last_summary.take()
    }

    pub fn snapshot(&self, now_ms: u64) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            now_ms,
            participants: self.registry.views(),
            pending_respawns: self.pending_respawns.keys().cloned().collect(),
        }
    }
}

fn format_iso(now_ms: u64) -> String {
    i64::try_from(now_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
