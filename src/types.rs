use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Unassigned,
    Hunter,
    Captured,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Combat,
    Projectile,
    Fall,
    Fire,
    Drowning,
    Explosion,
    Void,
    Zone,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathClassification {
    /// The victim was not an active participant; nothing was mutated.
    Untracked,
    FollowerDeath,
    NaturalDeath,
    CorrectCapture,
    WrongCapture,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WinOutcome {
    NoDecision,
    SessionEnded {
        winner: Option<ParticipantId>,
    },
}

impl WinOutcome {
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::SessionEnded { .. })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DeathOutcome {
    pub victim: ParticipantId,
    pub classification: DeathClassification,
    #[serde(rename = "resolvedKiller")]
    pub resolved_killer: Option<ParticipantId>,
    #[serde(rename = "deathCount")]
    pub death_count: u32,
    #[serde(rename = "respawnDelayMs")]
    pub respawn_delay_ms: u64,
    #[serde(rename = "placeNearOwner")]
    pub place_near_owner: bool,
    pub owner: Option<ParticipantId>,
    pub win: WinOutcome,
}

impl DeathOutcome {
    pub fn untracked(victim: ParticipantId, win: WinOutcome) -> Self {
        Self {
            victim,
            classification: DeathClassification::Untracked,
            resolved_killer: None,
            death_count: 0,
            respawn_delay_ms: 0,
            place_near_owner: false,
            owner: None,
            win,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitVerdict {
    Recorded,
    BlockedSameTeam,
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Countdown,
    InGame,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    Victory,
    NoContestants,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RespawnAnchor {
    Leader,
    Zone,
    WorldSpawn,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    ParticipantJoined {
        #[serde(rename = "participantId")]
        participant_id: ParticipantId,
        count: usize,
    },
    ParticipantLeft {
        #[serde(rename = "participantId")]
        participant_id: ParticipantId,
        remaining: usize,
    },
    CountdownStarted {
        seconds: u64,
    },
    CountdownCancelled,
    SessionStarted {
        order: Vec<ParticipantId>,
    },
    CorrectCapture {
        killer: ParticipantId,
        victim: ParticipantId,
        #[serde(rename = "newTarget")]
        new_target: Option<ParticipantId>,
    },
    WrongCapture {
        killer: ParticipantId,
        victim: ParticipantId,
    },
    NaturalDeath {
        victim: ParticipantId,
        cause: DeathCause,
    },
    FollowerDeath {
        victim: ParticipantId,
        owner: Option<ParticipantId>,
    },
    HunterSucceeded {
        departed: ParticipantId,
        successor: ParticipantId,
        #[serde(rename = "inheritedTarget")]
        inherited_target: Option<ParticipantId>,
    },
    RingBroken {
        departed: ParticipantId,
        orphaned: Vec<ParticipantId>,
    },
    RingReorganized {
        order: Vec<ParticipantId>,
    },
    RespawnScheduled {
        #[serde(rename = "participantId")]
        participant_id: ParticipantId,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
    Respawned {
        #[serde(rename = "participantId")]
        participant_id: ParticipantId,
        anchor: RespawnAnchor,
    },
    SessionEnded {
        winner: Option<ParticipantId>,
        reason: SessionEndReason,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub role: Role,
    #[serde(rename = "chaseTarget")]
    pub chase_target: Option<ParticipantId>,
    pub owner: Option<ParticipantId>,
    #[serde(rename = "deathCount")]
    pub death_count: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    pub participants: Vec<ParticipantView>,
    #[serde(rename = "pendingRespawns")]
    pub pending_respawns: Vec<ParticipantId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub winner: Option<ParticipantId>,
    pub reason: SessionEndReason,
    #[serde(rename = "startedAtMs")]
    pub started_at_ms: u64,
    #[serde(rename = "endedAtMs")]
    pub ended_at_ms: u64,
    #[serde(rename = "endedAtIso")]
    pub ended_at_iso: String,
    pub participants: Vec<ParticipantView>,
}
