use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    get_respawn_delay_ms, ATTRIBUTION_WINDOW_MS, COUNTDOWN_SECS, MAX_PARTICIPANTS, MIN_PARTICIPANTS,
    NEAR_OWNER_ATTEMPTS, NEAR_OWNER_MIN_DISTANCE, NEAR_OWNER_RADIUS, RESPAWN_BASE_MS,
    RESPAWN_GROWTH, RESPAWN_MAX_MS, RESPAWN_MIN_MS, WIN_POLL_INITIAL_DELAY_MS, WIN_POLL_INTERVAL_MS,
    ZONE_SPAWN_ATTEMPTS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RespawnDelayConfig {
    pub base_ms: u64,
    pub growth: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for RespawnDelayConfig {
    fn default() -> Self {
        Self {
            base_ms: RESPAWN_BASE_MS,
            growth: RESPAWN_GROWTH,
            min_ms: RESPAWN_MIN_MS,
            max_ms: RESPAWN_MAX_MS,
        }
    }
}

impl RespawnDelayConfig {
    pub fn delay_for(&self, death_count: u32) -> u64 {
        get_respawn_delay_ms(
            death_count,
            self.base_ms,
            self.growth,
            self.min_ms,
            self.max_ms,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlacementConfig {
    pub near_owner_radius: u32,
    pub near_owner_min_distance: u32,
    pub near_owner_attempts: u32,
    pub zone_attempts: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            near_owner_radius: NEAR_OWNER_RADIUS,
            near_owner_min_distance: NEAR_OWNER_MIN_DISTANCE,
            near_owner_attempts: NEAR_OWNER_ATTEMPTS,
            zone_attempts: ZONE_SPAWN_ATTEMPTS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub min_participants: usize,
    pub max_participants: usize,
    pub countdown_secs: u64,
    pub attribution_window_ms: u64,
    pub win_poll_initial_delay_ms: u64,
    pub win_poll_interval_ms: u64,
    pub respawn: RespawnDelayConfig,
    pub placement: PlacementConfig,
    pub seed: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_participants: MIN_PARTICIPANTS,
            max_participants: MAX_PARTICIPANTS,
            countdown_secs: COUNTDOWN_SECS,
            attribution_window_ms: ATTRIBUTION_WINDOW_MS,
            win_poll_initial_delay_ms: WIN_POLL_INITIAL_DELAY_MS,
            win_poll_interval_ms: WIN_POLL_INTERVAL_MS,
            respawn: RespawnDelayConfig::default(),
            placement: PlacementConfig::default(),
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let parsed: SessionConfig = serde_json::from_str(raw)?;
        Ok(parsed.validated())
    }

    /// Normalises values that would otherwise make the session unusable.
    pub fn validated(mut self) -> Self {
        self.min_participants = self.min_participants.max(1);
        self.max_participants = self.max_participants.max(self.min_participants);
        self.win_poll_interval_ms = self.win_poll_interval_ms.max(1);
        if !self.respawn.growth.is_finite() || self.respawn.growth < 1.0 {
            self.respawn.growth = 1.0;
        }
        self.respawn.max_ms = self.respawn.max_ms.max(self.respawn.min_ms);
        self.placement.near_owner_min_distance = self
            .placement
            .near_owner_min_distance
            .min(self.placement.near_owner_radius);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = SessionConfig::from_json_str("{}").expect("parse empty config");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn partial_respawn_section_keeps_other_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{ "attributionWindowMs": 5000, "respawn": { "baseMs": 30000 } }"#,
        )
        .expect("parse config");
        assert_eq!(config.attribution_window_ms, 5_000);
        assert_eq!(config.respawn.base_ms, 30_000);
        assert_eq!(config.respawn.max_ms, RESPAWN_MAX_MS);
        assert_eq!(config.max_participants, MAX_PARTICIPANTS);
    }

    #[test]
    fn validated_repairs_inverted_bounds() {
        let config = SessionConfig::from_json_str(
            r#"{
  "minParticipants": 0,
  "maxParticipants": 0,
  "respawn": { "growth": 0.5, "minMs": 5000, "maxMs": 10 }
}"#,
        )
        .expect("parse config");
        assert_eq!(config.min_participants, 1);
        assert_eq!(config.max_participants, 1);
        assert_eq!(config.respawn.growth, 1.0);
        assert_eq!(config.respawn.max_ms, 5_000);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let error = SessionConfig::from_json_str("{ not json").expect_err("should fail");
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let path = std::env::temp_dir()
            .join(format!("chain-tag-missing-{}", std::process::id()))
            .join("config.json");
        let error = SessionConfig::load(&path).expect_err("should fail");
        assert!(matches!(error, ConfigError::Read { .. }));
    }

    #[test]
    fn delay_for_uses_configured_curve() {
        let respawn = RespawnDelayConfig {
            base_ms: 1_000,
            growth: 2.0,
            min_ms: 500,
            max_ms: 5_000,
        };
        assert_eq!(respawn.delay_for(1), 1_000);
        assert_eq!(respawn.delay_for(2), 2_000);
        assert_eq!(respawn.delay_for(3), 4_000);
        assert_eq!(respawn.delay_for(4), 5_000);
    }
}
