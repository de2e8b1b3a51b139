pub const MIN_PARTICIPANTS: usize = 2;
pub const MAX_PARTICIPANTS: usize = 10;
pub const COUNTDOWN_SECS: u64 = 5;

pub const ATTRIBUTION_WINDOW_MS: u64 = 15_000;

pub const WIN_POLL_INITIAL_DELAY_MS: u64 = 5_000;
pub const WIN_POLL_INTERVAL_MS: u64 = 10_000;

pub const RESPAWN_BASE_MS: u64 = 60_000;
pub const RESPAWN_GROWTH: f64 = 1.2;
pub const RESPAWN_MIN_MS: u64 = 1_000;
pub const RESPAWN_MAX_MS: u64 = 180_000;

pub const NEAR_OWNER_RADIUS: u32 = 50;
pub const NEAR_OWNER_MIN_DISTANCE: u32 = 10;
pub const NEAR_OWNER_ATTEMPTS: u32 = 100;
pub const ZONE_SPAWN_ATTEMPTS: u32 = 500;

/// Exponential backoff on the death counter. `death_count` is the count after
/// the death being handled, so the first death waits exactly `base_ms`.
pub fn get_respawn_delay_ms(
    death_count: u32,
    base_ms: u64,
    growth: f64,
    min_ms: u64,
    max_ms: u64,
) -> u64 {
    let exponent = death_count.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = (base_ms as f64 * growth.powi(exponent)).round();
    let raw_ms = if raw.is_finite() && raw >= 0.0 {
        raw.min(u64::MAX as f64) as u64
    } else {
        max_ms
    };
    raw_ms.clamp(min_ms, max_ms.max(min_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_delay(death_count: u32) -> u64 {
        get_respawn_delay_ms(
            death_count,
            RESPAWN_BASE_MS,
            RESPAWN_GROWTH,
            RESPAWN_MIN_MS,
            RESPAWN_MAX_MS,
        )
    }

    #[test]
    fn first_death_waits_base_delay() {
        assert_eq!(default_delay(1), 60_000);
    }

    #[test]
    fn delay_grows_monotonically_until_clamped() {
        let mut previous = 0;
        for count in 1..=20 {
            let delay = default_delay(count);
            assert!(delay >= previous);
            previous = delay;
        }
        assert_eq!(default_delay(20), RESPAWN_MAX_MS);
    }

    #[test]
    fn delay_respects_minimum_bound() {
        assert_eq!(get_respawn_delay_ms(1, 10, 1.0, 500, 1_000), 500);
    }

    #[test]
    fn zero_deaths_are_treated_like_first_death() {
        assert_eq!(default_delay(0), default_delay(1));
    }
}
