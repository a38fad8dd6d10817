use rand::Rng;
use tap_types::{DeviceProfile, GameError, PlayArea};

use crate::Millis;

pub const PRIMARY_TAP_POINTS: u32 = 1;
pub const DEFAULT_ROUND_SECONDS: u32 = 30;

/// Wait before each primary target appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnDelay {
    Uniform { min_ms: Millis, max_ms: Millis },
    Fixed(Millis),
}

impl SpawnDelay {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Millis {
        match *self {
            SpawnDelay::Uniform { min_ms, max_ms } => rng.random_range(min_ms..=max_ms),
            SpawnDelay::Fixed(ms) => ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundConfig {
    pub duration_secs: u32,
    pub device: DeviceProfile,
    pub play_area: PlayArea,
    pub spawn_delay: SpawnDelay,
    pub target_visible_ms: Millis,
    pub target_size: u32,
    pub bonus_offsets_ms: Vec<Millis>,
    pub bonus_jitter_ms: Millis,
    pub bonus_visible_ms: Millis,
    pub bonus_size: u32,
    pub bonus_value: u32,
}

impl RoundConfig {
    pub fn for_device(device: DeviceProfile) -> Self {
        let (spawn_delay, target_visible_ms) = match device {
            DeviceProfile::Desktop => (
                SpawnDelay::Uniform {
                    min_ms: 300,
                    max_ms: 1300,
                },
                800,
            ),
            // Touch input is slower to land, so targets come faster but stay longer.
            DeviceProfile::Touch => (SpawnDelay::Fixed(400), 1000),
        };

        Self {
            duration_secs: DEFAULT_ROUND_SECONDS,
            device,
            play_area: PlayArea {
                width: 800,
                height: 600,
            },
            spawn_delay,
            target_visible_ms,
            target_size: 60,
            bonus_offsets_ms: vec![5_000, 11_000, 18_000, 25_000],
            bonus_jitter_ms: 2_000,
            bonus_visible_ms: 1_000,
            bonus_size: 90,
            bonus_value: 5,
        }
    }

    pub fn with_duration(mut self, duration_secs: u32) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn with_play_area(mut self, play_area: PlayArea) -> Self {
        self.play_area = play_area;
        self
    }

    pub fn round_ms(&self) -> Millis {
        Millis::from(self.duration_secs) * 1000
    }

    pub fn validate(&self) -> Result<(), GameError> {
        let invalid = |reason: &str| {
            Err(GameError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.duration_secs == 0 {
            return invalid("round duration must be at least one second");
        }
        if let SpawnDelay::Uniform { min_ms, max_ms } = self.spawn_delay {
            if min_ms > max_ms {
                return invalid("spawn delay range is empty");
            }
        }
        if self.target_visible_ms == 0 || self.bonus_visible_ms == 0 {
            return invalid("visible durations must be positive");
        }
        if self.bonus_value == 0 {
            return invalid("bonus value must be positive");
        }
        if self.target_size == 0 || self.bonus_size == 0 {
            return invalid("target sizes must be positive");
        }
        Ok(())
    }
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self::for_device(DeviceProfile::Desktop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_device_defaults() {
        let desktop = RoundConfig::for_device(DeviceProfile::Desktop);
        assert_eq!(desktop.duration_secs, 30);
        assert_eq!(desktop.target_visible_ms, 800);
        assert_eq!(
            desktop.spawn_delay,
            SpawnDelay::Uniform {
                min_ms: 300,
                max_ms: 1300
            }
        );

        let touch = RoundConfig::for_device(DeviceProfile::Touch);
        assert_eq!(touch.spawn_delay, SpawnDelay::Fixed(400));
        assert!(touch.bonus_size > touch.target_size);
    }

    #[test]
    fn test_spawn_delay_sampling_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = SpawnDelay::Uniform {
            min_ms: 300,
            max_ms: 1300,
        };
        for _ in 0..1000 {
            let sample = delay.sample(&mut rng);
            assert!((300..=1300).contains(&sample));
        }
        assert_eq!(SpawnDelay::Fixed(400).sample(&mut rng), 400);
    }

    #[test]
    fn test_validation_rejects_bad_configs() {
        assert!(RoundConfig::default().validate().is_ok());
        assert!(RoundConfig::default().with_duration(0).validate().is_err());

        let mut config = RoundConfig::default();
        config.spawn_delay = SpawnDelay::Uniform {
            min_ms: 10,
            max_ms: 5,
        };
        assert!(matches!(
            config.validate(),
            Err(GameError::InvalidConfig { .. })
        ));

        let mut config = RoundConfig::default();
        config.bonus_visible_ms = 0;
        assert!(config.validate().is_err());
    }
}
