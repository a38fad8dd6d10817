use rand::Rng;
use tap_types::{PlayArea, Position};
use tracing::debug;

use crate::{Millis, SpawnDelay, TimerId, TimerKind, TimerQueue, random_position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpawnPhase {
    Disarmed,
    Waiting(TimerId),
    Visible { position: Position, expiry: TimerId },
}

/// Show/hide cycle of the primary target. At most one timer is outstanding at
/// any moment: either the pre-spawn wait or the visibility timeout.
#[derive(Debug)]
pub struct SpawnScheduler {
    delay: SpawnDelay,
    visible_ms: Millis,
    size: u32,
    area: PlayArea,
    phase: SpawnPhase,
}

impl SpawnScheduler {
    pub fn new(delay: SpawnDelay, visible_ms: Millis, size: u32, area: PlayArea) -> Self {
        Self {
            delay,
            visible_ms,
            size,
            area,
            phase: SpawnPhase::Disarmed,
        }
    }

    pub fn arm<R: Rng + ?Sized>(&mut self, timers: &mut TimerQueue, rng: &mut R, now: Millis) {
        self.disarm(timers);
        self.wait_for_next(timers, rng, now);
    }

    /// Cancels the outstanding timer. Returns the position of the target if
    /// it was visible, so the caller can hide it.
    pub fn disarm(&mut self, timers: &mut TimerQueue) -> Option<Position> {
        match std::mem::replace(&mut self.phase, SpawnPhase::Disarmed) {
            SpawnPhase::Disarmed => None,
            SpawnPhase::Waiting(id) => {
                timers.cancel(id);
                None
            }
            SpawnPhase::Visible { position, expiry } => {
                timers.cancel(expiry);
                Some(position)
            }
        }
    }

    pub fn on_spawn_delay<R: Rng + ?Sized>(
        &mut self,
        timers: &mut TimerQueue,
        rng: &mut R,
        id: TimerId,
        at: Millis,
    ) -> Option<Position> {
        if self.phase != SpawnPhase::Waiting(id) {
            return None;
        }

        let position = random_position(rng, self.area, self.size);
        let expiry = timers.schedule(at + self.visible_ms, TimerKind::TargetExpiry);
        self.phase = SpawnPhase::Visible { position, expiry };
        debug!("Target shown at ({}, {}) t={}ms", position.x, position.y, at);
        Some(position)
    }

    /// Returns `true` when the visible target timed out and was hidden.
    pub fn on_expiry<R: Rng + ?Sized>(
        &mut self,
        timers: &mut TimerQueue,
        rng: &mut R,
        id: TimerId,
        at: Millis,
    ) -> bool {
        match self.phase {
            SpawnPhase::Visible { expiry, .. } if expiry == id => {
                debug!("Target expired t={}ms", at);
                self.wait_for_next(timers, rng, at);
                true
            }
            _ => false,
        }
    }

    /// Registers a tap on the primary target. Returns `true` on a hit.
    pub fn tap<R: Rng + ?Sized>(&mut self, timers: &mut TimerQueue, rng: &mut R, now: Millis) -> bool {
        match self.phase {
            SpawnPhase::Visible { expiry, .. } => {
                timers.cancel(expiry);
                self.wait_for_next(timers, rng, now);
                true
            }
            _ => false,
        }
    }

    pub fn visible_target(&self) -> Option<Position> {
        match self.phase {
            SpawnPhase::Visible { position, .. } => Some(position),
            _ => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.phase != SpawnPhase::Disarmed
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    fn wait_for_next<R: Rng + ?Sized>(&mut self, timers: &mut TimerQueue, rng: &mut R, now: Millis) {
        let delay = self.delay.sample(rng);
        self.phase = SpawnPhase::Waiting(timers.schedule(now + delay, TimerKind::SpawnDelay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn scheduler() -> SpawnScheduler {
        SpawnScheduler::new(
            SpawnDelay::Uniform {
                min_ms: 300,
                max_ms: 1300,
            },
            800,
            60,
            PlayArea {
                width: 800,
                height: 600,
            },
        )
    }

    fn fire_next(
        spawner: &mut SpawnScheduler,
        timers: &mut TimerQueue,
        rng: &mut StdRng,
    ) -> (Millis, TimerKind) {
        let fired = timers.pop_due(Millis::MAX).unwrap();
        match fired.kind {
            TimerKind::SpawnDelay => {
                spawner.on_spawn_delay(timers, rng, fired.id, fired.deadline);
            }
            TimerKind::TargetExpiry => {
                spawner.on_expiry(timers, rng, fired.id, fired.deadline);
            }
            other => panic!("unexpected timer {:?}", other),
        }
        (fired.deadline, fired.kind)
    }

    #[test]
    fn test_cycle_waits_shows_and_expires() {
        let mut timers = TimerQueue::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut spawner = scheduler();

        spawner.arm(&mut timers, &mut rng, 0);
        assert_eq!(timers.pending(), 1);
        assert!(spawner.visible_target().is_none());

        let (shown_at, kind) = fire_next(&mut spawner, &mut timers, &mut rng);
        assert_eq!(kind, TimerKind::SpawnDelay);
        assert!((300..=1300).contains(&shown_at));
        assert!(spawner.visible_target().is_some());
        assert_eq!(timers.pending(), 1);

        let (hidden_at, kind) = fire_next(&mut spawner, &mut timers, &mut rng);
        assert_eq!(kind, TimerKind::TargetExpiry);
        assert_eq!(hidden_at, shown_at + 800);
        assert!(spawner.visible_target().is_none());
        assert_eq!(timers.pending(), 1);
    }

    #[test]
    fn test_tap_hides_and_restarts_wait() {
        let mut timers = TimerQueue::new();
        let mut rng = StdRng::seed_from_u64(11);
        let mut spawner = scheduler();

        spawner.arm(&mut timers, &mut rng, 0);
        assert!(!spawner.tap(&mut timers, &mut rng, 10));

        let (shown_at, _) = fire_next(&mut spawner, &mut timers, &mut rng);
        assert!(spawner.tap(&mut timers, &mut rng, shown_at + 100));
        assert!(spawner.visible_target().is_none());
        assert_eq!(timers.pending(), 1);

        let next = timers.next_deadline().unwrap();
        assert!(next >= shown_at + 100 + 300);
        assert!(next <= shown_at + 100 + 1300);
    }

    #[test]
    fn test_disarm_cancels_either_timer() {
        let mut timers = TimerQueue::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut spawner = scheduler();

        spawner.arm(&mut timers, &mut rng, 0);
        assert_eq!(spawner.disarm(&mut timers), None);
        assert!(timers.is_empty());

        spawner.arm(&mut timers, &mut rng, 0);
        fire_next(&mut spawner, &mut timers, &mut rng);
        assert!(spawner.disarm(&mut timers).is_some());
        assert!(timers.is_empty());
        assert!(!spawner.is_armed());
        assert_eq!(spawner.disarm(&mut timers), None);
    }
}
