use rand::Rng;
use tap_types::{BonusToken, PlayArea, Position};
use tracing::{debug, warn};

use crate::{Millis, RoundConfig, TimerId, TimerKind, TimerQueue, random_position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusAppearance {
    pub token: BonusToken,
    pub position: Position,
    /// Earlier appearance that was still on screen, hidden to keep one live.
    pub displaced: Option<BonusToken>,
}

#[derive(Debug, Clone, Copy)]
struct VisibleBonus {
    token: BonusToken,
    expiry: TimerId,
}

/// One-shot bonus appearances at jittered offsets from round start.
#[derive(Debug)]
pub struct BonusScheduler {
    base_offsets: Vec<Millis>,
    jitter_ms: Millis,
    visible_ms: Millis,
    round_ms: Millis,
    size: u32,
    value: u32,
    area: PlayArea,
    slots: Vec<Option<TimerId>>,
    visible: Option<VisibleBonus>,
    next_token: u32,
}

impl BonusScheduler {
    pub fn new(config: &RoundConfig) -> Self {
        Self {
            base_offsets: config.bonus_offsets_ms.clone(),
            jitter_ms: config.bonus_jitter_ms,
            visible_ms: config.bonus_visible_ms,
            round_ms: config.round_ms(),
            size: config.bonus_size,
            value: config.bonus_value,
            area: config.play_area,
            slots: Vec::new(),
            visible: None,
            next_token: 0,
        }
    }

    pub fn arm<R: Rng + ?Sized>(&mut self, timers: &mut TimerQueue, rng: &mut R, round_start: Millis) {
        self.disarm(timers);

        let offsets = plan_offsets(
            &self.base_offsets,
            self.jitter_ms,
            self.visible_ms,
            self.round_ms,
            rng,
        );
        self.slots = offsets
            .iter()
            .enumerate()
            .map(|(slot, offset)| {
                Some(timers.schedule(round_start + offset, TimerKind::BonusAppear(slot)))
            })
            .collect();
    }

    /// Cancels every pending one-shot and the visibility timeout. Returns the
    /// token of a bonus that was on screen.
    pub fn disarm(&mut self, timers: &mut TimerQueue) -> Option<BonusToken> {
        for id in self.slots.drain(..).flatten() {
            timers.cancel(id);
        }

        self.visible.take().map(|visible| {
            timers.cancel(visible.expiry);
            visible.token
        })
    }

    pub fn on_appear<R: Rng + ?Sized>(
        &mut self,
        timers: &mut TimerQueue,
        rng: &mut R,
        id: TimerId,
        slot: usize,
        at: Millis,
    ) -> Option<BonusAppearance> {
        match self.slots.get_mut(slot) {
            Some(pending) if *pending == Some(id) => *pending = None,
            _ => return None,
        }

        let displaced = self.visible.take().map(|previous| {
            timers.cancel(previous.expiry);
            previous.token
        });

        let token = BonusToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        let position = random_position(rng, self.area, self.size);
        let expiry = timers.schedule(at + self.visible_ms, TimerKind::BonusExpiry);
        self.visible = Some(VisibleBonus { token, expiry });

        debug!("Bonus {:?} shown in slot {} t={}ms", token, slot, at);
        Some(BonusAppearance {
            token,
            position,
            displaced,
        })
    }

    pub fn on_expiry(&mut self, id: TimerId) -> Option<BonusToken> {
        match self.visible {
            Some(visible) if visible.expiry == id => {
                self.visible = None;
                Some(visible.token)
            }
            _ => None,
        }
    }

    /// Returns the bonus value when `token` names the bonus on screen.
    pub fn tap(&mut self, timers: &mut TimerQueue, token: BonusToken) -> Option<u32> {
        match self.visible {
            Some(visible) if visible.token == token => {
                timers.cancel(visible.expiry);
                self.visible = None;
                Some(self.value)
            }
            _ => None,
        }
    }

    pub fn visible_token(&self) -> Option<BonusToken> {
        self.visible.map(|visible| visible.token)
    }

    pub fn pending_appearances(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Jitters each base offset by `0..=jitter_ms`, then pushes offsets apart so
/// visible windows never overlap and pulls them in so every window ends by
/// `round_ms`. Slots that cannot fit are dropped.
pub fn plan_offsets<R: Rng + ?Sized>(
    base_offsets: &[Millis],
    jitter_ms: Millis,
    visible_ms: Millis,
    round_ms: Millis,
    rng: &mut R,
) -> Vec<Millis> {
    let latest = round_ms.saturating_sub(visible_ms);
    let mut earliest = 0;
    let mut offsets = Vec::with_capacity(base_offsets.len());

    for &base in base_offsets {
        let jitter = if jitter_ms > 0 {
            rng.random_range(0..=jitter_ms)
        } else {
            0
        };
        let offset = (base + jitter).max(earliest).min(latest);
        if offset < earliest {
            warn!(
                "Dropping bonus at base offset {}ms: no room before round end",
                base
            );
            continue;
        }

        offsets.push(offset);
        earliest = offset + visible_ms;
    }

    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_reference_offsets_stay_in_windows() {
        let config = RoundConfig::default();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let offsets = plan_offsets(
                &config.bonus_offsets_ms,
                config.bonus_jitter_ms,
                config.bonus_visible_ms,
                config.round_ms(),
                &mut rng,
            );

            assert_eq!(offsets.len(), 4);
            for (offset, base) in offsets.iter().zip(&config.bonus_offsets_ms) {
                assert!(*offset >= *base && *offset <= base + 2_000);
            }
        }
    }

    #[test]
    fn test_offsets_clamped_and_non_overlapping() {
        let mut rng = StdRng::seed_from_u64(9);
        let offsets = plan_offsets(&[1_000, 1_200, 9_500, 9_800], 0, 1_000, 10_000, &mut rng);

        assert_eq!(offsets, vec![1_000, 2_000, 9_000]);
        for pair in offsets.windows(2) {
            assert!(pair[1] >= pair[0] + 1_000);
        }
    }

    #[test]
    fn test_tap_awards_value_once() {
        let config = RoundConfig::default();
        let mut timers = TimerQueue::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut bonus = BonusScheduler::new(&config);

        bonus.arm(&mut timers, &mut rng, 0);
        assert_eq!(timers.pending(), 4);

        let fired = timers.pop_due(Millis::MAX).unwrap();
        let TimerKind::BonusAppear(slot) = fired.kind else {
            panic!("expected bonus appearance, got {:?}", fired.kind);
        };
        let appearance = bonus
            .on_appear(&mut timers, &mut rng, fired.id, slot, fired.deadline)
            .unwrap();
        assert!(appearance.displaced.is_none());
        assert!(config.play_area.contains(appearance.position, config.bonus_size));

        assert_eq!(bonus.tap(&mut timers, BonusToken(999)), None);
        assert_eq!(bonus.tap(&mut timers, appearance.token), Some(5));
        assert_eq!(bonus.tap(&mut timers, appearance.token), None);
        assert_eq!(timers.pending(), 3);
    }

    #[test]
    fn test_untapped_bonus_expires_without_respawn() {
        let config = RoundConfig::default();
        let mut timers = TimerQueue::new();
        let mut rng = StdRng::seed_from_u64(4);
        let mut bonus = BonusScheduler::new(&config);
        bonus.arm(&mut timers, &mut rng, 0);

        let fired = timers.pop_due(Millis::MAX).unwrap();
        let TimerKind::BonusAppear(slot) = fired.kind else {
            panic!("expected bonus appearance");
        };
        let appearance = bonus
            .on_appear(&mut timers, &mut rng, fired.id, slot, fired.deadline)
            .unwrap();

        let expiry = timers.pop_due(Millis::MAX).unwrap();
        assert_eq!(expiry.kind, TimerKind::BonusExpiry);
        assert_eq!(expiry.deadline, fired.deadline + 1_000);
        assert_eq!(bonus.on_expiry(expiry.id), Some(appearance.token));
        assert_eq!(bonus.visible_token(), None);
        assert_eq!(bonus.pending_appearances(), 3);
    }

    #[test]
    fn test_disarm_cancels_everything() {
        let config = RoundConfig::default();
        let mut timers = TimerQueue::new();
        let mut rng = StdRng::seed_from_u64(8);
        let mut bonus = BonusScheduler::new(&config);
        bonus.arm(&mut timers, &mut rng, 0);

        let fired = timers.pop_due(Millis::MAX).unwrap();
        let TimerKind::BonusAppear(slot) = fired.kind else {
            panic!("expected bonus appearance");
        };
        let appearance = bonus
            .on_appear(&mut timers, &mut rng, fired.id, slot, fired.deadline)
            .unwrap();

        assert_eq!(bonus.disarm(&mut timers), Some(appearance.token));
        assert!(timers.is_empty());
        assert_eq!(bonus.disarm(&mut timers), None);
    }

    #[test]
    fn test_tokens_are_fresh_per_appearance() {
        let config = RoundConfig::default();
        let mut timers = TimerQueue::new();
        let mut rng = StdRng::seed_from_u64(6);
        let mut bonus = BonusScheduler::new(&config);
        bonus.arm(&mut timers, &mut rng, 0);

        let mut tokens = Vec::new();
        while let Some(fired) = timers.pop_due(Millis::MAX) {
            match fired.kind {
                TimerKind::BonusAppear(slot) => {
                    let appearance = bonus
                        .on_appear(&mut timers, &mut rng, fired.id, slot, fired.deadline)
                        .unwrap();
                    tokens.push(appearance.token);
                }
                TimerKind::BonusExpiry => {
                    bonus.on_expiry(fired.id);
                }
                other => panic!("unexpected timer {:?}", other),
            }
        }

        assert_eq!(
            tokens,
            vec![BonusToken(0), BonusToken(1), BonusToken(2), BonusToken(3)]
        );
    }
}
