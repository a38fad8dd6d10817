use crate::{Millis, TimerId, TimerKind, TimerQueue};

const TICK_MS: Millis = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue(u32),
    Expired,
}

/// 1 Hz countdown for a round.
#[derive(Debug)]
pub struct RoundTimer {
    duration_secs: u32,
    remaining: u32,
    tick: Option<TimerId>,
}

impl RoundTimer {
    pub fn new(duration_secs: u32) -> Self {
        Self {
            duration_secs,
            remaining: duration_secs,
            tick: None,
        }
    }

    pub fn arm(&mut self, timers: &mut TimerQueue, now: Millis) {
        self.disarm(timers);
        self.remaining = self.duration_secs;
        self.tick = Some(timers.schedule(now + TICK_MS, TimerKind::RoundTick));
    }

    pub fn disarm(&mut self, timers: &mut TimerQueue) {
        if let Some(id) = self.tick.take() {
            timers.cancel(id);
        }
    }

    /// Handles a fired tick. Returns `None` for ticks this timer does not own.
    /// The next tick is scheduled from the fired deadline so the countdown
    /// does not drift with late polling.
    pub fn on_tick(
        &mut self,
        timers: &mut TimerQueue,
        id: TimerId,
        at: Millis,
    ) -> Option<TickOutcome> {
        if self.tick != Some(id) {
            return None;
        }
        self.tick = None;

        if self.remaining <= 1 {
            self.remaining = 0;
            return Some(TickOutcome::Expired);
        }

        self.remaining -= 1;
        self.tick = Some(timers.schedule(at + TICK_MS, TimerKind::RoundTick));
        Some(TickOutcome::Continue(self.remaining))
    }

    pub fn time_remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_armed(&self) -> bool {
        self.tick.is_some()
    }
}
