use rand::{Rng, rngs::StdRng};
use tap_types::{BonusToken, GameError, GamePhase, HideReason, Position, ProfileId, RoundResult};
use tracing::{debug, info};

use crate::{
    BonusScheduler, FiredTimer, Millis, PRIMARY_TAP_POINTS, RoundConfig, RoundTimer,
    ScoreLedger, SessionEvent, SpawnScheduler, TickOutcome, TimerKind, TimerQueue,
};

/// Events produced by a tap together with whether it scored.
#[derive(Debug, Clone, PartialEq)]
pub struct TapResolution {
    pub hit: bool,
    pub events: Vec<SessionEvent>,
}

/// Game state machine for one player.
///
/// `Unauthenticated -> Idle -> Playing -> RoundOver -> Idle`, with
/// `Unauthenticated` reachable from every state. The session owns the timer
/// queue and the three timer lineages; callers drive it by passing the
/// current engine time to [`advance`], [`tap_target`] and [`tap_bonus`].
/// Leaving `Playing` cancels every outstanding timer before returning.
///
/// [`advance`]: GameSession::advance
/// [`tap_target`]: GameSession::tap_target
/// [`tap_bonus`]: GameSession::tap_bonus
#[derive(Debug)]
pub struct GameSession<R: Rng = StdRng> {
    config: RoundConfig,
    phase: GamePhase,
    player: Option<ProfileId>,
    timers: TimerQueue,
    round_timer: RoundTimer,
    spawner: SpawnScheduler,
    bonus: BonusScheduler,
    ledger: ScoreLedger,
    last_result: Option<RoundResult>,
    rng: R,
    clock: Millis,
}

impl<R: Rng> GameSession<R> {
    pub fn new(config: RoundConfig, rng: R) -> Result<Self, GameError> {
        config.validate()?;

        Ok(Self {
            round_timer: RoundTimer::new(config.duration_secs),
            spawner: SpawnScheduler::new(
                config.spawn_delay,
                config.target_visible_ms,
                config.target_size,
                config.play_area,
            ),
            bonus: BonusScheduler::new(&config),
            config,
            phase: GamePhase::Unauthenticated,
            player: None,
            timers: TimerQueue::new(),
            ledger: ScoreLedger::new(),
            last_result: None,
            rng,
            clock: 0,
        })
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn player(&self) -> Option<ProfileId> {
        self.player
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    pub fn score(&self) -> u32 {
        self.ledger.score()
    }

    pub fn time_remaining(&self) -> u32 {
        self.round_timer.time_remaining()
    }

    pub fn clock(&self) -> Millis {
        self.clock
    }

    pub fn outstanding_timers(&self) -> usize {
        self.timers.pending()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    pub fn visible_target(&self) -> Option<Position> {
        self.spawner.visible_target()
    }

    pub fn visible_bonus(&self) -> Option<BonusToken> {
        self.bonus.visible_token()
    }

    pub fn last_result(&self) -> Option<RoundResult> {
        self.last_result
    }

    /// Swaps the round configuration. Only allowed outside a round.
    pub fn reconfigure(&mut self, config: RoundConfig) -> Result<(), GameError> {
        if self.phase == GamePhase::Playing {
            return Err(GameError::RoundInProgress);
        }
        config.validate()?;

        self.round_timer = RoundTimer::new(config.duration_secs);
        self.spawner = SpawnScheduler::new(
            config.spawn_delay,
            config.target_visible_ms,
            config.target_size,
            config.play_area,
        );
        self.bonus = BonusScheduler::new(&config);
        self.config = config;
        Ok(())
    }

    pub fn sign_in(&mut self, profile_id: ProfileId) -> Result<Vec<SessionEvent>, GameError> {
        if self.phase != GamePhase::Unauthenticated {
            return Err(GameError::AlreadySignedIn);
        }

        self.player = Some(profile_id);
        info!("Player {} signed in", profile_id);
        Ok(self.enter(GamePhase::Idle))
    }

    /// Signs out from any state. A round in progress is abandoned and
    /// produces no result.
    pub fn sign_out(&mut self, now: Millis) -> Vec<SessionEvent> {
        self.observe(now);
        let mut events = self.disarm_all();
        if self.phase != GamePhase::Unauthenticated {
            if let Some(player) = self.player.take() {
                info!("Player {} signed out", player);
            }
            self.ledger.reset();
            self.last_result = None;
            events.extend(self.enter(GamePhase::Unauthenticated));
        }
        events
    }

    pub fn start_round(&mut self, now: Millis) -> Result<Vec<SessionEvent>, GameError> {
        match self.phase {
            GamePhase::Idle | GamePhase::RoundOver => {}
            GamePhase::Unauthenticated => return Err(GameError::NotSignedIn),
            GamePhase::Playing => return Err(GameError::RoundInProgress),
        }

        self.observe(now);
        let mut events = self.disarm_all();

        self.ledger.reset();
        self.last_result = None;
        self.round_timer.arm(&mut self.timers, self.clock);
        self.spawner.arm(&mut self.timers, &mut self.rng, self.clock);
        self.bonus.arm(&mut self.timers, &mut self.rng, self.clock);

        events.extend(self.enter(GamePhase::Playing));
        events.push(SessionEvent::RoundStarted {
            time_remaining: self.round_timer.time_remaining(),
        });
        info!(
            "Round started for {:?} ({}s, {} timers armed)",
            self.player,
            self.config.duration_secs,
            self.timers.pending()
        );
        Ok(events)
    }

    pub fn return_to_idle(&mut self) -> Result<Vec<SessionEvent>, GameError> {
        if self.phase != GamePhase::RoundOver {
            return Err(GameError::NoFinishedRound);
        }
        Ok(self.enter(GamePhase::Idle))
    }

    /// Fires every timer due at or before `now`, in deadline order.
    pub fn advance(&mut self, now: Millis) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(fired) = self.timers.pop_due(now) {
            self.clock = self.clock.max(fired.deadline);
            self.dispatch(fired, &mut events);
        }
        self.observe(now);
        events
    }

    /// Timers due at exactly `now` fire before the tap is resolved, so a tap
    /// landing on the expiry instant is a miss.
    pub fn tap_target(&mut self, now: Millis) -> Result<TapResolution, GameError> {
        self.ensure_playing()?;
        let mut events = self.advance(now);
        if self.phase != GamePhase::Playing {
            return Ok(TapResolution { hit: false, events });
        }

        let hit = self.spawner.tap(&mut self.timers, &mut self.rng, self.clock);
        if hit {
            events.push(SessionEvent::TargetHidden {
                reason: HideReason::Tapped,
            });
            events.push(self.credit(PRIMARY_TAP_POINTS)?);
        }
        Ok(TapResolution { hit, events })
    }

    pub fn tap_bonus(&mut self, now: Millis, token: BonusToken) -> Result<TapResolution, GameError> {
        self.ensure_playing()?;
        let mut events = self.advance(now);
        if self.phase != GamePhase::Playing {
            return Ok(TapResolution { hit: false, events });
        }

        let hit = match self.bonus.tap(&mut self.timers, token) {
            Some(value) => {
                events.push(SessionEvent::BonusHidden {
                    token,
                    reason: HideReason::Tapped,
                });
                events.push(self.credit(value)?);
                true
            }
            None => {
                debug!("Ignoring tap on stale bonus {:?}", token);
                false
            }
        };
        Ok(TapResolution { hit, events })
    }

    fn ensure_playing(&self) -> Result<(), GameError> {
        match self.phase {
            GamePhase::Playing => Ok(()),
            GamePhase::Unauthenticated => Err(GameError::NotSignedIn),
            _ => Err(GameError::NotPlaying),
        }
    }

    fn credit(&mut self, points: u32) -> Result<SessionEvent, GameError> {
        let score = self.ledger.add(points)?;
        Ok(SessionEvent::ScoreChanged {
            score,
            delta: points,
        })
    }

    fn dispatch(&mut self, fired: FiredTimer, events: &mut Vec<SessionEvent>) {
        match fired.kind {
            TimerKind::RoundTick => {
                match self
                    .round_timer
                    .on_tick(&mut self.timers, fired.id, fired.deadline)
                {
                    Some(TickOutcome::Continue(time_remaining)) => {
                        events.push(SessionEvent::Tick { time_remaining });
                    }
                    Some(TickOutcome::Expired) => {
                        events.push(SessionEvent::Tick { time_remaining: 0 });
                        self.finish_round(events);
                    }
                    None => {}
                }
            }
            TimerKind::SpawnDelay => {
                if let Some(position) = self.spawner.on_spawn_delay(
                    &mut self.timers,
                    &mut self.rng,
                    fired.id,
                    fired.deadline,
                ) {
                    events.push(SessionEvent::TargetShown {
                        position,
                        size: self.spawner.size(),
                    });
                }
            }
            TimerKind::TargetExpiry => {
                if self.spawner.on_expiry(
                    &mut self.timers,
                    &mut self.rng,
                    fired.id,
                    fired.deadline,
                ) {
                    events.push(SessionEvent::TargetHidden {
                        reason: HideReason::Expired,
                    });
                }
            }
            TimerKind::BonusAppear(slot) => {
                if let Some(appearance) = self.bonus.on_appear(
                    &mut self.timers,
                    &mut self.rng,
                    fired.id,
                    slot,
                    fired.deadline,
                ) {
                    if let Some(token) = appearance.displaced {
                        events.push(SessionEvent::BonusHidden {
                            token,
                            reason: HideReason::Expired,
                        });
                    }
                    events.push(SessionEvent::BonusShown {
                        token: appearance.token,
                        position: appearance.position,
                        size: self.bonus.size(),
                    });
                }
            }
            TimerKind::BonusExpiry => {
                if let Some(token) = self.bonus.on_expiry(fired.id) {
                    events.push(SessionEvent::BonusHidden {
                        token,
                        reason: HideReason::Expired,
                    });
                }
            }
        }
    }

    fn finish_round(&mut self, events: &mut Vec<SessionEvent>) {
        events.extend(self.disarm_all());
        let score = self.ledger.seal();
        events.extend(self.enter(GamePhase::RoundOver));

        if let Some(profile_id) = self.player {
            let result = RoundResult { profile_id, score };
            self.last_result = Some(result);
            info!("Round over for {}: score {}", profile_id, score);
            events.push(SessionEvent::RoundOver { result });
        }
    }

    /// Cancels every timer across all three lineages and hides whatever is on
    /// screen. Safe to call repeatedly.
    fn disarm_all(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.round_timer.disarm(&mut self.timers);
        if self.spawner.disarm(&mut self.timers).is_some() {
            events.push(SessionEvent::TargetHidden {
                reason: HideReason::RoundEnded,
            });
        }
        if let Some(token) = self.bonus.disarm(&mut self.timers) {
            events.push(SessionEvent::BonusHidden {
                token,
                reason: HideReason::RoundEnded,
            });
        }
        debug_assert!(self.timers.is_empty(), "timers leaked past disarm");
        events
    }

    fn enter(&mut self, phase: GamePhase) -> Vec<SessionEvent> {
        self.phase = phase;
        vec![SessionEvent::PhaseChanged { phase }]
    }

    fn observe(&mut self, now: Millis) {
        self.clock = self.clock.max(now);
    }
}
