#![allow(dead_code)]

use rand::{SeedableRng, rngs::StdRng};
use tap_core::{GameSession, Millis, RoundConfig, SessionEvent, SpawnDelay};
use tap_types::{BonusToken, ProfileId};
use uuid::Uuid;

/// Desktop configuration with a fixed spawn wait so target timing is
/// predictable in tests.
pub fn predictable_config() -> RoundConfig {
    let mut config = RoundConfig::default();
    config.spawn_delay = SpawnDelay::Fixed(500);
    config
}

pub fn create_session(config: RoundConfig, seed: u64) -> GameSession {
    GameSession::new(config, StdRng::seed_from_u64(seed)).unwrap()
}

/// Signed-in session sitting in `Idle`.
pub fn create_ready_session(config: RoundConfig, seed: u64) -> (GameSession, ProfileId) {
    let mut session = create_session(config, seed);
    let player = Uuid::new_v4();
    session.sign_in(player).unwrap();
    (session, player)
}

/// Steps timer by timer until `matches` accepts an emitted event. Returns the
/// engine time it happened at, the matching event and everything emitted on
/// the way.
pub fn advance_until<F>(
    session: &mut GameSession,
    limit: Millis,
    mut matches: F,
) -> Option<(Millis, SessionEvent, Vec<SessionEvent>)>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let mut seen = Vec::new();
    while let Some(deadline) = session.next_deadline() {
        if deadline > limit {
            break;
        }
        let events = session.advance(deadline);
        let hit = events.iter().find(|event| matches(event)).cloned();
        seen.extend(events);
        if let Some(event) = hit {
            return Some((deadline, event, seen));
        }
    }
    None
}

pub fn next_target_shown(session: &mut GameSession, limit: Millis) -> Option<Millis> {
    advance_until(session, limit, |event| {
        matches!(event, SessionEvent::TargetShown { .. })
    })
    .map(|(at, _, _)| at)
}

pub fn next_bonus_shown(session: &mut GameSession, limit: Millis) -> Option<(Millis, BonusToken)> {
    advance_until(session, limit, |event| {
        matches!(event, SessionEvent::BonusShown { .. })
    })
    .and_then(|(at, event, _)| match event {
        SessionEvent::BonusShown { token, .. } => Some((at, token)),
        _ => None,
    })
}

pub fn final_score(events: &[SessionEvent]) -> Option<u32> {
    events.iter().find_map(|event| match event {
        SessionEvent::RoundOver { result } => Some(result.score),
        _ => None,
    })
}
