use tap_types::{BonusToken, GamePhase, HideReason, Position, RoundResult, ServerMessage};

/// Everything a session emits while transitioning or firing timers, in the
/// order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged {
        phase: GamePhase,
    },
    RoundStarted {
        time_remaining: u32,
    },
    Tick {
        time_remaining: u32,
    },
    TargetShown {
        position: Position,
        size: u32,
    },
    TargetHidden {
        reason: HideReason,
    },
    BonusShown {
        token: BonusToken,
        position: Position,
        size: u32,
    },
    BonusHidden {
        token: BonusToken,
        reason: HideReason,
    },
    ScoreChanged {
        score: u32,
        delta: u32,
    },
    RoundOver {
        result: RoundResult,
    },
}

impl SessionEvent {
    pub fn is_round_over(&self) -> bool {
        matches!(self, SessionEvent::RoundOver { .. })
    }
}

impl From<&SessionEvent> for ServerMessage {
    fn from(event: &SessionEvent) -> Self {
        match *event {
            SessionEvent::PhaseChanged { phase } => ServerMessage::PhaseChanged { phase },
            SessionEvent::RoundStarted { time_remaining } => {
                ServerMessage::RoundStarted { time_remaining }
            }
            SessionEvent::Tick { time_remaining } => ServerMessage::Tick { time_remaining },
            SessionEvent::TargetShown { position, size } => {
                ServerMessage::TargetShown { position, size }
            }
            SessionEvent::TargetHidden { reason } => ServerMessage::TargetHidden { reason },
            SessionEvent::BonusShown {
                token,
                position,
                size,
            } => ServerMessage::BonusShown {
                token,
                position,
                size,
            },
            SessionEvent::BonusHidden { token, reason } => {
                ServerMessage::BonusHidden { token, reason }
            }
            SessionEvent::ScoreChanged { score, .. } => ServerMessage::ScoreUpdate { score },
            SessionEvent::RoundOver { result } => ServerMessage::RoundOver {
                final_score: result.score,
            },
        }
    }
}
