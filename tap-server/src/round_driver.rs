use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tap_core::{GameSession, Millis, RoundConfig, SessionEvent};
use tap_types::{BonusToken, DeviceProfile, GameError, Identity, RoundResult, ServerMessage};

use crate::auth::AuthService;
use crate::profile_sync::{ProfileSync, SyncOutcome};

pub const PROFILE_MISSING_MESSAGE: &str =
    "Your profile could not be found. Please sign up again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    StartRound { device: Option<DeviceProfile> },
    TapTarget,
    TapBonus { token: BonusToken },
    ReturnToIdle,
}

/// Runs one player's game session against the wall clock. The task follows
/// the connection's identity channel and stops when the driver is dropped.
pub struct RoundDriver {
    commands: mpsc::UnboundedSender<DriverCommand>,
    task: JoinHandle<()>,
}

impl RoundDriver {
    pub fn spawn(
        config: RoundConfig,
        identity: Arc<watch::Sender<Option<Identity>>>,
        auth: Arc<AuthService>,
        sync: ProfileSync,
        outbox: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Self, GameError> {
        let session = GameSession::new(config, StdRng::from_os_rng())?;
        let (commands, receiver) = mpsc::unbounded_channel();

        let driver = DriverLoop {
            session,
            epoch: Instant::now(),
            identity_rx: identity.subscribe(),
            identity,
            auth,
            sync,
            outbox,
        };
        let task = tokio::spawn(driver.run(receiver));

        Ok(Self { commands, task })
    }

    pub fn send(&self, command: DriverCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .map_err(|_| "Round driver stopped".to_string())
    }
}

impl Drop for RoundDriver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct DriverLoop {
    session: GameSession,
    epoch: Instant,
    identity: Arc<watch::Sender<Option<Identity>>>,
    identity_rx: watch::Receiver<Option<Identity>>,
    auth: Arc<AuthService>,
    sync: ProfileSync,
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

impl DriverLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<DriverCommand>) {
        self.identity_rx.mark_changed();

        loop {
            let wake = self
                .session
                .next_deadline()
                .map(|deadline| self.epoch + Duration::from_millis(deadline));

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                changed = self.identity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync_identity();
                }
                _ = sleep_until(wake) => {
                    let events = self.session.advance(self.now());
                    self.emit(events);
                }
            }

            if self.outbox.is_closed() {
                break;
            }
        }

        self.session.sign_out(self.now());
        debug!(
            "Round driver stopped with {} timers outstanding",
            self.session.outstanding_timers()
        );
    }

    fn now(&self) -> Millis {
        Instant::now().duration_since(self.epoch).as_millis() as Millis
    }

    fn sync_identity(&mut self) {
        let identity = self.identity_rx.borrow_and_update().clone();
        let wanted = identity.as_ref().map(|identity| identity.profile_id);
        if self.session.player() == wanted {
            return;
        }

        let now = self.now();
        let mut events = self.session.sign_out(now);
        if let Some(profile_id) = wanted {
            match self.session.sign_in(profile_id) {
                Ok(signed_in) => events.extend(signed_in),
                Err(e) => self.send(ServerMessage::Error {
                    message: e.to_string(),
                }),
            }
            self.refresh_leaderboard();
        }
        self.emit(events);
    }

    fn handle_command(&mut self, command: DriverCommand) {
        let now = self.now();
        let result = match command {
            DriverCommand::StartRound { device } => self
                .apply_device(device)
                .and_then(|_| self.session.start_round(now)),
            DriverCommand::TapTarget => self.session.tap_target(now).map(|tap| tap.events),
            DriverCommand::TapBonus { token } => {
                self.session.tap_bonus(now, token).map(|tap| tap.events)
            }
            DriverCommand::ReturnToIdle => {
                let events = self.session.return_to_idle();
                if events.is_ok() {
                    self.refresh_leaderboard();
                }
                events
            }
        };

        match result {
            Ok(events) => self.emit(events),
            Err(e) => {
                debug!("Rejected {:?}: {}", command, e);
                self.send(ServerMessage::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn apply_device(&mut self, device: Option<DeviceProfile>) -> Result<(), GameError> {
        match device {
            Some(device) if device != self.session.config().device => {
                let duration = self.session.config().duration_secs;
                let play_area = self.session.config().play_area;
                self.session.reconfigure(
                    RoundConfig::for_device(device)
                        .with_duration(duration)
                        .with_play_area(play_area),
                )
            }
            _ => Ok(()),
        }
    }

    fn emit(&mut self, events: Vec<SessionEvent>) {
        for event in &events {
            self.send(ServerMessage::from(event));
            if let SessionEvent::RoundOver { result } = event {
                self.record(*result);
            }
        }
    }

    /// Hands the result to profile sync and reports back when the write
    /// settles. The round has already moved on by then.
    fn record(&self, result: RoundResult) {
        let Some(identity) = self.identity.borrow().clone() else {
            warn!("Round finished without a signed-in player");
            return;
        };

        let ticket = match self.sync.record_round_result(&identity, result) {
            Ok(ticket) => ticket,
            Err(e) => {
                self.send(ServerMessage::Notification {
                    message: format!("Your score could not be saved: {}", e),
                });
                return;
            }
        };

        let outbox = self.outbox.clone();
        let identity_tx = self.identity.clone();
        let auth = self.auth.clone();
        tokio::spawn(async move {
            match ticket.outcome().await {
                SyncOutcome::Saved {
                    score, best_score, ..
                } => {
                    let _ = outbox.send(ServerMessage::ScoreSaved { score, best_score });
                }
                SyncOutcome::ProfileMissing => {
                    info!("Signing out {}: profile missing", identity.profile_id);
                    auth.revoke_profile(identity.profile_id);
                    let _ = outbox.send(ServerMessage::ProfileMissing {
                        message: PROFILE_MISSING_MESSAGE.to_string(),
                    });
                    identity_tx.send_if_modified(|current| {
                        if current.as_ref() == Some(&identity) {
                            *current = None;
                            true
                        } else {
                            false
                        }
                    });
                    let _ = outbox.send(ServerMessage::AuthStateChanged {
                        identity: None,
                        profile: None,
                    });
                }
                SyncOutcome::Failed { reason } => {
                    let _ = outbox.send(ServerMessage::Notification {
                        message: format!("Your score could not be saved: {}", reason),
                    });
                }
            }
        });
    }

    fn refresh_leaderboard(&self) {
        let feed = self.sync.leaderboard().clone();
        tokio::spawn(async move {
            feed.refresh().await;
        });
    }

    fn send(&self, message: ServerMessage) {
        let _ = self.outbox.send(message);
    }
}

async fn sleep_until(wake: Option<Instant>) {
    match wake {
        Some(wake) => tokio::time::sleep_until(wake).await,
        None => std::future::pending().await,
    }
}
