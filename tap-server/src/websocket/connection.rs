use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tap_core::RoundConfig;
use tap_persistence::ProfileStore;
use tap_types::{
    ClientMessage, ConnectionError, GameError, Identity, LeaderboardState, ServerMessage,
};

use crate::auth::AuthService;
use crate::profile_sync::ProfileSync;
use crate::round_driver::{DriverCommand, PROFILE_MISSING_MESSAGE, RoundDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared services every connection is wired to.
#[derive(Clone)]
pub struct ConnectionServices {
    pub auth: Arc<AuthService>,
    pub profiles: Arc<dyn ProfileStore>,
    pub sync: ProfileSync,
    pub round_config: RoundConfig,
}

/// One client session: its identity subscription, its round driver and its
/// leaderboard subscription. Dropping it stops both background tasks.
pub struct Connection {
    id: ConnectionId,
    auth: Arc<AuthService>,
    profiles: Arc<dyn ProfileStore>,
    identity: Arc<watch::Sender<Option<Identity>>>,
    token: Option<String>,
    driver: RoundDriver,
    leaderboard_forwarder: JoinHandle<()>,
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn open(
        id: ConnectionId,
        services: &ConnectionServices,
        outbox: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Self, GameError> {
        let (identity, _) = watch::channel(None);
        let identity = Arc::new(identity);

        let driver = RoundDriver::spawn(
            services.round_config.clone(),
            identity.clone(),
            services.auth.clone(),
            services.sync.clone(),
            outbox.clone(),
        )?;

        let feed = services.sync.leaderboard().clone();
        if feed.current() == LeaderboardState::Loading {
            let feed = feed.clone();
            tokio::spawn(async move {
                feed.refresh().await;
            });
        }
        let leaderboard_forwarder = forward_leaderboard(feed.subscribe(), outbox.clone());

        Ok(Self {
            id,
            auth: services.auth.clone(),
            profiles: services.profiles.clone(),
            identity,
            token: None,
            driver,
            leaderboard_forwarder,
            outbox,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.token.is_some() && self.identity.borrow().is_some()
    }

    pub async fn handle_message(&mut self, message: ClientMessage) {
        // The round driver may have signed the player out since.
        if self.identity.borrow().is_none() {
            self.token = None;
        }

        match message {
            ClientMessage::Authenticate { token } => self.authenticate(token).await,
            ClientMessage::SignOut => self.sign_out().await,
            ClientMessage::StartRound { device } => {
                self.forward(DriverCommand::StartRound { device })
            }
            ClientMessage::TapTarget => self.forward(DriverCommand::TapTarget),
            ClientMessage::TapBonus { token } => self.forward(DriverCommand::TapBonus { token }),
            ClientMessage::ReturnToIdle => self.forward(DriverCommand::ReturnToIdle),
            ClientMessage::Heartbeat => debug!("Heartbeat from {}", self.id),
        }
    }

    async fn authenticate(&mut self, token: String) {
        info!("Authenticating connection {}", self.id);

        let identity = match self.auth.validate_token(&token) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Authentication failed for connection {}: {}", self.id, e);
                self.send(ServerMessage::AuthenticationFailed { error: e.into() });
                return;
            }
        };

        match self.profiles.find_profile(identity.profile_id).await {
            Ok(Some(profile)) => {
                self.token = Some(token);
                self.identity.send_replace(Some(identity.clone()));
                self.send(ServerMessage::AuthStateChanged {
                    identity: Some(identity),
                    profile: Some(profile),
                });
            }
            Ok(None) => {
                warn!(
                    "Identity {} has no profile, forcing sign-out",
                    identity.profile_id
                );
                self.auth.revoke_profile(identity.profile_id);
                if let Err(e) = self.auth.sign_out(&token).await {
                    warn!("Could not revoke token for {}: {}", identity.profile_id, e);
                }
                self.clear_identity();
                self.send(ServerMessage::ProfileMissing {
                    message: PROFILE_MISSING_MESSAGE.to_string(),
                });
            }
            Err(e) => {
                error!("Failed to load profile {}: {}", identity.profile_id, e);
                self.send(ServerMessage::AuthenticationFailed {
                    error: ConnectionError::InternalError {
                        message: e.to_string(),
                    },
                });
            }
        }
    }

    async fn sign_out(&mut self) {
        if let Some(token) = self.token.as_deref() {
            if let Err(e) = self.auth.sign_out(token).await {
                warn!("Sign-out for connection {} failed: {}", self.id, e);
            }
        }
        self.clear_identity();
    }

    fn clear_identity(&mut self) {
        self.token = None;
        self.identity.send_replace(None);
        self.send(ServerMessage::AuthStateChanged {
            identity: None,
            profile: None,
        });
    }

    fn forward(&self, command: DriverCommand) {
        if let Err(e) = self.driver.send(command) {
            error!("Connection {}: {}", self.id, e);
            self.send(ServerMessage::Error { message: e });
        }
    }

    fn send(&self, message: ServerMessage) {
        let _ = self.outbox.send(message);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.leaderboard_forwarder.abort();
    }
}

fn forward_leaderboard(
    mut updates: watch::Receiver<LeaderboardState>,
    outbox: mpsc::UnboundedSender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let state = updates.borrow_and_update().clone();
            if state == LeaderboardState::Unavailable {
                let _ = outbox.send(ServerMessage::Notification {
                    message: "Leaderboard is unavailable right now".to_string(),
                });
            }
            if outbox.send(ServerMessage::LeaderboardUpdate { state }).is_err() {
                break;
            }
            if updates.changed().await.is_err() {
                break;
            }
        }
    })
}
