use std::sync::{Arc, LazyLock};

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use dashmap::DashMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tap_persistence::{Credential, CredentialStore, ProfileStore, StoreError};
use tap_types::{ConnectionError, Identity, Profile, ProfileId, SignUpRequest};

pub const MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // Profile id
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub identity: Identity,
    pub expires_at: i64,
}

/// Built-in email/password identity provider issuing HS256 session tokens.
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    profiles: Arc<dyn ProfileStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: chrono::Duration,
    /// Signed-out token ids and their expiry.
    revoked: DashMap<String, i64>,
    /// Profiles whose every token issued up to the given second is void.
    revoked_profiles: DashMap<ProfileId, i64>,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        profiles: Arc<dyn ProfileStore>,
        secret: &str,
        session_ttl_minutes: i64,
    ) -> Self {
        Self {
            credentials,
            profiles,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            session_ttl: chrono::Duration::minutes(session_ttl_minutes.max(1)),
            revoked: DashMap::new(),
            revoked_profiles: DashMap::new(),
        }
    }

    /// Registers the account, then writes its profile document. A failure
    /// between the two writes leaves an account without a profile, which
    /// sign-in later reports as a missing profile.
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<(Session, Profile), AuthError> {
        let email = validate_email(&request.email)?;
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        if self.credentials.find_credential(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let profile_id = Uuid::new_v4();
        let credential = Credential {
            profile_id,
            email: email.clone(),
            password_hash: hash_in_background(request.password.clone()).await?,
        };
        self.credentials
            .insert_credential(credential)
            .await
            .map_err(|e| match e {
                StoreError::DuplicateEmail(_) => AuthError::EmailAlreadyRegistered,
                other => AuthError::Store(other),
            })?;

        let identity = Identity { profile_id, email };
        let profile = self
            .profiles
            .create_profile(&identity, profile_id, request.draft())
            .await?;

        let session = self.issue_session(identity)?;
        self.credentials.remember_current_user(Some(profile_id)).await?;
        tracing::info!("Signed up {}", profile_id);
        Ok((session, profile))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let credential = self
            .credentials
            .find_credential(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_in_background(password.to_string(), credential.password_hash.clone()).await? {
            tracing::debug!("Password mismatch for {}", credential.profile_id);
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.issue_session(Identity {
            profile_id: credential.profile_id,
            email: credential.email,
        })?;
        self.credentials
            .remember_current_user(Some(session.identity.profile_id))
            .await?;
        tracing::info!("Signed in {}", session.identity.profile_id);
        Ok(session)
    }

    /// Revokes the token. Signing out twice is harmless.
    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.decode_claims(token)?;
        let profile_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        self.revoked.insert(claims.jti, claims.exp);
        self.credentials.forget_current_user(profile_id).await?;
        tracing::info!("Signed out {}", profile_id);
        Ok(())
    }

    /// Voids every token issued to `profile_id` so far, for accounts whose
    /// profile document has gone missing.
    pub fn revoke_profile(&self, profile_id: ProfileId) {
        self.revoked_profiles
            .insert(profile_id, chrono::Utc::now().timestamp());
        tracing::info!("Revoked all sessions of {}", profile_id);
    }

    pub fn validate_token(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.decode_claims(token)?;
        if self.revoked.contains_key(&claims.jti) {
            return Err(AuthError::InvalidToken);
        }

        let profile_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let profile_revoked = self
            .revoked_profiles
            .get(&profile_id)
            .is_some_and(|revoked_at| claims.iat <= *revoked_at);
        if profile_revoked {
            return Err(AuthError::InvalidToken);
        }

        Ok(Identity {
            profile_id,
            email: claims.email,
        })
    }

    /// The account this device last signed in with, if the backing store
    /// remembers one and its profile still exists.
    pub async fn remembered_identity(&self) -> Result<Option<Identity>, AuthError> {
        let Some(profile_id) = self.credentials.current_user().await? else {
            return Ok(None);
        };

        Ok(self
            .profiles
            .find_profile(profile_id)
            .await?
            .map(|profile| Identity {
                profile_id,
                email: profile.email,
            }))
    }

    /// Drops revocations whose tokens have expired anyway.
    pub fn purge_revoked(&self) -> usize {
        let now = chrono::Utc::now().timestamp();
        let ttl = self.session_ttl.num_seconds();
        let before = self.revoked_count();
        self.revoked.retain(|_, exp| *exp > now);
        self.revoked_profiles.retain(|_, at| *at + ttl > now);
        before - self.revoked_count()
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.len() + self.revoked_profiles.len()
    }

    fn issue_session(&self, identity: Identity) -> Result<Session, AuthError> {
        let now = chrono::Utc::now();
        let expires_at = (now + self.session_ttl).timestamp();
        let claims = SessionClaims {
            sub: identity.profile_id.to_string(),
            email: identity.email.clone(),
            iat: now.timestamp(),
            exp: expires_at,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(Session {
            token,
            identity,
            expires_at,
        })
    }

    fn decode_claims(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::warn!("Session token rejected: {:?}", e.kind());
            AuthError::from(e)
        })?;
        Ok(data.claims)
    }
}

fn validate_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if EMAIL_PATTERN.is_match(&email) {
        Ok(email)
    } else {
        Err(AuthError::InvalidEmail)
    }
}

/// Argon2id with a random 16-byte salt, encoded as a PHC string.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    let salt = SaltString::encode_b64(&bytes).map_err(AuthError::from)?;

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Constant-time comparison against a stored PHC string.
fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn hash_in_background(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
}

async fn verify_in_background(password: String, stored: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("An account with this email already exists")]
    EmailAlreadyRegistered,
    #[error("Email address is not valid")]
    InvalidEmail,
    #[error("Password must be at least 6 characters")]
    WeakPassword,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn status(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;

        match self {
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::EmailAlreadyRegistered => StatusCode::CONFLICT,
            AuthError::InvalidEmail | AuthError::WeakPassword => StatusCode::BAD_REQUEST,
            AuthError::PasswordHash(_) | AuthError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(error: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(error.to_string())
    }
}

impl From<AuthError> for ConnectionError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::TokenExpired => ConnectionError::SessionExpired,
            AuthError::InvalidToken | AuthError::InvalidCredentials => {
                ConnectionError::InvalidToken
            }
            other => ConnectionError::InternalError {
                message: other.to_string(),
            },
        }
    }
}
