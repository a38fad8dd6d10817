use std::sync::Arc;

use warp::Filter;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};

use crate::auth::{AuthError, AuthService};
use crate::websocket::ConnectionServices;
use tap_persistence::ProfileStore;
use tap_types::{SessionResponse, SignInRequest, SignUpRequest};

pub mod auth;
pub mod config;
pub mod leaderboard;
pub mod profile_sync;
pub mod round_driver;
pub mod websocket;

type JsonReply = WithStatus<Json>;

pub fn create_routes(
    services: ConnectionServices,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let services_filter = warp::any().map({
        let services = services.clone();
        move || services.clone()
    });

    let auth_filter = warp::any().map({
        let auth_service = services.auth.clone();
        move || auth_service.clone()
    });

    // WebSocket endpoint
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(services_filter.clone())
        .map(|ws: warp::ws::Ws, services: ConnectionServices| {
            ws.on_upgrade(move |socket| websocket::handle_connection(socket, services))
        });

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let sign_up = warp::path!("auth" / "signup")
        .and(warp::post())
        .and(warp::body::json())
        .and(auth_filter.clone())
        .and_then(handle_sign_up);

    let sign_in = warp::path!("auth" / "signin")
        .and(warp::post())
        .and(warp::body::json())
        .and(auth_filter.clone())
        .and_then(handle_sign_in);

    let sign_out = warp::path!("auth" / "signout")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(auth_filter.clone())
        .and_then(handle_sign_out);

    let profile = warp::path!("profile" / "me")
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(services_filter.clone())
        .and_then(handle_profile_request);

    let leaderboard = warp::path("leaderboard")
        .and(warp::get())
        .and(services_filter.clone())
        .and_then(handle_leaderboard_request);

    // CORS configuration
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST"]);

    websocket
        .or(health)
        .or(sign_up)
        .or(sign_in)
        .or(sign_out)
        .or(profile)
        .or(leaderboard)
        .with(cors)
        .with(warp::log("tap_rush"))
}

fn error_reply(message: impl ToString, status: StatusCode) -> JsonReply {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message.to_string()
        })),
        status,
    )
}

fn auth_error_reply(error: AuthError) -> JsonReply {
    if let AuthError::Store(e) = &error {
        tracing::error!("Auth request hit a store failure: {}", e);
    }
    let status = error.status();
    error_reply(error, status)
}

fn bearer_token(header: &Option<String>) -> Option<&str> {
    header
        .as_deref()
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value))
}

async fn handle_sign_up(
    request: SignUpRequest,
    auth_service: Arc<AuthService>,
) -> Result<JsonReply, warp::Rejection> {
    match auth_service.sign_up(&request).await {
        Ok((session, profile)) => Ok(warp::reply::with_status(
            warp::reply::json(&SessionResponse {
                token: session.token,
                identity: session.identity,
                profile: Some(profile),
            }),
            StatusCode::CREATED,
        )),
        Err(e) => Ok(auth_error_reply(e)),
    }
}

async fn handle_sign_in(
    request: SignInRequest,
    auth_service: Arc<AuthService>,
) -> Result<JsonReply, warp::Rejection> {
    match auth_service.sign_in(&request.email, &request.password).await {
        Ok(session) => Ok(warp::reply::with_status(
            warp::reply::json(&SessionResponse {
                token: session.token,
                identity: session.identity,
                profile: None,
            }),
            StatusCode::OK,
        )),
        Err(e) => Ok(auth_error_reply(e)),
    }
}

async fn handle_sign_out(
    auth_header: Option<String>,
    auth_service: Arc<AuthService>,
) -> Result<JsonReply, warp::Rejection> {
    let Some(token) = bearer_token(&auth_header) else {
        return Ok(error_reply("Authentication required", StatusCode::UNAUTHORIZED));
    };

    match auth_service.sign_out(token).await {
        Ok(()) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({})),
            StatusCode::OK,
        )),
        Err(e) => Ok(auth_error_reply(e)),
    }
}

/// Hydrates the signed-in profile. An identity without a profile document is
/// signed out on the spot.
async fn handle_profile_request(
    auth_header: Option<String>,
    services: ConnectionServices,
) -> Result<JsonReply, warp::Rejection> {
    let Some(token) = bearer_token(&auth_header) else {
        return Ok(error_reply("Authentication required", StatusCode::UNAUTHORIZED));
    };

    let identity = match services.auth.validate_token(token) {
        Ok(identity) => identity,
        Err(e) => return Ok(auth_error_reply(e)),
    };

    match services.profiles.find_profile(identity.profile_id).await {
        Ok(Some(profile)) => Ok(warp::reply::with_status(
            warp::reply::json(&profile),
            StatusCode::OK,
        )),
        Ok(None) => {
            tracing::warn!(
                "Identity {} has no profile, revoking its session",
                identity.profile_id
            );
            services.auth.revoke_profile(identity.profile_id);
            if let Err(e) = services.auth.sign_out(token).await {
                tracing::warn!("Could not revoke token: {}", e);
            }
            Ok(error_reply(
                round_driver::PROFILE_MISSING_MESSAGE,
                StatusCode::CONFLICT,
            ))
        }
        Err(err) => {
            tracing::error!("Failed to fetch profile: {}", err);
            Ok(error_reply(
                "Failed to fetch profile",
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn handle_leaderboard_request(
    services: ConnectionServices,
) -> Result<JsonReply, warp::Rejection> {
    match services.sync.fetch_leaderboard_summary().await {
        Ok(summary) => Ok(warp::reply::with_status(
            warp::reply::json(&summary),
            StatusCode::OK,
        )),
        Err(err) => {
            tracing::error!("Failed to fetch leaderboard: {}", err);
            Ok(warp::reply::with_status(
                warp::reply::json(&serde_json::json!({
                    "top": "N/A",
                    "profile_count": "N/A"
                })),
                StatusCode::SERVICE_UNAVAILABLE,
            ))
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::leaderboard::LeaderboardFeed;
    use crate::profile_sync::{ProfileSync, RetryPolicy};
    use migration::{Migrator, MigratorTrait};
    use tap_core::RoundConfig;
    use tap_persistence::repositories::{AccountRepository, ProfileRepository};
    use tap_types::{ClientMessage, LeaderboardSummary, Profile, ServerMessage};

    async fn create_test_app()
    -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let db = tap_persistence::connection::connect_to_memory_database()
            .await
            .unwrap();
        Migrator::up(&db, None).await.unwrap();

        let profiles: Arc<dyn ProfileStore> = Arc::new(ProfileRepository::new(db.clone()));
        let credentials = Arc::new(AccountRepository::new(db));
        let leaderboard = LeaderboardFeed::new(profiles.clone());

        create_routes(ConnectionServices {
            auth: Arc::new(AuthService::new(
                credentials,
                profiles.clone(),
                "test-secret",
                60,
            )),
            profiles: profiles.clone(),
            sync: ProfileSync::spawn(profiles, leaderboard, RetryPolicy::default()),
            round_config: RoundConfig::default(),
        })
    }

    fn sign_up_request(email: &str) -> warp::test::RequestBuilder {
        warp::test::request()
            .method("POST")
            .path("/auth/signup")
            .json(&serde_json::json!({
                "email": email,
                "password": "hunter22",
                "first_name": "Alice"
            }))
    }

    fn session_from(response: &warp::http::Response<warp::hyper::body::Bytes>) -> SessionResponse {
        assert_eq!(response.status(), 201);
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app().await;

        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&app)
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), "OK");
    }

    #[tokio::test]
    async fn test_sign_up_sign_in_and_profile() {
        let app = create_test_app().await;
        let session = session_from(&sign_up_request("alice@example.com").reply(&app).await);
        assert_eq!(session.profile.as_ref().unwrap().best_score, 0);

        let response = warp::test::request()
            .method("POST")
            .path("/auth/signin")
            .json(&serde_json::json!({
                "email": "alice@example.com",
                "password": "hunter22"
            }))
            .reply(&app)
            .await;
        assert_eq!(response.status(), 200);
        let signed_in: SessionResponse = serde_json::from_slice(response.body()).unwrap();

        let response = warp::test::request()
            .method("GET")
            .path("/profile/me")
            .header("authorization", format!("Bearer {}", signed_in.token))
            .reply(&app)
            .await;
        assert_eq!(response.status(), 200);
        let profile: Profile = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(profile.id, session.identity.profile_id);
        assert_eq!(profile.first_name, "Alice");
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_is_conflict() {
        let app = create_test_app().await;
        sign_up_request("alice@example.com").reply(&app).await;

        let response = warp::test::request()
            .method("POST")
            .path("/auth/signup")
            .json(&serde_json::json!({
                "email": "alice@example.com",
                "password": "another-pass",
                "first_name": "Mallory"
            }))
            .reply(&app)
            .await;
        assert_eq!(response.status(), 409);

        let response = warp::test::request()
            .method("GET")
            .path("/leaderboard")
            .reply(&app)
            .await;
        let summary: LeaderboardSummary = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(summary.profile_count, 1);
        assert!(summary.top.is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials_are_unauthorized() {
        let app = create_test_app().await;
        sign_up_request("alice@example.com").reply(&app).await;

        let response = warp::test::request()
            .method("POST")
            .path("/auth/signin")
            .json(&serde_json::json!({
                "email": "alice@example.com",
                "password": "wrong-password"
            }))
            .reply(&app)
            .await;
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_signed_out_token_is_rejected() {
        let app = create_test_app().await;
        let session = session_from(&sign_up_request("alice@example.com").reply(&app).await);

        let response = warp::test::request()
            .method("POST")
            .path("/auth/signout")
            .header("authorization", format!("Bearer {}", session.token))
            .reply(&app)
            .await;
        assert_eq!(response.status(), 200);

        let response = warp::test::request()
            .method("GET")
            .path("/profile/me")
            .header("authorization", format!("Bearer {}", session.token))
            .reply(&app)
            .await;
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let app = create_test_app().await;

        let response = warp::test::request()
            .method("GET")
            .path("/profile/me")
            .reply(&app)
            .await;
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_websocket_invalid_message_handling() {
        let app = create_test_app().await;

        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("WebSocket handshake should succeed");

        ws.send_text("invalid json").await;

        loop {
            let msg = ws.recv().await.expect("Should receive a message");
            let server_msg: ServerMessage =
                serde_json::from_str(msg.to_str().unwrap()).expect("Should be valid ServerMessage");
            match server_msg {
                ServerMessage::LeaderboardUpdate { .. } => continue,
                ServerMessage::Error { message } => {
                    assert!(message.contains("Invalid message"));
                    break;
                }
                other => panic!("Expected error message, got: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_websocket_authenticate_reports_profile() {
        let app = create_test_app().await;
        let session = session_from(&sign_up_request("alice@example.com").reply(&app).await);

        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("WebSocket handshake should succeed");

        let auth_msg = ClientMessage::Authenticate {
            token: session.token.clone(),
        };
        ws.send_text(serde_json::to_string(&auth_msg).unwrap()).await;

        loop {
            let msg = ws.recv().await.expect("Should receive a message");
            let server_msg: ServerMessage = serde_json::from_str(msg.to_str().unwrap()).unwrap();
            if let ServerMessage::AuthStateChanged { identity, profile } = server_msg {
                assert_eq!(identity, Some(session.identity.clone()));
                assert_eq!(profile.unwrap().first_name, "Alice");
                break;
            }
        }
    }
}
