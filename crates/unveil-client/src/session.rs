//! In-memory sign-in state.
//!
//! [`SessionContext`] is the single place a bearer credential lives. The
//! HTTP client and the realtime channel both read it through
//! [`CredentialProvider`], so establishing or clearing a session is
//! visible to every consumer at once. Nothing is persisted; a restart
//! starts logged out.

use std::sync::RwLock;

use tracing::info;

use unveil_api::{ApiClient, ApiError, AuthRequest};
use unveil_realtime::RealtimeChannel;
use unveil_shared::{CredentialProvider, User, UserId};

/// A signed-in account: the bearer token and the user it belongs to.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub token: String,
    pub user: User,
}

/// Shared sign-in state. `None` means logged out.
#[derive(Debug, Default)]
pub struct SessionContext {
    session: RwLock<Option<ActiveSession>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh credential and account, replacing any previous one.
    pub fn establish(&self, token: impl Into<String>, user: User) {
        info!(user_id = %user.id, "Session established");
        if let Ok(mut guard) = self.session.write() {
            *guard = Some(ActiveSession {
                token: token.into(),
                user,
            });
        }
    }

    /// Drop the credential. Consumers see a logged-out state immediately.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.session
            .read()
            .ok()
            .map_or(false, |guard| guard.is_some())
    }

    /// Id of the signed-in user, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.session
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.user.id.clone()))
    }

    /// Snapshot of the signed-in account.
    pub fn user(&self) -> Option<User> {
        self.session
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.user.clone()))
    }
}

impl CredentialProvider for SessionContext {
    fn bearer_token(&self) -> Option<String> {
        self.session
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.token.clone()))
    }
}

/// Log in and install the resulting session in `session`.
///
/// The login request itself goes out without a credential; on success the
/// returned token is stored so every later request carries it.
pub async fn login(
    session: &SessionContext,
    api: &ApiClient,
    credentials: &AuthRequest,
) -> Result<User, ApiError> {
    let auth = api.login(credentials).await?;
    session.establish(auth.token, auth.user.clone());
    Ok(auth.user)
}

/// Clear the session and tear down the realtime connection.
///
/// The credential goes first so a reconnect attempt racing the shutdown
/// finds nothing to authenticate with.
pub async fn logout(session: &SessionContext, channel: &RealtimeChannel) {
    session.clear();
    channel.disconnect().await;
    info!("Logged out");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use mockito::Matcher;

    use unveil_api::ApiConfig;
    use unveil_realtime::ChannelConfig;

    fn account(id: &str) -> User {
        User {
            id: UserId::new(id),
            email: format!("{id}@unveil.test"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            gender: None,
            preferred_genders: None,
            age: None,
            voice_intro_url: None,
            interest_photo_url: None,
            main_photo_url: None,
            is_verified: false,
            premium_tier: None,
            profile: None,
        }
    }

    fn api_for(server: &mockito::ServerGuard, session: Arc<SessionContext>) -> ApiClient {
        let config = ApiConfig {
            base_url: server.url(),
            ws_url: "ws://127.0.0.1:9/ws".into(),
            http_timeout: Duration::from_secs(5),
        };
        ApiClient::new(&config, session).unwrap()
    }

    const USER_JSON: &str = r#"{
        "id": "user_1",
        "email": "a@unveil.test",
        "createdAt": "2026-03-01T10:00:00Z",
        "updatedAt": "2026-03-01T10:00:00Z",
        "isVerified": false
    }"#;

    #[test]
    fn test_session_lifecycle() {
        let session = SessionContext::new();
        assert!(!session.is_signed_in());
        assert_eq!(session.bearer_token(), None);
        assert_eq!(session.user_id(), None);

        session.establish("tok_1", account("user_1"));
        assert!(session.is_signed_in());
        assert_eq!(session.bearer_token().as_deref(), Some("tok_1"));
        assert_eq!(session.user_id(), Some(UserId::new("user_1")));
        assert_eq!(session.user().map(|u| u.email), Some("user_1@unveil.test".into()));

        session.clear();
        assert!(!session.is_signed_in());
        assert_eq!(session.bearer_token(), None);
    }

    #[tokio::test]
    async fn test_login_installs_credential_for_later_requests() {
        let mut server = mockito::Server::new_async().await;

        let login_mock = server
            .mock("POST", "/auth/login")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"token": "tok_9", "user": {USER_JSON}}}"#))
            .create_async()
            .await;

        let profile_mock = server
            .mock("GET", "/profile")
            .match_header("authorization", "Bearer tok_9")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(USER_JSON)
            .create_async()
            .await;

        let session = Arc::new(SessionContext::new());
        let api = api_for(&server, session.clone());

        let request = AuthRequest {
            email: "a@unveil.test".into(),
            password: "hunter2".into(),
        };
        let user = login(&session, &api, &request).await.unwrap();

        assert_eq!(user.id, UserId::new("user_1"));
        assert!(session.is_signed_in());
        assert_eq!(session.user_id(), Some(UserId::new("user_1")));

        // The installed token must ride the next request.
        let me = api.my_profile().await.unwrap();
        assert_eq!(me.id, UserId::new("user_1"));

        login_mock.assert_async().await;
        profile_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_login_leaves_session_logged_out() {
        let mut server = mockito::Server::new_async().await;

        let login_mock = server
            .mock("POST", "/auth/login")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "Invalid credentials"}"#)
            .create_async()
            .await;

        let session = Arc::new(SessionContext::new());
        let api = api_for(&server, session.clone());

        let request = AuthRequest {
            email: "a@unveil.test".into(),
            password: "wrong".into(),
        };
        let err = login(&session, &api, &request).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!session.is_signed_in());

        login_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_channel() {
        let session = Arc::new(SessionContext::new());
        session.establish("tok_1", account("user_1"));

        let channel = RealtimeChannel::new(
            ChannelConfig::new("ws://127.0.0.1:9/ws"),
            session.clone(),
        );

        logout(&session, &channel).await;

        assert!(!session.is_signed_in());
        assert!(!channel.is_connected());
        assert_eq!(session.bearer_token(), None);
    }
}
