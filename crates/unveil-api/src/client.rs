//! HTTP client for the Unveil backend REST API.
//!
//! Every request attaches the caller's bearer token through the injected
//! [`CredentialProvider`]; the client itself never stores a session. Reveal
//! endpoints have one quirk worth knowing: the server answers 403 while a
//! stage is still locked, and the client reports that as `Ok(None)` so
//! callers can check a stage without special-casing errors.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use unveil_shared::{
    ChatProgress, CredentialProvider, Match, MatchId, Message, Profile, RevealStage, RevealedData,
    User, VibeChoice,
};

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Typed client for the backend REST surface.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

/// Credentials for `POST /auth/login` and `POST /auth/signup`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

/// Successful login payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Partial update for `PUT /profile`. Absent fields are left untouched by
/// the server.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ama_prompt1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ama_prompt2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ama_prompt3: Option<String>,
}

#[derive(Serialize)]
struct VibeCheckRequest {
    choice: VibeChoice,
}

/// Error body shape the backend uses for every failure response.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ApiClient {
    pub fn new(
        config: &ApiConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match self.credentials.bearer_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    // ─── Auth ───

    /// Exchange email and password for a session token.
    pub async fn login(&self, credentials: &AuthRequest) -> Result<AuthResponse, ApiError> {
        let resp = self
            .request(Method::POST, "/auth/login")
            .json(credentials)
            .send()
            .await?;
        let auth: AuthResponse = decode(ensure_success(resp).await?).await?;
        info!(user_id = %auth.user.id, "Logged in");
        Ok(auth)
    }

    /// Create an account. Logging in is a separate call.
    pub async fn signup(&self, credentials: &AuthRequest) -> Result<(), ApiError> {
        let resp = self
            .request(Method::POST, "/auth/signup")
            .json(credentials)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    // ─── Profile ───

    /// The signed-in user's own record, profile prompts included.
    pub async fn my_profile(&self) -> Result<User, ApiError> {
        let resp = self.request(Method::GET, "/profile").send().await?;
        decode(ensure_success(resp).await?).await
    }

    /// Update the signed-in user's profile prompts.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        let resp = self
            .request(Method::PUT, "/profile")
            .json(update)
            .send()
            .await?;
        decode(ensure_success(resp).await?).await
    }

    // ─── Matches ───

    /// Matches that are not chat-ready yet.
    pub async fn pending_matches(&self) -> Result<Vec<Match>, ApiError> {
        let resp = self.request(Method::GET, "/matches/pending").send().await?;
        decode(ensure_success(resp).await?).await
    }

    /// Matches with an open chat.
    pub async fn active_matches(&self) -> Result<Vec<Match>, ApiError> {
        let resp = self.request(Method::GET, "/matches/active").send().await?;
        decode(ensure_success(resp).await?).await
    }

    /// Full message history for one match, oldest first.
    pub async fn match_messages(&self, match_id: &MatchId) -> Result<Vec<Message>, ApiError> {
        let resp = self
            .request(Method::GET, &format!("/matches/{match_id}/messages"))
            .send()
            .await?;
        decode(ensure_success(resp).await?).await
    }

    /// Progress for one match. `None` when the server has no progress row
    /// yet, which is the case for a match that never saw a message.
    pub async fn match_progress(
        &self,
        match_id: &MatchId,
    ) -> Result<Option<ChatProgress>, ApiError> {
        let resp = self
            .request(Method::GET, &format!("/matches/{match_id}/progress"))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(decode(ensure_success(resp).await?).await?))
    }

    // ─── Reveal & vibe check ───

    /// Fetch the revealed payload for one stage.
    ///
    /// The server answers 403 until the stage's checkpoint is crossed;
    /// that is reported as `Ok(None)`, not an error.
    pub async fn fetch_reveal(
        &self,
        match_id: &MatchId,
        stage: RevealStage,
    ) -> Result<Option<RevealedData>, ApiError> {
        let segment = match stage {
            RevealStage::Name => "name",
            RevealStage::InterestPhoto => "interest-photo",
            RevealStage::MainPhoto => "main-photo",
        };
        let resp = self
            .request(Method::GET, &format!("/matches/{match_id}/reveal/{segment}"))
            .send()
            .await?;

        if resp.status() == StatusCode::FORBIDDEN {
            debug!(match_id = %match_id, stage = stage.stage(), "Reveal stage still locked");
            return Ok(None);
        }
        Ok(Some(decode(ensure_success(resp).await?).await?))
    }

    /// Submit this user's vibe decision. The resolved outcome arrives over
    /// the realtime channel once both sides have answered.
    pub async fn submit_vibe(&self, match_id: &MatchId, choice: VibeChoice) -> Result<(), ApiError> {
        let resp = self
            .request(Method::POST, &format!("/matches/{match_id}/vibe-check"))
            .json(&VibeCheckRequest { choice })
            .send()
            .await?;
        ensure_success(resp).await?;
        info!(match_id = %match_id, choice = ?choice, "Vibe choice submitted");
        Ok(())
    }
}

/// Reject non-success responses, mapping 401 to its own variant and pulling
/// the server's `{"error": "..."}` message for everything else.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }

    let message = match resp.text().await {
        Ok(body) => serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body),
        Err(_) => String::new(),
    };

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}
