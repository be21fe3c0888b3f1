//! HTTP client for the REST document API.
//!
//! Handles bearer authentication, token refresh on 401, and the document
//! endpoints. Uses reqwest with JSON serialization.

use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::remote::{RemoteDocument, RemoteStore};
use async_trait::async_trait;
use cardwise_types::{DocPath, Filter, Payload};
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Tokens returned by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub email: String,
}

/// Signed-in session shared by concurrent requests.
#[derive(Default)]
struct Session {
    tokens: Option<AuthTokens>,
    /// Bumped on every successful refresh so a caller that waited on the
    /// refresh lock can see the tokens were already rotated.
    generation: u64,
}

impl Session {
    fn access_token(&self) -> Option<String> {
        self.tokens.as_ref().map(|t| t.access_token.clone())
    }
}

/// Remote store backed by the REST document API.
pub struct RestRemoteStore {
    client: Client,
    config: CloudConfig,
    session: Arc<RwLock<Session>>,
    /// Serializes refreshes; the server rotates the refresh token on use.
    refresh_lock: Arc<Mutex<()>>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: TokenUser,
}

impl TokenResponse {
    fn into_tokens(self) -> AuthTokens {
        AuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id: self.user.id,
            email: self.user.email,
        }
    }
}

#[derive(Deserialize)]
struct TokenUser {
    #[serde(deserialize_with = "id_as_string")]
    id: String,
    #[serde(default)]
    email: String,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "user id must be a string or number, got {other}"
        ))),
    }
}

#[derive(Deserialize)]
struct DocumentResponse {
    #[serde(default)]
    data: Payload,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    path: String,
    filters: &'a [Filter],
}

#[derive(Deserialize)]
struct QueryResponse {
    documents: Vec<RemoteDocument>,
}

#[derive(Deserialize)]
struct AddResponse {
    id: String,
}

impl RestRemoteStore {
    pub fn new(config: CloudConfig) -> CloudResult<Self> {
        Url::parse(&config.api_base_url)
            .map_err(|e| CloudError::Config(format!("invalid api_base_url: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CloudError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            session: Arc::default(),
            refresh_lock: Arc::default(),
        })
    }

    /// Restores a saved session without contacting the server.
    pub async fn set_tokens(&self, access_token: String, refresh_token: String, user_id: String) {
        self.session.write().await.tokens = Some(AuthTokens {
            access_token,
            refresh_token,
            user_id,
            email: String::new(),
        });
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.tokens.is_some()
    }

    pub async fn user_id(&self) -> Option<String> {
        let session = self.session.read().await;
        session.tokens.as_ref().map(|t| t.user_id.clone())
    }

    pub async fn logout(&self) {
        self.session.write().await.tokens = None;
    }

    // ── Auth ──

    /// Signs in with email and password and keeps the session.
    pub async fn authenticate(&self, email: &str, password: &str) -> CloudResult<AuthTokens> {
        let url = self.endpoint(&["api", "auth", "login"])?;
        let tokens = self
            .client
            .post(url)
            .json(&LoginRequest { email, password })
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CloudError::AuthFailed(e.to_string()))?
            .json::<TokenResponse>()
            .await?
            .into_tokens();

        self.session.write().await.tokens = Some(tokens.clone());
        debug!("signed in as {}", tokens.user_id);
        Ok(tokens)
    }

    /// Exchanges the refresh token for a new token pair. A rejected refresh
    /// token ends the session.
    pub async fn refresh_access_token(&self) -> CloudResult<String> {
        let seen = self.session.read().await.generation;
        let _refreshing = self.refresh_lock.lock().await;

        let refresh_token = {
            let session = self.session.read().await;
            if session.generation != seen {
                return session.access_token().ok_or(CloudError::AuthRequired);
            }
            session
                .tokens
                .as_ref()
                .map(|t| t.refresh_token.clone())
                .ok_or(CloudError::AuthRequired)?
        };

        let url = self.endpoint(&["api", "auth", "refresh"])?;
        let resp = self
            .client
            .post(url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;

        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            self.logout().await;
            return Err(CloudError::AuthFailed(
                "refresh token rejected, sign in again".to_string(),
            ));
        }

        let tokens = resp
            .error_for_status()
            .map_err(|e| CloudError::AuthFailed(format!("refresh failed: {e}")))?
            .json::<TokenResponse>()
            .await?
            .into_tokens();
        let access_token = tokens.access_token.clone();

        let mut session = self.session.write().await;
        session.tokens = Some(tokens);
        session.generation += 1;
        Ok(access_token)
    }

    /// Sends an authenticated request, retrying once on 401.
    async fn auth_send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> CloudResult<reqwest::Response> {
        let Some(token) = self.session.read().await.access_token() else {
            return Err(CloudError::AuthRequired);
        };
        let resp = self.build(method.clone(), url.clone(), body, &token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!("401 on {method} {}, refreshing token", url.path());
        let token = self.refresh_access_token().await?;
        Ok(self.build(method, url, body, &token).send().await?)
    }

    fn build(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        token: &str,
    ) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url).bearer_auth(token);
        match body {
            Some(body) => request.json(body),
            None => request,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> CloudResult<Url> {
        let mut url = Url::parse(&self.config.api_base_url)
            .map_err(|e| CloudError::Config(format!("invalid api_base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| CloudError::Config("api_base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, path: &DocPath) -> CloudResult<Url> {
        let mut url = self.endpoint(&["api", "documents"])?;
        url.path_segments_mut()
            .map_err(|_| CloudError::Config("api_base_url cannot be a base".to_string()))?
            .extend(path.segments());
        Ok(url)
    }
}

fn check(resp: reqwest::Response) -> CloudResult<reqwest::Response> {
    resp.error_for_status()
        .map_err(|e| CloudError::Api(e.to_string()))
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn get_document(&self, path: &DocPath) -> CloudResult<Option<Payload>> {
        path.split_document()?;
        let url = self.document_url(path)?;
        let resp = self.auth_send(Method::GET, url, None).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: DocumentResponse = check(resp)?.json().await?;
        Ok(Some(doc.data))
    }

    async fn get_collection(
        &self,
        collection: &DocPath,
        filters: &[Filter],
    ) -> CloudResult<Vec<RemoteDocument>> {
        let collection = collection.expect_collection()?;
        let url = self.endpoint(&["api", "query"])?;
        let body = serde_json::to_value(QueryRequest {
            path: collection.to_slash_string(),
            filters,
        })?;
        let resp = self.auth_send(Method::POST, url, Some(&body)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let data: QueryResponse = check(resp)?.json().await?;
        Ok(data.documents)
    }

    async fn set(&self, path: &DocPath, payload: &Payload, merge: bool) -> CloudResult<()> {
        path.split_document()?;
        let mut url = self.document_url(path)?;
        url.query_pairs_mut()
            .append_pair("merge", if merge { "true" } else { "false" });
        let body = Value::Object(payload.clone());
        check(self.auth_send(Method::PUT, url, Some(&body)).await?)?;
        Ok(())
    }

    async fn add(&self, collection: &DocPath, payload: &Payload) -> CloudResult<String> {
        let collection = collection.expect_collection()?;
        let url = self.document_url(collection)?;
        let body = Value::Object(payload.clone());
        let resp = self.auth_send(Method::POST, url, Some(&body)).await?;
        let data: AddResponse = check(resp)?.json().await?;
        Ok(data.id)
    }

    async fn delete(&self, path: &DocPath) -> CloudResult<()> {
        path.split_document()?;
        let url = self.document_url(path)?;
        let resp = self.auth_send(Method::DELETE, url, None).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(path = %path, "delete of missing document");
            return Ok(());
        }
        check(resp)?;
        Ok(())
    }
}
