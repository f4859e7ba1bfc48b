//! HTTP client for the API with the browser app's session rule: a 401 on any
//! call other than the refresh endpoint triggers exactly one token refresh,
//! then the original request is retried once.

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::error::ErrorResponse;
use crate::routes::auth::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, UserInfo};

pub const REFRESH_PATH: &str = "/api/auth/refresh";
const LOGIN_PATH: &str = "/api/auth/login";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

/// Access + refresh token pair held by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
    /// Serializes refreshes; the server accepts each refresh token once.
    refresh_lock: Mutex<()>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_session(base_url: impl Into<String>, session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
            ..Self::new(base_url)
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    async fn current_refresh_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .header("Accept", "application/json");

        if let Some(session) = self.session.read().await.as_ref() {
            request = request.bearer_auth(&session.access_token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    /// Sends a request, refreshing the session and retrying once on 401.
    /// The final response is returned whatever its status.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let sent_with = self.current_refresh_token().await;
        let response = self.send_once(&method, path, body.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || path == REFRESH_PATH {
            return Ok(response);
        }

        if self.refresh_if_current(sent_with.as_deref()).await.is_err() {
            tracing::debug!(path, "session refresh failed; returning original 401");
            return Ok(response);
        }

        self.send_once(&method, path, body.as_ref()).await
    }

    /// Exchanges the stored refresh token for a new pair. On failure the
    /// session is cleared.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refreshes only if the session still holds `stale`. When a concurrent
    /// caller already rotated it, the new pair is reused as is.
    async fn refresh_if_current(&self, stale: Option<&str>) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.current_refresh_token().await;
        if current.is_some() && current.as_deref() != stale {
            return Ok(());
        }
        self.refresh_locked().await
    }

    /// Caller holds `refresh_lock`.
    async fn refresh_locked(&self) -> Result<(), ClientError> {
        let Some(refresh_token) = self.current_refresh_token().await else {
            return Err(ClientError::Api {
                status: StatusCode::UNAUTHORIZED,
                message: "no refresh token".to_string(),
            });
        };

        let result: Result<RefreshResponse, ClientError> = async {
            let response = self
                .http
                .post(self.url(REFRESH_PATH))
                .json(&RefreshRequest {
                    refresh_token: Some(refresh_token),
                })
                .send()
                .await?;
            decode::<RefreshResponse>(response).await
        }
        .await;

        let mut session = self.session.write().await;
        match result {
            Ok(pair) => {
                *session = Some(Session {
                    access_token: pair.access_token,
                    refresh_token: pair.refresh_token,
                });
                Ok(())
            }
            Err(e) => {
                *session = None;
                Err(e)
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserInfo, ClientError> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        let login: LoginResponse = decode(response).await?;
        *self.session.write().await = Some(Session {
            access_token: login.access_token,
            refresh_token: login.refresh_token,
        });
        Ok(login.user)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        decode(self.send(Method::GET, path, None).await?).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Api {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        })?;
        decode(self.send(Method::POST, path, Some(body)).await?).await
    }
}

/// JSON body on success, `ClientError::Api` with the server's message otherwise.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| status.to_string());
    Err(ClientError::Api { status, message })
}
