/**
 * Authentication Routes
 * JWT sessions: login, refresh (with rotation), logout, me
 */
use axum::{
    body::Bytes,
    extract::ConnectInfo,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use bcrypt::verify;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;

use crate::config::CONFIG;
use crate::cookies::{build_cookie, clear_cookie, get_cookie, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::db::{self, models::User};
use crate::error::{ApiError, ApiResult};
use crate::routes::{parse_optional_json, OkResponse};

// ============================================================================
// Configuration
// ============================================================================

pub const ROLE_ADMIN: &str = "admin";

/// Login attempts allowed per IP inside one window
const LOGIN_ATTEMPTS_PER_WINDOW: u32 = 5;

/// Rate limit window in seconds
const RATE_LIMIT_WINDOW_SECS: i64 = 60;

lazy_static::lazy_static! {
    /// SHA-256 of revoked refresh tokens -> their expiry timestamp
    static ref REVOKED_REFRESH_TOKENS: Arc<RwLock<HashMap<String, i64>>> =
        Arc::new(RwLock::new(HashMap::new()));

    /// Login throttle (IP -> attempts in current window)
    static ref LOGIN_LIMITER: RateLimiter =
        RateLimiter::new(LOGIN_ATTEMPTS_PER_WINDOW, RATE_LIMIT_WINDOW_SECS);
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,   // User ID
    pub email: String, // User email
    pub role: String,  // "admin" or "guest"
    pub typ: TokenKind,
    pub jti: String, // Random per token
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// User info returned to frontend
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl From<&Claims> for UserInfo {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub.clone(),
            email: claims.email.clone(),
            role: claims.role.clone(),
        }
    }
}

/// Freshly issued access + refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserInfo,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub ok: bool,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserInfo,
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Fixed-window attempt counter keyed by client IP.
pub struct RateLimiter {
    max_attempts: u32,
    window_secs: i64,
    windows: RwLock<HashMap<String, (i64, u32)>>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window_secs: i64) -> Self {
        Self {
            max_attempts,
            window_secs,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Records an attempt at `now` and reports whether it is allowed.
    ///
    /// Stale windows are evicted on every call so the map stays proportional
    /// to the number of currently active IPs.
    pub async fn check(&self, ip: &str, now: i64) -> bool {
        let mut windows = self.windows.write().await;
        windows.retain(|_, (start, _)| now - *start < self.window_secs);

        let entry = windows.entry(ip.to_string()).or_insert((now, 0));
        if entry.1 >= self.max_attempts {
            return false;
        }
        entry.1 += 1;
        true
    }
}

// ============================================================================
// Token helpers
// ============================================================================

fn secret_for(kind: TokenKind) -> &'static [u8] {
    match kind {
        TokenKind::Access => CONFIG.jwt.access_secret.as_bytes(),
        TokenKind::Refresh => CONFIG.jwt.refresh_secret.as_bytes(),
    }
}

fn lifetime_secs(kind: TokenKind) -> i64 {
    match kind {
        TokenKind::Access => CONFIG.jwt.access_ttl.num_seconds(),
        TokenKind::Refresh => CONFIG.jwt.refresh_ttl.num_seconds(),
    }
}

/// Signs a token of the given kind for a user.
pub fn create_token(
    user: &UserInfo,
    kind: TokenKind,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role.clone(),
        typ: kind,
        jti: uuid::Uuid::new_v4().to_string(),
        exp: now + lifetime_secs(kind),
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret_for(kind)),
    )
}

pub fn issue_token_pair(user: &UserInfo) -> Result<TokenPair, jsonwebtoken::errors::Error> {
    Ok(TokenPair {
        access_token: create_token(user, TokenKind::Access)?,
        refresh_token: create_token(user, TokenKind::Refresh)?,
    })
}

/// Verifies signature, expiry and token kind.
pub fn verify_token(token: &str, kind: TokenKind) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret_for(kind)),
        &Validation::default(),
    )?;

    if token_data.claims.typ != kind {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
    }
    Ok(token_data.claims)
}

pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    verify_token(token, TokenKind::Access)
}

/// Hash a refresh token before it goes into the revocation set.
fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Adds a refresh token to the revocation set. Returns false when it was
/// already revoked, so each token can be spent at most once.
async fn revoke_refresh_token(token: &str, expires_at: i64) -> bool {
    let now = Utc::now().timestamp();
    let mut revoked = REVOKED_REFRESH_TOKENS.write().await;
    // Expired tokens fail verification anyway; no need to remember them.
    revoked.retain(|_, exp| *exp > now);
    revoked
        .insert(hash_refresh_token(token), expires_at)
        .is_none()
}

// ============================================================================
// Request guards
// ============================================================================

/// Access token from `Authorization: Bearer` or the `access_token` cookie.
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| get_cookie(headers, ACCESS_COOKIE))
}

/// Any signed-in user; 401 otherwise.
pub fn require_user(headers: &HeaderMap) -> ApiResult<Claims> {
    let token = extract_access_token(headers).ok_or(ApiError::Unauthorized)?;
    verify_access_token(&token).map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        ApiError::Unauthorized
    })
}

/// Admin only; 401 without a valid token, 403 for other roles.
pub fn require_admin(headers: &HeaderMap) -> ApiResult<Claims> {
    let claims = require_user(headers)?;
    if !claims.is_admin() {
        return Err(ApiError::Forbidden);
    }
    Ok(claims)
}

/// Whether the request carries a valid admin token. Never fails.
pub fn is_admin(headers: &HeaderMap) -> bool {
    require_admin(headers).is_ok()
}

fn session_cookies(pair: &TokenPair) -> AppendHeaders<[(header::HeaderName, String); 2]> {
    AppendHeaders([
        (
            header::SET_COOKIE,
            build_cookie(ACCESS_COOKIE, &pair.access_token, lifetime_secs(TokenKind::Access)),
        ),
        (
            header::SET_COOKIE,
            build_cookie(REFRESH_COOKIE, &pair.refresh_token, lifetime_secs(TokenKind::Refresh)),
        ),
    ])
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
/// Authenticate user, set session cookies and return tokens
pub async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let ip = addr.ip().to_string();

    if !LOGIN_LIMITER.check(&ip, Utc::now().timestamp()).await {
        tracing::warn!(ip = %ip, "login rate limited");
        return Err(ApiError::TooManyRequests);
    }

    let email = payload.email.trim().to_string();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email format"));
    }

    let pool = db::pool()?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, role FROM users WHERE LOWER(email) = LOWER($1)",
    )
    .bind(&email)
    .fetch_optional(pool.as_ref())
    .await?;

    let Some(user) = user else {
        tracing::warn!("Login attempt for unknown user: {}", email);
        return Err(ApiError::InvalidCredentials);
    };

    // bcrypt is CPU-bound; keep the async executor free.
    let password = payload.password;
    let hash = user.password_hash.clone();
    let password_ok = tokio::task::spawn_blocking(move || verify(&password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false);

    if !password_ok {
        tracing::warn!("Failed login attempt for: {}", user.email);
        return Err(ApiError::InvalidCredentials);
    }

    let info = UserInfo {
        id: user.id.to_string(),
        email: user.email,
        role: user.role,
    };
    let pair = issue_token_pair(&info)
        .map_err(|e| ApiError::Internal(format!("failed to create token: {}", e)))?;

    tracing::info!("Successful login for user: {}", info.email);

    Ok((
        StatusCode::OK,
        session_cookies(&pair),
        Json(LoginResponse {
            user: info,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

/// POST /api/auth/refresh
/// Exchange a refresh token (cookie or body) for a new pair; the old one is revoked
pub async fn refresh(headers: HeaderMap, body: Bytes) -> ApiResult<impl IntoResponse> {
    let payload: RefreshRequest = parse_optional_json(&body)?;

    let token = payload
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| get_cookie(&headers, REFRESH_COOKIE))
        .ok_or(ApiError::Unauthorized)?;

    let claims = verify_token(&token, TokenKind::Refresh).map_err(|e| {
        tracing::debug!("Refresh token rejected: {}", e);
        ApiError::Unauthorized
    })?;

    if !revoke_refresh_token(&token, claims.exp).await {
        tracing::warn!(user = %claims.email, "revoked refresh token presented");
        return Err(ApiError::Unauthorized);
    }

    let pair = issue_token_pair(&UserInfo::from(&claims))
        .map_err(|e| ApiError::Internal(format!("failed to create token: {}", e)))?;

    Ok((
        StatusCode::OK,
        session_cookies(&pair),
        Json(RefreshResponse {
            ok: true,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

/// POST /api/auth/logout
/// Revoke the presented refresh token and clear both cookies. Always succeeds.
pub async fn logout(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let payload: RefreshRequest = parse_optional_json(&body).unwrap_or_default();

    let token = payload
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| get_cookie(&headers, REFRESH_COOKIE));

    if let Some(token) = token {
        if let Ok(claims) = verify_token(&token, TokenKind::Refresh) {
            revoke_refresh_token(&token, claims.exp).await;
        }
    }

    (
        StatusCode::OK,
        AppendHeaders([
            (header::SET_COOKIE, clear_cookie(ACCESS_COOKIE)),
            (header::SET_COOKIE, clear_cookie(REFRESH_COOKIE)),
        ]),
        Json(OkResponse::ok()),
    )
}

/// GET /api/auth/me
pub async fn me(headers: HeaderMap) -> ApiResult<Json<MeResponse>> {
    let claims = require_user(&headers)?;
    Ok(Json(MeResponse {
        user: UserInfo::from(&claims),
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{HeaderValue, Request};
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    pub(crate) fn admin_user() -> UserInfo {
        UserInfo {
            id: "1".to_string(),
            email: "owner@example.com".to_string(),
            role: ROLE_ADMIN.to_string(),
        }
    }

    pub(crate) fn guest_user() -> UserInfo {
        UserInfo {
            id: "2".to_string(),
            email: "guest@example.com".to_string(),
            role: "guest".to_string(),
        }
    }

    /// `Authorization` header value for a fresh access token.
    pub(crate) fn bearer_for(user: &UserInfo) -> String {
        format!("Bearer {}", create_token(user, TokenKind::Access).unwrap())
    }

    fn auth_router(last_octet: u8) -> Router {
        Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/me", get(me))
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, last_octet], 4000))))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, axum::body::Bytes) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes)
    }

    fn post_json(uri: &str, json: &impl serde::Serialize) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap()
    }

    #[test]
    fn test_token_roundtrip_keeps_identity() {
        let user = admin_user();
        let pair = issue_token_pair(&user).unwrap();
        let claims = verify_access_token(&pair.access_token).unwrap();
        assert_eq!(UserInfo::from(&claims), user);
        assert!(claims.is_admin());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_access_and_refresh_tokens_are_not_interchangeable() {
        let pair = issue_token_pair(&guest_user()).unwrap();
        assert!(verify_access_token(&pair.refresh_token).is_err());
        assert!(verify_token(&pair.access_token, TokenKind::Refresh).is_err());
        assert!(verify_token(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn test_tokens_issued_together_are_distinct() {
        let a = issue_token_pair(&admin_user()).unwrap();
        let b = issue_token_pair(&admin_user()).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
        assert_ne!(a.access_token, b.access_token);
    }

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        assert!(verify_access_token("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_require_admin_distinguishes_401_and_403() {
        let mut headers = HeaderMap::new();
        assert!(matches!(require_admin(&headers), Err(ApiError::Unauthorized)));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&bearer_for(&guest_user())).unwrap(),
        );
        assert!(matches!(require_admin(&headers), Err(ApiError::Forbidden)));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&bearer_for(&admin_user())).unwrap(),
        );
        assert!(require_admin(&headers).is_ok());
    }

    #[test]
    fn test_access_token_read_from_cookie() {
        let token = create_token(&admin_user(), TokenKind::Access).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}={}", ACCESS_COOKIE, token)).unwrap(),
        );
        assert!(is_admin(&headers));
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_after_max_attempts() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.check("1.1.1.1", 1000).await);
        assert!(limiter.check("1.1.1.1", 1001).await);
        assert!(!limiter.check("1.1.1.1", 1002).await);
        // other IPs unaffected
        assert!(limiter.check("2.2.2.2", 1002).await);
        // window expired
        assert!(limiter.check("1.1.1.1", 1061).await);
    }

    #[tokio::test]
    async fn test_login_empty_email_returns_bad_request() {
        let (status, _, _) = send(
            auth_router(1),
            post_json(
                "/api/auth/login",
                &LoginRequest {
                    email: "".to_string(),
                    password: "secret".to_string(),
                },
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_invalid_email_format_returns_bad_request() {
        let (status, _, _) = send(
            auth_router(2),
            post_json(
                "/api/auth/login",
                &LoginRequest {
                    email: "no-at-sign".to_string(),
                    password: "secret".to_string(),
                },
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_without_database_is_unavailable() {
        let (status, _, _) = send(
            auth_router(3),
            post_json(
                "/api/auth/login",
                &LoginRequest {
                    email: "owner@example.com".to_string(),
                    password: "secret".to_string(),
                },
            ),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_login_is_rate_limited_per_ip() {
        let body = LoginRequest {
            email: "".to_string(),
            password: "".to_string(),
        };
        for _ in 0..LOGIN_ATTEMPTS_PER_WINDOW {
            let (status, _, _) = send(auth_router(4), post_json("/api/auth/login", &body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, _, _) = send(auth_router(4), post_json("/api/auth/login", &body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let req = Request::get("/api/auth/me").body(Body::empty()).unwrap();
        let (status, _, _) = send(auth_router(5), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::get("/api/auth/me")
            .header("authorization", bearer_for(&guest_user()))
            .body(Body::empty())
            .unwrap();
        let (status, _, bytes) = send(auth_router(5), req).await;
        assert_eq!(status, StatusCode::OK);
        let body: MeResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.user, guest_user());
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_unauthorized() {
        let req = Request::post("/api/auth/refresh").body(Body::empty()).unwrap();
        let (status, _, _) = send(auth_router(6), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_revokes_old_token() {
        let pair = issue_token_pair(&admin_user()).unwrap();
        let body = RefreshRequest {
            refresh_token: Some(pair.refresh_token.clone()),
        };

        let (status, headers, bytes) =
            send(auth_router(7), post_json("/api/auth/refresh", &body)).await;
        assert_eq!(status, StatusCode::OK);
        let rotated: RefreshResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(rotated.ok);
        assert!(verify_access_token(&rotated.access_token).is_ok());
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);

        // the old refresh token is now revoked
        let (status, _, _) = send(auth_router(7), post_json("/api/auth/refresh", &body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_accepts_cookie() {
        let pair = issue_token_pair(&guest_user()).unwrap();
        let req = Request::post("/api/auth/refresh")
            .header(
                "cookie",
                format!("{}={}", REFRESH_COOKIE, pair.refresh_token),
            )
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(auth_router(8), req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logout_clears_cookies_and_revokes() {
        let pair = issue_token_pair(&admin_user()).unwrap();
        let body = RefreshRequest {
            refresh_token: Some(pair.refresh_token.clone()),
        };

        let (status, headers, bytes) =
            send(auth_router(9), post_json("/api/auth/logout", &body)).await;
        assert_eq!(status, StatusCode::OK);
        let ok: OkResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(ok.ok);
        let cookies: Vec<_> = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));

        let (status, _, _) = send(auth_router(9), post_json("/api/auth/refresh", &body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_without_body_still_succeeds() {
        let req = Request::post("/api/auth/logout").body(Body::empty()).unwrap();
        let (status, _, _) = send(auth_router(10), req).await;
        assert_eq!(status, StatusCode::OK);
    }
}
