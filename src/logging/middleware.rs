use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

use crate::cookies::{build_cookie, get_cookie, ANON_COOKIE};

/// Lifetime of the anonymous visitor cookie
const ANON_COOKIE_MAX_AGE: i64 = 365 * 24 * 3600;

pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let req_id: String = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(
        request_id = %req_id,
        method = %method,
        uri = %uri,
        version = ?version,
        "incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            request_id = %req_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "request completed with error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            request_id = %req_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "request completed with client error"
        );
    } else {
        tracing::info!(
            request_id = %req_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "request completed"
        );
    }

    response
}

/// Gives every visitor without one a long-lived random `anon_id` cookie.
pub async fn ensure_anon_id(request: Request, next: Next) -> Response {
    let has_id = get_cookie(request.headers(), ANON_COOKIE).is_some();
    let mut response = next.run(request).await;

    if !has_id {
        let cookie = build_cookie(ANON_COOKIE, &Uuid::new_v4().to_string(), ANON_COOKIE_MAX_AGE);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!("invalid anon_id cookie: {}", e),
        }
    }

    response
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "hi" }))
            .layer(middleware::from_fn(ensure_anon_id))
            .layer(middleware::from_fn(log_request))
            .layer(propagate_request_id_layer())
            .layer(request_id_layer())
    }

    #[tokio::test]
    async fn test_new_visitor_gets_anon_id() {
        let req = axum::http::Request::get("/").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("anon_id="));
        assert!(cookie.contains("Max-Age=31536000"));
        assert!(res.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_returning_visitor_keeps_anon_id() {
        let req = axum::http::Request::get("/")
            .header("cookie", "anon_id=abc")
            .body(Body::empty())
            .unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }
}
