//! Folio API - library for app logic and testing

pub mod calendar;
pub mod client;
pub mod config;
pub mod content;
pub mod cookies;
pub mod db;
pub mod error;
pub mod logging;
pub mod routes;
pub mod scheduler;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use crate::config::CONFIG;
use crate::routes::{
    activity, auth, blog, comments, cv, events, health, profile, projects, quotes, upload,
    visitors,
};

/// Cap for JSON bodies
const JSON_BODY_LIMIT: usize = 1024 * 1024;
/// Cap for the upload route; the file itself is checked against 5 MB
const UPLOAD_BODY_LIMIT: usize = 6 * 1024 * 1024;

/// Configure CORS from the configured client origins.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins: Vec<HeaderValue> = CONFIG
        .client_urls
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

fn api_routes() -> Router {
    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/api/cv", get(cv::get_cv).put(cv::update_cv))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            put(projects::update_project).delete(projects::delete_project),
        )
        .route("/api/blogs", get(blog::list_posts).post(blog::create_post))
        .route(
            "/api/blogs/{key}",
            get(blog::get_post)
                .put(blog::update_post)
                .delete(blog::delete_post),
        )
        .route(
            "/api/blogs/{key}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/api/blogs/comments/{comment_id}",
            put(comments::moderate_comment).delete(comments::delete_comment),
        )
        .route(
            "/api/blogs/comments/{comment_id}/reactions",
            get(comments::list_reactions).post(comments::add_reaction),
        )
        .route(
            "/api/events",
            get(events::list_events).post(events::create_event),
        )
        .route(
            "/api/events/{id}",
            put(events::update_event).delete(events::delete_event),
        )
        .route("/api/activity", get(activity::get_month))
        .route("/api/activity/export", get(activity::export_month))
        .route("/api/activity/streaks", get(activity::get_streaks))
        .route("/api/activity/bulk", post(activity::bulk_set))
        .route("/api/activity/mark-today", post(activity::mark_today))
        .route("/api/activity/{date}", put(activity::set_day))
        .route(
            "/api/quotes",
            get(quotes::list_quotes).post(quotes::create_quote),
        )
        .route("/api/quotes/daily", get(quotes::daily_quote))
        .route("/api/quotes/{id}", delete(quotes::delete_quote))
        .route(
            "/api/visitors",
            get(visitors::get_visitors).post(visitors::record_visit),
        )
        .route("/api/health", get(health::health_ping))
        .route("/api/health/ready", get(health::health_ready))
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    let cors = configure_cors();
    tracing::info!(origins = ?CONFIG.client_urls, "CORS configured");

    let uploads = Router::new()
        .route("/api/uploads", post(upload::upload_image))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(UPLOAD_BODY_LIMIT));

    api_routes()
        .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT))
        .merge(uploads)
        .nest_service(upload::PUBLIC_PREFIX, ServeDir::new(&CONFIG.upload_dir))
        .layer(middleware::from_fn(logging::middleware::ensure_anon_id))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards must outlive the server or buffered log lines are lost.
    let _log_guards = logging::init();

    health::init_start_time();

    // Refuse to start in production with the built-in development secrets.
    if CONFIG.is_production() && CONFIG.uses_default_secrets() {
        panic!(
            "FATAL: JWT_ACCESS_SECRET and JWT_REFRESH_SECRET (or JWT_SECRET) must be set \
             in production. Refusing to start with the default secrets."
        );
    }
    if CONFIG.uses_default_secrets() {
        tracing::warn!("Using development JWT secrets. Do not deploy this configuration.");
    }

    let mut daily_marker = None;

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
                if CONFIG.daily_marker {
                    daily_marker = Some(scheduler::start_daily_marker(pool, CONFIG.site_offset));
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
    }

    let app = create_app();

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(4000);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    if let Some(marker) = daily_marker {
        marker.shutdown().await;
    }
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        tracing::info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        create_app().layer(MockConnectInfo(SocketAddr::from(([10, 1, 0, 1], 4000))))
    }

    async fn status_of(req: Request<Body>) -> StatusCode {
        app().oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_health_sets_request_id_and_anon_cookie() {
        let req = Request::get("/api/health").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));

        let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("anon_id="));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let req = Request::get("/api/nope").body(Body::empty()).unwrap();
        assert_eq!(status_of(req).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected() {
        let req = Request::patch("/api/blogs").body(Body::empty()).unwrap();
        assert_eq!(status_of(req).await, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_comment_routes_resolve_next_to_blog_routes() {
        // static `comments` segment wins over the blog key
        let req = Request::post("/api/blogs/comments/5/reactions")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);

        let req = Request::get("/api/blogs/12/comments")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(req).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        for (method, uri) in [
            ("PUT", "/api/profile"),
            ("PUT", "/api/cv"),
            ("POST", "/api/projects"),
            ("POST", "/api/events"),
            ("POST", "/api/quotes"),
            ("POST", "/api/activity/bulk"),
            ("PUT", "/api/activity/2024-01-01"),
        ] {
            let req = Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap();
            assert_eq!(status_of(req).await, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_oversized_json_body_is_rejected() {
        let body = vec![b' '; JSON_BODY_LIMIT + 1];
        let req = Request::post("/api/projects")
            .header("content-type", "application/json")
            .header("content-length", body.len())
            .body(Body::from(body))
            .unwrap();
        assert_eq!(status_of(req).await, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_missing_upload_is_not_found() {
        let req = Request::get("/uploads/does-not-exist.png")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(req).await, StatusCode::NOT_FOUND);
    }
}
