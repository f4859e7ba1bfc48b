/**
 * Event Routes
 * Timeline events, optionally pointing at another record (ref_type / ref_id)
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{self, models::Event};
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::require_admin;
use crate::routes::{non_blank, parse_id, OkResponse};

const EVENT_COLUMNS: &str = "id, title, start_at, end_at, ref_type, ref_id";

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub ref_type: Option<String>,
    pub ref_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub ref_type: Option<String>,
    pub ref_id: Option<i64>,
}

fn check_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> ApiResult<()> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => {
            Err(ApiError::bad_request("end_at must not be before start_at"))
        }
        _ => Ok(()),
    }
}

/// Range an update would leave behind: payload values over the stored ones.
fn merged_range(
    stored: (DateTime<Utc>, Option<DateTime<Utc>>),
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
    (start_at.unwrap_or(stored.0), end_at.or(stored.1))
}

/// GET /api/events - Latest start first
pub async fn list_events() -> ApiResult<Json<Vec<Event>>> {
    let pool = db::pool()?;

    let events = sqlx::query_as::<_, Event>(&format!(
        "SELECT {} FROM events ORDER BY start_at DESC",
        EVENT_COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    Ok(Json(events))
}

/// POST /api/events (admin)
pub async fn create_event(
    headers: HeaderMap,
    Json(payload): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    require_admin(&headers)?;

    let title = non_blank(payload.title).ok_or_else(|| ApiError::bad_request("Title is required"))?;
    let start_at = payload
        .start_at
        .ok_or_else(|| ApiError::bad_request("start_at is required"))?;
    check_range(Some(start_at), payload.end_at)?;

    let pool = db::pool()?;

    let event = sqlx::query_as::<_, Event>(&format!(
        r#"
        INSERT INTO events (title, start_at, end_at, ref_type, ref_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        EVENT_COLUMNS
    ))
    .bind(&title)
    .bind(start_at)
    .bind(payload.end_at)
    .bind(&payload.ref_type)
    .bind(payload.ref_id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// PUT /api/events/{id} - Partial update (admin)
pub async fn update_event(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateEventRequest>,
) -> ApiResult<Json<Event>> {
    require_admin(&headers)?;
    let id = parse_id(&id)?;
    if matches!(payload.title.as_deref(), Some(t) if t.trim().is_empty()) {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }
    check_range(payload.start_at, payload.end_at)?;

    let pool = db::pool()?;

    if payload.start_at.is_some() || payload.end_at.is_some() {
        let stored: (DateTime<Utc>, Option<DateTime<Utc>>) =
            sqlx::query_as("SELECT start_at, end_at FROM events WHERE id = $1")
                .bind(id)
                .fetch_optional(pool.as_ref())
                .await?
                .ok_or_else(|| ApiError::not_found("Event"))?;
        let (start, end) = merged_range(stored, payload.start_at, payload.end_at);
        check_range(Some(start), end)?;
    }

    let event = sqlx::query_as::<_, Event>(&format!(
        r#"
        UPDATE events SET
            title = COALESCE($2, title),
            start_at = COALESCE($3, start_at),
            end_at = COALESCE($4, end_at),
            ref_type = COALESCE($5, ref_type),
            ref_id = COALESCE($6, ref_id)
        WHERE id = $1
        RETURNING {}
        "#,
        EVENT_COLUMNS
    ))
    .bind(id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(payload.start_at)
    .bind(payload.end_at)
    .bind(&payload.ref_type)
    .bind(payload.ref_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Event"))?;

    Ok(Json(event))
}

/// DELETE /api/events/{id} (admin)
pub async fn delete_event(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    require_admin(&headers)?;
    let id = parse_id(&id)?;
    let pool = db::pool()?;

    let result = sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Event"));
    }
    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::auth::tests::{admin_user, bearer_for};
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, put};
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/api/events", get(list_events).post(create_event))
            .route("/api/events/{id}", put(update_event).delete(delete_event))
    }

    fn admin_post(body: &str) -> Request<Body> {
        Request::post("/api/events")
            .header("content-type", "application/json")
            .header("authorization", bearer_for(&admin_user()))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_check_range() {
        let a: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().unwrap();
        let b: DateTime<Utc> = "2024-05-02T10:00:00Z".parse().unwrap();
        assert!(check_range(Some(a), Some(b)).is_ok());
        assert!(check_range(Some(b), Some(a)).is_err());
        assert!(check_range(None, Some(a)).is_ok());
    }

    #[test]
    fn test_partial_update_is_checked_against_stored_range() {
        let start: DateTime<Utc> = "2024-05-10T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2024-05-12T10:00:00Z".parse().unwrap();
        let earlier: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().unwrap();

        // Only end_at sent, earlier than the stored start
        let (s, e) = merged_range((start, None), None, Some(earlier));
        assert!(check_range(Some(s), e).is_err());

        // Only start_at sent, after the stored end
        let later: DateTime<Utc> = "2024-05-20T10:00:00Z".parse().unwrap();
        let (s, e) = merged_range((start, Some(end)), Some(later), None);
        assert!(check_range(Some(s), e).is_err());

        let (s, e) = merged_range((start, Some(end)), Some(earlier), None);
        assert_eq!((s, e), (earlier, Some(end)));
        assert!(check_range(Some(s), e).is_ok());
    }

    #[tokio::test]
    async fn test_create_event_requires_title_and_start() {
        let res = app()
            .oneshot(admin_post(r#"{"start_at":"2024-05-01T10:00:00Z"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app().oneshot(admin_post(r#"{"title":"Talk"}"#)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app()
            .oneshot(admin_post(
                r#"{"title":"Talk","start_at":"2024-05-01T10:00:00Z","ref_type":"blog","ref_id":3}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_create_event_rejects_malformed_timestamp() {
        let res = app()
            .oneshot(admin_post(r#"{"title":"Talk","start_at":"tomorrow"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
