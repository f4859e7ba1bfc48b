/**
 * Quote Routes
 * Quote-of-the-day rotation plus admin management of the quote list
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::config::CONFIG;
use crate::db::{self, models::Quote};
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::require_admin;
use crate::routes::{non_blank, parse_id, OkResponse};

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateQuoteRequest {
    pub text: Option<String>,
    pub author: Option<String>,
}

async fn all_quotes(pool: &sqlx::PgPool) -> ApiResult<Vec<Quote>> {
    let quotes = sqlx::query_as::<_, Quote>("SELECT id, text, author FROM quotes ORDER BY id ASC")
        .fetch_all(pool)
        .await?;
    Ok(quotes)
}

/// GET /api/quotes/daily - Same quote all day (site time zone), `null` if none exist
pub async fn daily_quote() -> ApiResult<Json<Option<Quote>>> {
    let pool = db::pool()?;
    let mut quotes = all_quotes(pool.as_ref()).await?;

    let today = calendar::today(CONFIG.site_offset);
    let quote = calendar::daily_quote_index(today, quotes.len()).map(|i| quotes.swap_remove(i));

    Ok(Json(quote))
}

/// GET /api/quotes
pub async fn list_quotes() -> ApiResult<Json<Vec<Quote>>> {
    let pool = db::pool()?;
    Ok(Json(all_quotes(pool.as_ref()).await?))
}

/// POST /api/quotes (admin)
pub async fn create_quote(
    headers: HeaderMap,
    Json(payload): Json<CreateQuoteRequest>,
) -> ApiResult<(StatusCode, Json<Quote>)> {
    require_admin(&headers)?;

    let text = non_blank(payload.text).ok_or_else(|| ApiError::bad_request("text is required"))?;
    let author = non_blank(payload.author);

    let pool = db::pool()?;

    let quote = sqlx::query_as::<_, Quote>(
        "INSERT INTO quotes (text, author) VALUES ($1, $2) RETURNING id, text, author",
    )
    .bind(&text)
    .bind(&author)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::bad_request("Quote already exists")
        }
        _ => ApiError::from(e),
    })?;

    Ok((StatusCode::CREATED, Json(quote)))
}

/// DELETE /api/quotes/{id} (admin)
pub async fn delete_quote(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    require_admin(&headers)?;
    let id = parse_id(&id)?;
    let pool = db::pool()?;

    let result = sqlx::query("DELETE FROM quotes WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Quote"));
    }
    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::auth::tests::{admin_user, bearer_for};
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{delete, get};
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/api/quotes", get(list_quotes).post(create_quote))
            .route("/api/quotes/daily", get(daily_quote))
            .route("/api/quotes/{id}", delete(delete_quote))
    }

    #[tokio::test]
    async fn test_create_quote_requires_text() {
        let req = Request::post("/api/quotes")
            .header("content-type", "application/json")
            .header("authorization", bearer_for(&admin_user()))
            .body(Body::from(r#"{"author":"Anon"}"#))
            .unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_quote_requires_auth() {
        let req = Request::delete("/api/quotes/1").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_daily_route_is_not_shadowed_by_id_route() {
        // GET is only registered on /daily; the id route is DELETE-only
        let req = Request::get("/api/quotes/daily").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = Request::get("/api/quotes/5").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
