/**
 * Visitor Counter
 */
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::ApiResult;

#[derive(Debug, Serialize, Deserialize)]
pub struct VisitorsResponse {
    pub total: i64,
}

/// POST /api/visitors - Count one visit
pub async fn record_visit() -> ApiResult<Json<VisitorsResponse>> {
    let pool = db::pool()?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO visitors_counter (id, total)
        VALUES (1, 1)
        ON CONFLICT (id) DO UPDATE SET total = visitors_counter.total + 1
        RETURNING total
        "#,
    )
    .fetch_one(pool.as_ref())
    .await?;

    Ok(Json(VisitorsResponse { total }))
}

/// GET /api/visitors
pub async fn get_visitors() -> ApiResult<Json<VisitorsResponse>> {
    let pool = db::pool()?;

    let total: Option<(i64,)> = sqlx::query_as("SELECT total FROM visitors_counter WHERE id = 1")
        .fetch_optional(pool.as_ref())
        .await?;

    Ok(Json(VisitorsResponse {
        total: total.map(|(t,)| t).unwrap_or(0),
    }))
}
