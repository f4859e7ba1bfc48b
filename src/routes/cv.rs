/**
 * CV Routes
 * Curriculum vitae sections stored as JSON documents (single row)
 */
use axum::{http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

use crate::db::{self, models::Cv};
use crate::error::ApiResult;
use crate::routes::auth::require_admin;

const CV_COLUMNS: &str = "id, summary, education, experience, skills, certifications, updated_at";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateCvRequest {
    pub summary: Option<String>,
    pub education: Option<serde_json::Value>,
    pub experience: Option<serde_json::Value>,
    pub skills: Option<serde_json::Value>,
    pub certifications: Option<serde_json::Value>,
}

/// GET /api/cv
pub async fn get_cv() -> ApiResult<Json<Option<Cv>>> {
    let pool = db::pool()?;

    let cv = sqlx::query_as::<_, Cv>(&format!("SELECT {} FROM cv WHERE id = 1", CV_COLUMNS))
        .fetch_optional(pool.as_ref())
        .await?;

    Ok(Json(cv))
}

/// PUT /api/cv - Upsert; sections left out keep their stored value (admin)
pub async fn update_cv(
    headers: HeaderMap,
    Json(payload): Json<UpdateCvRequest>,
) -> ApiResult<Json<Cv>> {
    require_admin(&headers)?;
    let pool = db::pool()?;

    let cv = sqlx::query_as::<_, Cv>(&format!(
        r#"
        INSERT INTO cv (id, summary, education, experience, skills, certifications)
        VALUES (
            1, $1,
            COALESCE($2, '{{}}'::jsonb),
            COALESCE($3, '{{}}'::jsonb),
            COALESCE($4, '{{}}'::jsonb),
            COALESCE($5, '{{}}'::jsonb)
        )
        ON CONFLICT (id) DO UPDATE SET
            summary = COALESCE($1, cv.summary),
            education = COALESCE($2, cv.education),
            experience = COALESCE($3, cv.experience),
            skills = COALESCE($4, cv.skills),
            certifications = COALESCE($5, cv.certifications),
            updated_at = now()
        RETURNING {}
        "#,
        CV_COLUMNS
    ))
    .bind(&payload.summary)
    .bind(&payload.education)
    .bind(&payload.experience)
    .bind(&payload.skills)
    .bind(&payload.certifications)
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!("cv updated");
    Ok(Json(cv))
}
