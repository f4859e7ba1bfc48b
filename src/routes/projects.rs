/**
 * Project Routes
 * Portfolio projects CRUD
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{self, models::Project};
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::require_admin;
use crate::routes::{non_blank, parse_id, OkResponse};

const PROJECT_COLUMNS: &str =
    "id, title, description, tags, repo_url, demo_url, image_url, created_at, updated_at";

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub repo_url: Option<String>,
    pub demo_url: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub repo_url: Option<String>,
    pub demo_url: Option<String>,
    pub image_url: Option<String>,
}

/// Trims tags and drops empty ones.
fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/projects - Newest first
pub async fn list_projects() -> ApiResult<Json<Vec<Project>>> {
    let pool = db::pool()?;

    let projects = sqlx::query_as::<_, Project>(&format!(
        "SELECT {} FROM projects ORDER BY created_at DESC",
        PROJECT_COLUMNS
    ))
    .fetch_all(pool.as_ref())
    .await?;

    Ok(Json(projects))
}

/// POST /api/projects (admin)
pub async fn create_project(
    headers: HeaderMap,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    require_admin(&headers)?;

    let title = non_blank(payload.title).ok_or_else(|| ApiError::bad_request("Title is required"))?;
    let pool = db::pool()?;

    let project = sqlx::query_as::<_, Project>(&format!(
        r#"
        INSERT INTO projects (title, description, tags, repo_url, demo_url, image_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        PROJECT_COLUMNS
    ))
    .bind(&title)
    .bind(&payload.description)
    .bind(clean_tags(payload.tags))
    .bind(&payload.repo_url)
    .bind(&payload.demo_url)
    .bind(&payload.image_url)
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!(id = project.id, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

/// PUT /api/projects/{id} - Partial update (admin)
pub async fn update_project(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    require_admin(&headers)?;
    let id = parse_id(&id)?;

    if matches!(payload.title.as_deref(), Some(t) if t.trim().is_empty()) {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }

    let pool = db::pool()?;

    let project = sqlx::query_as::<_, Project>(&format!(
        r#"
        UPDATE projects SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            tags = COALESCE($4, tags),
            repo_url = COALESCE($5, repo_url),
            demo_url = COALESCE($6, demo_url),
            image_url = COALESCE($7, image_url),
            updated_at = now()
        WHERE id = $1
        RETURNING {}
        "#,
        PROJECT_COLUMNS
    ))
    .bind(id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(&payload.description)
    .bind(payload.tags.map(clean_tags))
    .bind(&payload.repo_url)
    .bind(&payload.demo_url)
    .bind(&payload.image_url)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Project"))?;

    Ok(Json(project))
}

/// DELETE /api/projects/{id} (admin)
pub async fn delete_project(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    require_admin(&headers)?;
    let id = parse_id(&id)?;
    let pool = db::pool()?;

    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project"));
    }

    tracing::info!(id, "project deleted");
    Ok(Json(OkResponse::ok()))
}
