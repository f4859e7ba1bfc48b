/**
 * Blog Routes
 * CRUD API endpoints for blog posts
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::content::{self, ReadingTime, EXCERPT_LEN};
use crate::db::{self, models::Blog};
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::{is_admin, require_admin};
use crate::routes::{parse_id, OkResponse};

const BLOG_COLUMNS: &str = "id, title, slug, content_md, published, created_at, updated_at";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Blog post in the list view
#[derive(Debug, Serialize)]
pub struct BlogListItem {
    #[serde(flatten)]
    pub post: Blog,
    pub excerpt: String,
    #[serde(rename = "readingTime")]
    pub reading_time: ReadingTime,
}

impl From<Blog> for BlogListItem {
    fn from(post: Blog) -> Self {
        Self {
            excerpt: content::excerpt(&post.content_md, EXCERPT_LEN),
            reading_time: content::reading_time(&post.content_md),
            post,
        }
    }
}

/// Full blog post response
#[derive(Debug, Serialize)]
pub struct BlogPostResponse {
    #[serde(flatten)]
    pub post: Blog,
    #[serde(rename = "readingTime")]
    pub reading_time: ReadingTime,
}

impl From<Blog> for BlogPostResponse {
    fn from(post: Blog) -> Self {
        Self {
            reading_time: content::reading_time(&post.content_md),
            post,
        }
    }
}

/// Request body for POST /api/blogs (create)
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateBlogRequest {
    #[serde(default)]
    pub title: String,
    pub content_md: Option<String>,
    pub published: Option<bool>,
}

/// Request body for PUT /api/blogs/{id} (update)
#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateBlogRequest {
    pub title: Option<String>,
    pub content_md: Option<String>,
    pub published: Option<bool>,
}

// ============================================================================
// Helpers
// ============================================================================

/// First free slug for `title`, probing `base`, `base-1`, `base-2`, ...
async fn unique_slug(pool: &sqlx::PgPool, title: &str) -> ApiResult<String> {
    let base = content::slugify(title);
    for candidate in content::slug_candidates(&base) {
        let taken: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM blogs WHERE slug = $1")
            .bind(&candidate)
            .fetch_optional(pool)
            .await?;
        if taken.is_none() {
            return Ok(candidate);
        }
    }
    Err(ApiError::Internal("slug space exhausted".to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/blogs - Published posts, or every post for admins
pub async fn list_posts(headers: HeaderMap) -> ApiResult<Json<Vec<BlogListItem>>> {
    let admin = is_admin(&headers);
    let pool = db::pool()?;

    let sql = if admin {
        format!("SELECT {} FROM blogs ORDER BY created_at DESC", BLOG_COLUMNS)
    } else {
        format!(
            "SELECT {} FROM blogs WHERE published = TRUE ORDER BY created_at DESC",
            BLOG_COLUMNS
        )
    };

    let posts = sqlx::query_as::<_, Blog>(&sql)
        .fetch_all(pool.as_ref())
        .await?;

    Ok(Json(posts.into_iter().map(BlogListItem::from).collect()))
}

/// GET /api/blogs/{slug} - Single post; drafts only for admins
pub async fn get_post(
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> ApiResult<Json<BlogPostResponse>> {
    if !content::is_valid_slug(&slug) {
        return Err(ApiError::not_found("Blog post"));
    }
    let admin = is_admin(&headers);
    let pool = db::pool()?;

    let post = sqlx::query_as::<_, Blog>(&format!(
        "SELECT {} FROM blogs WHERE slug = $1 AND (published = TRUE OR $2)",
        BLOG_COLUMNS
    ))
    .bind(&slug)
    .bind(admin)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Blog post"))?;

    Ok(Json(post.into()))
}

/// POST /api/blogs - Create new blog post (admin)
pub async fn create_post(
    headers: HeaderMap,
    Json(payload): Json<CreateBlogRequest>,
) -> ApiResult<(StatusCode, Json<BlogPostResponse>)> {
    require_admin(&headers)?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }

    let pool = db::pool()?;
    let slug = unique_slug(pool.as_ref(), title).await?;

    let post = sqlx::query_as::<_, Blog>(&format!(
        r#"
        INSERT INTO blogs (title, slug, content_md, published)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        BLOG_COLUMNS
    ))
    .bind(title)
    .bind(&slug)
    .bind(payload.content_md.unwrap_or_default())
    .bind(payload.published.unwrap_or(true))
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!(id = post.id, slug = %post.slug, "blog post created");
    Ok((StatusCode::CREATED, Json(post.into())))
}

/// PUT /api/blogs/{id} - Partial update; the slug never changes (admin)
pub async fn update_post(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBlogRequest>,
) -> ApiResult<Json<BlogPostResponse>> {
    require_admin(&headers)?;
    let id = parse_id(&id)?;

    if matches!(payload.title.as_deref(), Some(t) if t.trim().is_empty()) {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }

    let pool = db::pool()?;

    let post = sqlx::query_as::<_, Blog>(&format!(
        r#"
        UPDATE blogs SET
            title = COALESCE($2, title),
            content_md = COALESCE($3, content_md),
            published = COALESCE($4, published),
            updated_at = now()
        WHERE id = $1
        RETURNING {}
        "#,
        BLOG_COLUMNS
    ))
    .bind(id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(&payload.content_md)
    .bind(payload.published)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Blog post"))?;

    Ok(Json(post.into()))
}

/// DELETE /api/blogs/{id} - Delete blog post and its comments (admin)
pub async fn delete_post(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    require_admin(&headers)?;
    let id = parse_id(&id)?;
    let pool = db::pool()?;

    let result = sqlx::query("DELETE FROM blogs WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Blog post"));
    }

    tracing::info!(id, "blog post deleted");
    Ok(Json(OkResponse::ok()))
}
