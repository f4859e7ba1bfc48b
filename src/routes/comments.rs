/**
 * Comment Routes
 * Blog comments, moderation and per-comment reaction counters
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::CONFIG;
use crate::cookies::{get_cookie, ANON_COOKIE};
use crate::db::{
    self,
    models::{Comment, CommentReaction},
};
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::{is_admin, require_admin};
use crate::routes::{non_blank, parse_id, OkResponse};

const COMMENT_COLUMNS: &str = "id, blog_id, author_name, body, image_url, approved, created_at";

/// Used when a commenter leaves the name blank
const DEFAULT_AUTHOR: &str = "guest";

const MAX_REACTION_TYPE_LEN: usize = 32;

/// Reaction type -> count
pub type ReactionMap = BTreeMap<String, i64>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    #[serde(flatten)]
    pub comment: Comment,
    pub reactions: ReactionMap,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateCommentRequest {
    pub author_name: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
}

/// Trimmed fields of a comment about to be stored
#[derive(Debug, PartialEq, Eq)]
pub struct NewComment {
    pub author_name: String,
    pub body: String,
    pub image_url: Option<String>,
}

impl CreateCommentRequest {
    pub fn validate(self) -> ApiResult<NewComment> {
        let body = non_blank(self.body).ok_or_else(|| ApiError::bad_request("body is required"))?;
        Ok(NewComment {
            author_name: non_blank(self.author_name).unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            body,
            image_url: non_blank(self.image_url),
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ModerateCommentRequest {
    pub approved: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReactionRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Groups reaction rows by comment id.
pub fn group_reactions(rows: Vec<CommentReaction>) -> HashMap<i64, ReactionMap> {
    let mut grouped: HashMap<i64, ReactionMap> = HashMap::new();
    for row in rows {
        grouped
            .entry(row.comment_id)
            .or_default()
            .insert(row.kind, row.count);
    }
    grouped
}

fn validate_reaction_type(kind: Option<String>) -> ApiResult<String> {
    let kind = non_blank(kind).ok_or_else(|| ApiError::bad_request("type is required"))?;
    if kind.chars().count() > MAX_REACTION_TYPE_LEN {
        return Err(ApiError::bad_request(format!(
            "type must be at most {} characters",
            MAX_REACTION_TYPE_LEN
        )));
    }
    Ok(kind)
}

async fn reactions_for(pool: &sqlx::PgPool, comment_id: i64) -> ApiResult<ReactionMap> {
    let rows = sqlx::query_as::<_, CommentReaction>(
        "SELECT comment_id, type, count FROM comment_reactions WHERE comment_id = $1",
    )
    .bind(comment_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| (r.kind, r.count)).collect())
}

async fn ensure_comment_exists(pool: &sqlx::PgPool, comment_id: i64) -> ApiResult<()> {
    let exists: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_optional(pool)
        .await?;
    exists.map(|_| ()).ok_or_else(|| ApiError::not_found("Comment"))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/blogs/{id}/comments - Approved comments (all for admins), oldest first
pub async fn list_comments(
    headers: HeaderMap,
    Path(blog_id): Path<String>,
) -> ApiResult<Json<Vec<CommentResponse>>> {
    let blog_id = parse_id(&blog_id)?;
    let admin = is_admin(&headers);
    let pool = db::pool()?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        r#"
        SELECT {} FROM comments
        WHERE blog_id = $1 AND (approved = TRUE OR $2)
        ORDER BY created_at ASC
        "#,
        COMMENT_COLUMNS
    ))
    .bind(blog_id)
    .bind(admin)
    .fetch_all(pool.as_ref())
    .await?;

    if comments.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let ids: Vec<i64> = comments.iter().map(|c| c.id).collect();
    let rows = sqlx::query_as::<_, CommentReaction>(
        "SELECT comment_id, type, count FROM comment_reactions WHERE comment_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(pool.as_ref())
    .await?;

    let mut grouped = group_reactions(rows);
    let response = comments
        .into_iter()
        .map(|comment| CommentResponse {
            reactions: grouped.remove(&comment.id).unwrap_or_default(),
            comment,
        })
        .collect();

    Ok(Json(response))
}

/// POST /api/blogs/{id}/comments - Anyone may comment on a published post
pub async fn create_comment(
    headers: HeaderMap,
    Path(blog_id): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentResponse>)> {
    let blog_id = parse_id(&blog_id)?;
    let new_comment = payload.validate()?;

    let pool = db::pool()?;

    // Drafts only take comments from admins
    let blog: Option<(i32,)> =
        sqlx::query_as("SELECT 1 FROM blogs WHERE id = $1 AND (published = TRUE OR $2)")
            .bind(blog_id)
            .bind(is_admin(&headers))
            .fetch_optional(pool.as_ref())
            .await?;
    if blog.is_none() {
        return Err(ApiError::not_found("Blog post"));
    }

    let comment = sqlx::query_as::<_, Comment>(&format!(
        r#"
        INSERT INTO comments (blog_id, author_name, body, image_url, approved)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        COMMENT_COLUMNS
    ))
    .bind(blog_id)
    .bind(&new_comment.author_name)
    .bind(&new_comment.body)
    .bind(&new_comment.image_url)
    .bind(!CONFIG.comments_require_approval)
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!(
        comment_id = comment.id,
        blog_id,
        approved = comment.approved,
        "comment created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            comment,
            reactions: ReactionMap::new(),
        }),
    ))
}

/// PUT /api/blogs/comments/{commentId} - Approve or hide a comment (admin)
pub async fn moderate_comment(
    headers: HeaderMap,
    Path(comment_id): Path<String>,
    Json(payload): Json<ModerateCommentRequest>,
) -> ApiResult<Json<Comment>> {
    require_admin(&headers)?;
    let comment_id = parse_id(&comment_id)?;
    let pool = db::pool()?;

    let comment = sqlx::query_as::<_, Comment>(&format!(
        "UPDATE comments SET approved = COALESCE($2, approved) WHERE id = $1 RETURNING {}",
        COMMENT_COLUMNS
    ))
    .bind(comment_id)
    .bind(payload.approved)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Comment"))?;

    Ok(Json(comment))
}

/// DELETE /api/blogs/comments/{commentId} (admin)
pub async fn delete_comment(
    headers: HeaderMap,
    Path(comment_id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    require_admin(&headers)?;
    let comment_id = parse_id(&comment_id)?;
    let pool = db::pool()?;

    let result = sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(pool.as_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Comment"));
    }
    Ok(Json(OkResponse::ok()))
}

/// GET /api/blogs/comments/{commentId}/reactions
pub async fn list_reactions(Path(comment_id): Path<String>) -> ApiResult<Json<ReactionMap>> {
    let comment_id = parse_id(&comment_id)?;
    let pool = db::pool()?;
    Ok(Json(reactions_for(pool.as_ref(), comment_id).await?))
}

/// POST /api/blogs/comments/{commentId}/reactions - Bump one counter by exactly one
pub async fn add_reaction(
    headers: HeaderMap,
    Path(comment_id): Path<String>,
    Json(payload): Json<ReactionRequest>,
) -> ApiResult<Json<ReactionMap>> {
    let comment_id = parse_id(&comment_id)?;
    let kind = validate_reaction_type(payload.kind)?;
    let pool = db::pool()?;

    ensure_comment_exists(pool.as_ref(), comment_id).await?;

    sqlx::query(
        r#"
        INSERT INTO comment_reactions (comment_id, type, count)
        VALUES ($1, $2, 1)
        ON CONFLICT (comment_id, type) DO UPDATE SET count = comment_reactions.count + 1
        "#,
    )
    .bind(comment_id)
    .bind(&kind)
    .execute(pool.as_ref())
    .await?;

    tracing::debug!(
        comment_id,
        reaction = %kind,
        anon_id = get_cookie(&headers, ANON_COOKIE).as_deref().unwrap_or("-"),
        "reaction added"
    );

    Ok(Json(reactions_for(pool.as_ref(), comment_id).await?))
}
