/**
 * Profile Routes
 * The site owner's public profile (single row)
 */
use axum::{http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

use crate::db::{self, models::Profile};
use crate::error::ApiResult;
use crate::routes::auth::require_admin;

const PROFILE_COLUMNS: &str =
    "id, display_name, title, bio, avatar_url, social_links, education, expertise, profile_summary";

/// Request body for PUT /api/profile. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: Option<serde_json::Value>,
    pub education: Option<String>,
    pub expertise: Option<String>,
    pub profile_summary: Option<String>,
}

/// GET /api/profile - The profile, or `null` before it is first saved
pub async fn get_profile() -> ApiResult<Json<Option<Profile>>> {
    let pool = db::pool()?;

    let profile = sqlx::query_as::<_, Profile>(&format!(
        "SELECT {} FROM profile WHERE id = 1",
        PROFILE_COLUMNS
    ))
    .fetch_optional(pool.as_ref())
    .await?;

    Ok(Json(profile))
}

/// PUT /api/profile - Upsert (admin)
pub async fn update_profile(
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    require_admin(&headers)?;
    let pool = db::pool()?;

    let profile = sqlx::query_as::<_, Profile>(&format!(
        r#"
        INSERT INTO profile (id, display_name, title, bio, avatar_url, social_links, education, expertise, profile_summary)
        VALUES (1, $1, $2, $3, $4, COALESCE($5, '{{}}'::jsonb), $6, $7, $8)
        ON CONFLICT (id) DO UPDATE SET
            display_name = COALESCE($1, profile.display_name),
            title = COALESCE($2, profile.title),
            bio = COALESCE($3, profile.bio),
            avatar_url = COALESCE($4, profile.avatar_url),
            social_links = COALESCE($5, profile.social_links),
            education = COALESCE($6, profile.education),
            expertise = COALESCE($7, profile.expertise),
            profile_summary = COALESCE($8, profile.profile_summary)
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(&payload.display_name)
    .bind(&payload.title)
    .bind(&payload.bio)
    .bind(&payload.avatar_url)
    .bind(&payload.social_links)
    .bind(&payload.education)
    .bind(&payload.expertise)
    .bind(&payload.profile_summary)
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!("profile updated");
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::auth::tests::{admin_user, bearer_for, guest_user};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new().route("/api/profile", get(get_profile).put(update_profile))
    }

    fn put(auth: Option<String>) -> Request<Body> {
        let mut req = Request::put("/api/profile").header("content-type", "application/json");
        if let Some(auth) = auth {
            req = req.header("authorization", auth);
        }
        req.body(Body::from(r#"{"display_name":"Ada"}"#)).unwrap()
    }

    #[test]
    fn test_update_request_fields_are_optional() {
        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{"bio":"hi","social_links":{"github":"ada"}}"#).unwrap();
        assert_eq!(req.bio.as_deref(), Some("hi"));
        assert!(req.display_name.is_none());
        assert_eq!(req.social_links.unwrap()["github"], "ada");
    }

    #[tokio::test]
    async fn test_update_profile_auth_order() {
        let res = app().oneshot(put(None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app().oneshot(put(Some(bearer_for(&guest_user())))).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app().oneshot(put(Some(bearer_for(&admin_user())))).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_get_profile_without_database() {
        let req = Request::get("/api/profile").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
