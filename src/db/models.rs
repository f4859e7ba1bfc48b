//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// Site owner profile (singleton row, id = 1)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub id: i32,
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: serde_json::Value,
    pub education: Option<String>,
    pub expertise: Option<String>,
    pub profile_summary: Option<String>,
}

/// Curriculum vitae (singleton row, id = 1)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Cv {
    pub id: i32,
    pub summary: Option<String>,
    pub education: serde_json::Value,
    pub experience: serde_json::Value,
    pub skills: serde_json::Value,
    pub certifications: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Project model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub repo_url: Option<String>,
    pub demo_url: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Blog post model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Blog {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content_md: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Blog comment model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub blog_id: i64,
    pub author_name: String,
    pub body: String,
    pub image_url: Option<String>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// One reaction counter row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CommentReaction {
    pub comment_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub count: i64,
}

/// Calendar event model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub ref_type: Option<String>,
    pub ref_id: Option<i64>,
}

/// Activity tracker day
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityDay {
    pub date: NaiveDate,
    pub active: bool,
}

/// Quote model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quote {
    pub id: i64,
    pub text: String,
    pub author: Option<String>,
}
