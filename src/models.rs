use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::UnknownCategory;

/// Reading-time label used whenever a post does not carry its own.
pub const DEFAULT_READ_TIME: &str = "5 min read";

// --- Core Content Schemas (Mapped to Database) ---

/// Category
///
/// The fixed set of content categories offered by the admin form. Serialized (and stored in
/// the `posts.category` text column) using the display label, e.g. `"The Rabbit Hole"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub enum Category {
    #[default]
    #[serde(rename = "The Rabbit Hole")]
    RabbitHole,
    #[serde(rename = "Midnight Snacks")]
    MidnightSnacks,
    #[serde(rename = "Blue Light")]
    BlueLight,
    #[serde(rename = "Brain Fog")]
    BrainFog,
    Culture,
    Tech,
    Mystery,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::RabbitHole,
        Category::MidnightSnacks,
        Category::BlueLight,
        Category::BrainFog,
        Category::Culture,
        Category::Tech,
        Category::Mystery,
    ];

    /// The label shown to readers and persisted in the database.
    pub fn label(&self) -> &'static str {
        match self {
            Category::RabbitHole => "The Rabbit Hole",
            Category::MidnightSnacks => "Midnight Snacks",
            Category::BlueLight => "Blue Light",
            Category::BrainFog => "Brain Fog",
            Category::Culture => "Culture",
            Category::Tech => "Tech",
            Category::Mystery => "Mystery",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Lets sqlx decode the text column straight into the enum (`#[sqlx(try_from = "String")]`).
impl TryFrom<String> for Category {
    type Error = UnknownCategory;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Post
///
/// A row of the `public.posts` table. Created, edited and deleted only through the admin
/// editor; every other surface reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    // Unique, human-readable identifier used in URLs.
    pub slug: String,
    #[sqlx(try_from = "String")]
    pub category: Category,
    // Cover image reference (absolute URL).
    pub image_url: Option<String>,
    pub excerpt: Option<String>,
    // Full body text (markdown or plain text).
    pub content: Option<String>,
    pub reading_time: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub views: i32,
}

/// --- Editor Payloads (Input Schemas) ---

/// PostDraft
///
/// The admin editor's local draft. "New" and "edit" differ only by whether `id` is present:
/// a draft carrying an `id` is saved as an update of that row, otherwise it is inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_reading_time")]
    pub reading_time: String,
}

fn default_reading_time() -> String {
    DEFAULT_READ_TIME.to_string()
}

impl Default for PostDraft {
    fn default() -> Self {
        Self {
            id: None,
            title: String::new(),
            slug: String::new(),
            category: Category::default(),
            image_url: String::new(),
            excerpt: String::new(),
            content: String::new(),
            reading_time: default_reading_time(),
        }
    }
}

impl From<&Post> for PostDraft {
    /// Loads an existing row into the editor ("edit" mode).
    fn from(post: &Post) -> Self {
        Self {
            id: Some(post.id),
            title: post.title.clone(),
            slug: post.slug.clone(),
            category: post.category,
            image_url: post.image_url.clone().unwrap_or_default(),
            excerpt: post.excerpt.clone().unwrap_or_default(),
            content: post.content.clone().unwrap_or_default(),
            reading_time: post
                .reading_time
                .clone()
                .unwrap_or_else(default_reading_time),
        }
    }
}

/// --- Landing View Schemas (Output) ---

/// StoryCard
///
/// A post as the landing page shows it, either in the featured slot or the quick grid.
/// Field names follow the view, not the table (`image_url` -> `image`, `reading_time` -> `read_time`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StoryCard {
    pub title: String,
    pub slug: String,
    pub category: Category,
    pub image: String,
    pub excerpt: String,
    pub read_time: String,
}

impl From<Post> for StoryCard {
    fn from(post: Post) -> Self {
        let read_time = post
            .reading_time
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(default_reading_time);

        Self {
            title: post.title,
            slug: post.slug,
            category: post.category,
            image: post.image_url.unwrap_or_default(),
            excerpt: post.excerpt.unwrap_or_default(),
            read_time,
        }
    }
}

/// Where a landing slot's current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SlotSource {
    Live,
    Fallback,
}

/// LandingSnapshot
///
/// The complete landing payload (GET /api/landing). Both slots are always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LandingSnapshot {
    pub featured: StoryCard,
    pub featured_source: SlotSource,
    pub quick: Vec<StoryCard>,
    pub quick_source: SlotSource,
    /// Cosmetic counter bumped on every realtime notification.
    pub active_readers: u64,
    #[ts(type = "string")]
    pub refreshed_at: DateTime<Utc>,
}

/// --- Identity Schemas ---

/// Session
///
/// The caller's authenticated identity, as reported by the identity provider.
/// The raw access token is kept for re-evaluation but never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Session {
    pub user_id: Uuid,
    pub email: Option<String>,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub access_token: String,
}

/// SignInRequest
///
/// Input payload for the sign-in form (POST /auth/login). The password is forwarded to
/// the identity provider and never stored or logged.
#[derive(Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// SessionResponse
///
/// Returned on a successful sign-in. The same token is also set as an HttpOnly cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: String,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
    pub user: Session,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            access_token: session.access_token.clone(),
            token_type: "bearer".to_string(),
            expires_at: session.expires_at,
            user: session,
        }
    }
}
