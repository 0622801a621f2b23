//! Core types for Crosspost

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Identifier for a supported publishing target.
///
/// Every platform referenced by a connection, post, or queue entry is one
/// of these variants, so each one resolves to exactly one registry spec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Twitter,
    Mastodon,
    Linkedin,
    Facebook,
    Instagram,
}

impl PlatformId {
    pub const ALL: [PlatformId; 5] = [
        PlatformId::Twitter,
        PlatformId::Mastodon,
        PlatformId::Linkedin,
        PlatformId::Facebook,
        PlatformId::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::Twitter => "twitter",
            PlatformId::Mastodon => "mastodon",
            PlatformId::Linkedin => "linkedin",
            PlatformId::Facebook => "facebook",
            PlatformId::Instagram => "instagram",
        }
    }
}

impl std::str::FromStr for PlatformId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" => Ok(PlatformId::Twitter),
            "mastodon" => Ok(PlatformId::Mastodon),
            "linkedin" => Ok(PlatformId::Linkedin),
            "facebook" => Ok(PlatformId::Facebook),
            "instagram" => Ok(PlatformId::Instagram),
            _ => Err(ValidationError::UnknownPlatform(s.to_string())),
        }
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of content a post carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Poll,
    Story,
    Article,
    Carousel,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Poll => "poll",
            ContentKind::Story => "story",
            ContentKind::Article => "article",
            ContentKind::Carousel => "carousel",
        }
    }

    /// Kinds whose body must be non-empty at submission time
    pub fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            ContentKind::Text | ContentKind::Poll | ContentKind::Article
        )
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ContentKind::Text),
            "image" => Ok(ContentKind::Image),
            "video" => Ok(ContentKind::Video),
            "poll" => Ok(ContentKind::Poll),
            "story" => Ok(ContentKind::Story),
            "article" => Ok(ContentKind::Article),
            "carousel" => Ok(ContentKind::Carousel),
            _ => Err(format!("unknown content kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Media category, detected from the reference URL's extension
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// A reference to an already-hosted media asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaRef {
    /// Classify a media URL by its file extension.
    ///
    /// Returns `None` for extensions no platform accepts.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let ext = path.rsplit('.').next()?.to_lowercase();
        let kind = match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" => MediaKind::Image,
            "mp4" | "mov" | "webm" => MediaKind::Video,
            _ => return None,
        };
        Some(Self {
            url: url.to_string(),
            kind,
        })
    }
}

/// Lifecycle status of an authored post.
///
/// Once queue entries exist the status is derived from them and never
/// written independently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Queued,
    PartiallyPublished,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Queued => "queued",
            PostStatus::PartiallyPublished => "partially_published",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PostStatus::Draft),
            "scheduled" => Some(PostStatus::Scheduled),
            "queued" => Some(PostStatus::Queued),
            "partially_published" => Some(PostStatus::PartiallyPublished),
            "published" => Some(PostStatus::Published),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub account_id: String,
    pub content: String,
    pub platforms: Vec<PlatformId>,
    pub created_at: i64,
    pub scheduled_at: Option<i64>,
    pub status: PostStatus,
    pub media: Vec<MediaRef>,
    pub hashtags: Vec<String>,
    pub content_kind: ContentKind,
}

impl Post {
    pub fn new(account_id: String, content: String, platforms: Vec<PlatformId>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id,
            content,
            platforms,
            created_at: chrono::Utc::now().timestamp(),
            scheduled_at: None,
            status: PostStatus::Draft,
            media: Vec::new(),
            hashtags: Vec::new(),
            content_kind: ContentKind::Text,
        }
    }
}

/// Lifecycle status of a single platform publish job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    Abandoned,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::InFlight => "in_flight",
            EntryStatus::Succeeded => "succeeded",
            EntryStatus::Failed => "failed",
            EntryStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryStatus::Pending),
            "in_flight" => Some(EntryStatus::InFlight),
            "succeeded" => Some(EntryStatus::Succeeded),
            "failed" => Some(EntryStatus::Failed),
            "abandoned" => Some(EntryStatus::Abandoned),
            _ => None,
        }
    }

    /// Terminal statuses admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntryStatus::Succeeded | EntryStatus::Failed | EntryStatus::Abandoned
        )
    }
}

/// One platform publish job, fanned out from a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub post_id: String,
    pub platform: PlatformId,
    pub process_after: i64,
    pub status: EntryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub platform_post_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Status of a stored platform connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Expired,
    Inactive,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Expired => "expired",
            ConnectionStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ConnectionStatus::Active),
            "expired" => Some(ConnectionStatus::Expired),
            "inactive" => Some(ConnectionStatus::Inactive),
            _ => None,
        }
    }
}

/// A stored credential for one (account, platform) pair.
///
/// Owned by the connection manager; the dispatcher only reads it.
/// Rows are never deleted so publish history stays attributable.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: i64,
    pub account_id: String,
    pub platform: PlatformId,
    pub external_id: String,
    pub handle: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scope: String,
    pub status: ConnectionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Connection {
    /// Whether the access token expires within `margin_secs` of `now`
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(exp) => exp - now <= margin_secs,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_platform_id_round_trip() {
        for platform in PlatformId::ALL {
            let parsed = PlatformId::from_str(platform.as_str()).unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn test_platform_id_case_insensitive() {
        assert_eq!(
            PlatformId::from_str("Twitter").unwrap(),
            PlatformId::Twitter
        );
        assert_eq!(
            PlatformId::from_str("MASTODON").unwrap(),
            PlatformId::Mastodon
        );
    }

    #[test]
    fn test_platform_id_unknown() {
        let result = PlatformId::from_str("friendster");
        assert!(matches!(
            result,
            Err(ValidationError::UnknownPlatform(ref s)) if s == "friendster"
        ));
    }

    #[test]
    fn test_platform_id_serde_lowercase() {
        let json = serde_json::to_string(&PlatformId::Linkedin).unwrap();
        assert_eq!(json, r#""linkedin""#);

        let parsed: PlatformId = serde_json::from_str(r#""instagram""#).unwrap();
        assert_eq!(parsed, PlatformId::Instagram);
    }

    #[test]
    fn test_content_kind_text_bearing() {
        assert!(ContentKind::Text.is_text_bearing());
        assert!(ContentKind::Poll.is_text_bearing());
        assert!(ContentKind::Article.is_text_bearing());
        assert!(!ContentKind::Image.is_text_bearing());
        assert!(!ContentKind::Carousel.is_text_bearing());
    }

    #[test]
    fn test_media_ref_image_extensions() {
        for url in [
            "https://cdn.example.com/a.jpg",
            "https://cdn.example.com/b.PNG",
            "https://cdn.example.com/c.webp?sig=abc",
        ] {
            let media = MediaRef::from_url(url).unwrap();
            assert_eq!(media.kind, MediaKind::Image, "for {}", url);
        }
    }

    #[test]
    fn test_media_ref_video_extensions() {
        let media = MediaRef::from_url("https://cdn.example.com/clip.mp4").unwrap();
        assert_eq!(media.kind, MediaKind::Video);
    }

    #[test]
    fn test_media_ref_unknown_extension() {
        assert!(MediaRef::from_url("https://cdn.example.com/doc.pdf").is_none());
        assert!(MediaRef::from_url("https://cdn.example.com/no-extension").is_none());
    }

    #[test]
    fn test_post_status_round_trip() {
        for status in [
            PostStatus::Draft,
            PostStatus::Scheduled,
            PostStatus::Queued,
            PostStatus::PartiallyPublished,
            PostStatus::Published,
            PostStatus::Failed,
        ] {
            assert_eq!(PostStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PostStatus::parse("bogus"), None);
    }

    #[test]
    fn test_entry_status_terminal() {
        assert!(EntryStatus::Succeeded.is_terminal());
        assert!(EntryStatus::Abandoned.is_terminal());
        assert!(EntryStatus::Failed.is_terminal());
        assert!(!EntryStatus::Pending.is_terminal());
        assert!(!EntryStatus::InFlight.is_terminal());
    }

    #[test]
    fn test_entry_status_round_trip() {
        for status in [
            EntryStatus::Pending,
            EntryStatus::InFlight,
            EntryStatus::Succeeded,
            EntryStatus::Failed,
            EntryStatus::Abandoned,
        ] {
            assert_eq!(EntryStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_post_new_defaults() {
        let post = Post::new(
            "acct-1".to_string(),
            "hello".to_string(),
            vec![PlatformId::Twitter],
        );

        assert!(Uuid::parse_str(&post.id).is_ok());
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.scheduled_at, None);
        assert!(post.media.is_empty());
        assert!(post.hashtags.is_empty());
    }

    #[test]
    fn test_connection_expires_within() {
        let mut conn = Connection {
            id: 1,
            account_id: "acct-1".to_string(),
            platform: PlatformId::Twitter,
            external_id: "12345".to_string(),
            handle: "@tester".to_string(),
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: Some(1_000_000),
            scope: "tweet.write".to_string(),
            status: ConnectionStatus::Active,
            created_at: 0,
            updated_at: 0,
        };

        // 400 seconds to expiry, 300 second margin: still fresh
        assert!(!conn.expires_within(999_600, 300));
        // 200 seconds to expiry: inside the margin
        assert!(conn.expires_within(999_800, 300));
        // already expired
        assert!(conn.expires_within(1_000_100, 300));

        // tokens without expiry never need a refresh
        conn.expires_at = None;
        assert!(!conn.expires_within(999_800, 300));
    }
}
