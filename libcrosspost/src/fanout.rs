//! Post submission and fan-out
//!
//! One authored post becomes one queue entry per target platform. The whole
//! submission validates against the registry up front and persists
//! atomically: a post that fails validation for any single target creates
//! nothing at all.

use tracing::info;

use crate::db::Database;
use crate::error::{Result, ValidationError};
use crate::registry;
use crate::types::{ContentKind, MediaRef, PlatformId, Post, PostStatus};

/// An authored post as submitted by the operator
#[derive(Debug, Clone)]
pub struct NewPostRequest {
    pub account_id: String,
    pub content: String,
    pub platforms: Vec<PlatformId>,
    pub scheduled_at: Option<i64>,
    pub media: Vec<MediaRef>,
    pub hashtags: Vec<String>,
    pub content_kind: ContentKind,
}

/// Validate the request against every target platform.
///
/// Fails on the first violation, which names the platform and constraint.
pub fn validate(request: &NewPostRequest) -> std::result::Result<(), ValidationError> {
    if request.platforms.is_empty() {
        return Err(ValidationError::NoTargetPlatforms);
    }

    if request.content_kind.is_text_bearing() && request.content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }

    for &platform in &request.platforms {
        registry::validate_length(&request.content, platform)?;
        registry::validate_media_and_kind(&request.media, request.content_kind, platform)?;
    }

    Ok(())
}

/// Validate, persist, and fan out a post.
///
/// The post lands `scheduled` when `scheduled_at` is in the future,
/// `queued` otherwise; either way every entry gets a `process_after` the
/// dispatch loop treats uniformly.
pub async fn submit(db: &Database, request: NewPostRequest) -> Result<Post> {
    validate(&request)?;

    // a platform listed twice still yields one entry
    let mut platforms: Vec<PlatformId> = Vec::new();
    for platform in request.platforms {
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }

    let now = chrono::Utc::now().timestamp();
    let (status, process_after) = match request.scheduled_at {
        Some(at) if at > now => (PostStatus::Scheduled, at),
        _ => (PostStatus::Queued, now),
    };

    let mut post = Post::new(request.account_id, request.content, platforms);
    post.scheduled_at = request.scheduled_at;
    post.status = status;
    post.media = request.media;
    post.hashtags = request.hashtags;
    post.content_kind = request.content_kind;

    db.create_post_with_entries(&post, process_after).await?;

    info!(
        post_id = %post.id,
        platforms = post.platforms.len(),
        status = post.status.as_str(),
        "post submitted"
    );
    Ok(post)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryStatus;
    use tempfile::TempDir;

    async fn test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (db, temp_dir)
    }

    fn request(platforms: Vec<PlatformId>) -> NewPostRequest {
        NewPostRequest {
            account_id: "acct-1".to_string(),
            content: "hello".to_string(),
            platforms,
            scheduled_at: None,
            media: vec![],
            hashtags: vec![],
            content_kind: ContentKind::Text,
        }
    }

    #[tokio::test]
    async fn test_immediate_submission_is_queued() {
        let (db, _dir) = test_db().await;
        let before = chrono::Utc::now().timestamp();

        let post = submit(&db, request(vec![PlatformId::Twitter])).await.unwrap();
        assert_eq!(post.status, PostStatus::Queued);

        let entries = db.entries_for_post(&post.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Pending);
        // immediately eligible: process_after is "now", not a special case
        assert!(entries[0].process_after >= before);
        assert!(entries[0].process_after <= chrono::Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_scheduled_submission() {
        let (db, _dir) = test_db().await;
        let future = chrono::Utc::now().timestamp() + 3600;

        let mut req = request(vec![PlatformId::Twitter]);
        req.scheduled_at = Some(future);
        let post = submit(&db, req).await.unwrap();

        assert_eq!(post.status, PostStatus::Scheduled);
        let entries = db.entries_for_post(&post.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].process_after, future);
        assert_eq!(entries[0].status, EntryStatus::Pending);
    }

    #[tokio::test]
    async fn test_past_schedule_is_queued_immediately() {
        let (db, _dir) = test_db().await;
        let past = chrono::Utc::now().timestamp() - 3600;

        let mut req = request(vec![PlatformId::Twitter]);
        req.scheduled_at = Some(past);
        let post = submit(&db, req).await.unwrap();

        assert_eq!(post.status, PostStatus::Queued);
    }

    #[tokio::test]
    async fn test_fan_out_one_entry_per_platform() {
        let (db, _dir) = test_db().await;
        let targets = vec![
            PlatformId::Twitter,
            PlatformId::Mastodon,
            PlatformId::Linkedin,
        ];

        let post = submit(&db, request(targets.clone())).await.unwrap();

        let entries = db.entries_for_post(&post.id).await.unwrap();
        assert_eq!(entries.len(), targets.len());
        let mut platforms: Vec<PlatformId> = entries.iter().map(|e| e.platform).collect();
        platforms.sort();
        let mut expected = targets.clone();
        expected.sort();
        assert_eq!(platforms, expected);
        assert!(entries.iter().all(|e| e.post_id == post.id));
    }

    #[tokio::test]
    async fn test_duplicate_platforms_collapse() {
        let (db, _dir) = test_db().await;

        let post = submit(
            &db,
            request(vec![PlatformId::Twitter, PlatformId::Twitter]),
        )
        .await
        .unwrap();

        assert_eq!(post.platforms, vec![PlatformId::Twitter]);
        assert_eq!(db.entries_for_post(&post.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_platforms_rejected() {
        let (db, _dir) = test_db().await;

        let result = submit(&db, request(vec![])).await;
        assert!(matches!(
            result,
            Err(crate::error::CrosspostError::Validation(
                ValidationError::NoTargetPlatforms
            ))
        ));
    }

    #[tokio::test]
    async fn test_empty_content_rejected_for_text() {
        let (db, _dir) = test_db().await;

        let mut req = request(vec![PlatformId::Twitter]);
        req.content = "   ".to_string();
        let result = submit(&db, req).await;
        assert!(matches!(
            result,
            Err(crate::error::CrosspostError::Validation(
                ValidationError::EmptyContent
            ))
        ));
    }

    #[tokio::test]
    async fn test_validation_failure_is_atomic() {
        let (db, _dir) = test_db().await;

        // 400 characters: within mastodon's 500 limit, over twitter's 280
        let mut req = request(vec![PlatformId::Mastodon, PlatformId::Twitter]);
        req.content = "a".repeat(400);

        let result = submit(&db, req).await;
        match result {
            Err(crate::error::CrosspostError::Validation(ValidationError::TooLong {
                platform,
                ..
            })) => assert_eq!(platform, PlatformId::Twitter),
            other => panic!("expected TooLong for twitter, got {:?}", other.err()),
        }

        // nothing was created for either platform
        assert!(db.list_posts("acct-1", 10).await.unwrap().is_empty());
        assert_eq!(db.queue_stats().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_media_validation_applies_per_platform() {
        let (db, _dir) = test_db().await;

        let mut req = request(vec![PlatformId::Instagram]);
        req.content_kind = ContentKind::Image;
        // no media: instagram requires it
        let result = submit(&db, req.clone()).await;
        assert!(matches!(
            result,
            Err(crate::error::CrosspostError::Validation(
                ValidationError::MediaRequired { .. }
            ))
        ));

        req.media = vec![MediaRef::from_url("https://cdn.example.com/a.jpg").unwrap()];
        assert!(submit(&db, req).await.is_ok());
    }

    #[test]
    fn test_validate_names_offending_platform() {
        let mut req = request(vec![PlatformId::Twitter]);
        req.content_kind = ContentKind::Carousel;

        let err = validate(&req).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedContent {
                platform: PlatformId::Twitter,
                kind: ContentKind::Carousel,
            }
        );
    }
}
