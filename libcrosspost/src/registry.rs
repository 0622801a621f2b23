//! Compiled-in platform capability registry
//!
//! Each platform's content constraints live in one static table consumed by
//! the fan-out validator and the publish clients. Violations are hard
//! failures naming the platform and constraint; content is never trimmed to
//! fit.

use crate::error::ValidationError;
use crate::types::{ContentKind, MediaKind, MediaRef, PlatformId};

/// Immutable capability record for one platform
#[derive(Debug, Clone, Copy)]
pub struct PlatformSpec {
    pub id: PlatformId,
    pub max_chars: usize,
    pub max_images: usize,
    pub max_videos: usize,
    pub kinds: &'static [ContentKind],
    pub requires_media: bool,
}

use ContentKind::{Article, Carousel, Image, Poll, Story, Text, Video};

static SPECS: [PlatformSpec; 5] = [
    PlatformSpec {
        id: PlatformId::Twitter,
        max_chars: 280,
        max_images: 4,
        max_videos: 1,
        kinds: &[Text, Image, Video, Poll],
        requires_media: false,
    },
    PlatformSpec {
        id: PlatformId::Mastodon,
        max_chars: 500,
        max_images: 4,
        max_videos: 1,
        kinds: &[Text, Image, Video, Poll],
        requires_media: false,
    },
    PlatformSpec {
        id: PlatformId::Linkedin,
        max_chars: 3000,
        max_images: 9,
        max_videos: 1,
        kinds: &[Text, Image, Video, Article, Poll],
        requires_media: false,
    },
    PlatformSpec {
        id: PlatformId::Facebook,
        max_chars: 63206,
        max_images: 10,
        max_videos: 1,
        kinds: &[Text, Image, Video, Story, Carousel],
        requires_media: false,
    },
    PlatformSpec {
        id: PlatformId::Instagram,
        max_chars: 2200,
        max_images: 10,
        max_videos: 1,
        kinds: &[Image, Video, Story, Carousel],
        requires_media: true,
    },
];

impl PlatformId {
    /// Look up the capability spec for this platform
    pub fn spec(self) -> &'static PlatformSpec {
        // SPECS is ordered to match PlatformId::ALL; the test below keeps
        // the two in lockstep.
        &SPECS[self as usize]
    }
}

/// Check content length against the platform's character limit.
///
/// Length is counted in characters, not bytes.
pub fn validate_length(content: &str, platform: PlatformId) -> Result<(), ValidationError> {
    let spec = platform.spec();
    let actual = content.chars().count();
    if actual > spec.max_chars {
        return Err(ValidationError::TooLong {
            platform,
            limit: spec.max_chars,
            actual,
        });
    }
    Ok(())
}

/// Check media counts and content kind against the platform's capabilities
pub fn validate_media_and_kind(
    media: &[MediaRef],
    kind: ContentKind,
    platform: PlatformId,
) -> Result<(), ValidationError> {
    let spec = platform.spec();

    if !spec.kinds.contains(&kind) {
        return Err(ValidationError::UnsupportedContent { platform, kind });
    }

    if spec.requires_media && media.is_empty() {
        return Err(ValidationError::MediaRequired { platform });
    }

    let images = media.iter().filter(|m| m.kind == MediaKind::Image).count();
    if images > spec.max_images {
        return Err(ValidationError::TooManyImages {
            platform,
            limit: spec.max_images,
            actual: images,
        });
    }

    let videos = media.iter().filter(|m| m.kind == MediaKind::Video).count();
    if videos > spec.max_videos {
        return Err(ValidationError::TooManyVideos {
            platform,
            limit: spec.max_videos,
            actual: videos,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_total() {
        // Every platform variant resolves to a spec for itself
        for platform in PlatformId::ALL {
            assert_eq!(platform.spec().id, platform);
        }
    }

    #[test]
    fn test_validate_length_at_boundary() {
        let exactly = "a".repeat(280);
        assert!(validate_length(&exactly, PlatformId::Twitter).is_ok());

        let over = "a".repeat(281);
        let err = validate_length(&over, PlatformId::Twitter).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLong {
                platform: PlatformId::Twitter,
                limit: 280,
                actual: 281,
            }
        );
    }

    #[test]
    fn test_validate_length_counts_chars_not_bytes() {
        // 280 multi-byte characters are within the limit even though the
        // byte count is far larger
        let content = "é".repeat(280);
        assert!(content.len() > 280);
        assert!(validate_length(&content, PlatformId::Twitter).is_ok());
    }

    #[test]
    fn test_validate_length_longer_platforms() {
        let content = "a".repeat(500);
        assert!(validate_length(&content, PlatformId::Mastodon).is_ok());
        assert!(validate_length(&content, PlatformId::Linkedin).is_ok());
        assert!(validate_length(&content, PlatformId::Twitter).is_err());
    }

    #[test]
    fn test_unsupported_kind() {
        let err =
            validate_media_and_kind(&[], ContentKind::Poll, PlatformId::Instagram).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedContent { .. }));

        let err =
            validate_media_and_kind(&[], ContentKind::Carousel, PlatformId::Twitter).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedContent { .. }));
    }

    #[test]
    fn test_instagram_requires_media() {
        let err =
            validate_media_and_kind(&[], ContentKind::Image, PlatformId::Instagram).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MediaRequired {
                platform: PlatformId::Instagram
            }
        );

        let media = vec![MediaRef::from_url("https://cdn.example.com/a.jpg").unwrap()];
        assert!(validate_media_and_kind(&media, ContentKind::Image, PlatformId::Instagram).is_ok());
    }

    #[test]
    fn test_image_count_limit() {
        let media: Vec<MediaRef> = (0..5)
            .map(|i| MediaRef::from_url(&format!("https://cdn.example.com/{}.png", i)).unwrap())
            .collect();

        let err = validate_media_and_kind(&media, ContentKind::Image, PlatformId::Twitter)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooManyImages {
                platform: PlatformId::Twitter,
                limit: 4,
                actual: 5,
            }
        );

        // Facebook allows up to 10 images
        assert!(validate_media_and_kind(&media, ContentKind::Image, PlatformId::Facebook).is_ok());
    }

    #[test]
    fn test_video_count_limit() {
        let media = vec![
            MediaRef::from_url("https://cdn.example.com/a.mp4").unwrap(),
            MediaRef::from_url("https://cdn.example.com/b.mp4").unwrap(),
        ];

        let err =
            validate_media_and_kind(&media, ContentKind::Video, PlatformId::Twitter).unwrap_err();
        assert!(matches!(err, ValidationError::TooManyVideos { .. }));
    }

    #[test]
    fn test_text_post_without_media_passes() {
        for platform in [
            PlatformId::Twitter,
            PlatformId::Mastodon,
            PlatformId::Linkedin,
            PlatformId::Facebook,
        ] {
            assert!(
                validate_media_and_kind(&[], ContentKind::Text, platform).is_ok(),
                "text should be fine on {}",
                platform
            );
        }
    }
}
