use crate::model::{
    Id,
    account::{Account, AccountMarker},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::UtcDateTime;

pub const POST_CONTENT_MAX_LEN: usize = 2000;
pub const IMAGE_URL_MAX_LEN: usize = 2048;
pub const MAX_POST_IMAGES: usize = 4;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostImageMarker;

/// A post. Posts without a parent are top-level; the others are comments.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author_id: Id<AccountMarker>,
    pub parent_id: Option<Id<PostMarker>>,
    pub content: PostContent,
    #[serde(with = "crate::util::rfc3339")]
    pub created_at: UtcDateTime,
}

impl Post {
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct PostImage {
    pub id: Id<PostImageMarker>,
    pub post_id: Id<PostMarker>,
    pub url: ImageUrl,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub author: Id<AccountMarker>,
    pub parent: Option<Id<PostMarker>>,
    pub content: PostContent,
    pub image_urls: PostImageUrls,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Deserialize, Serialize)]
pub struct ActivityCounts {
    pub likes: u64,
    pub comments: u64,
    pub bookmarks: u64,
}

/// Weights of the activity score in tenths of a point. The defaults rank comments above likes
/// above bookmarks.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
pub struct ActivityWeights {
    pub like: u32,
    pub comment: u32,
    pub bookmark: u32,
}

impl Default for ActivityWeights {
    fn default() -> Self {
        Self {
            like: 7,
            comment: 8,
            bookmark: 5,
        }
    }
}

impl ActivityCounts {
    /// The exact score in tenths. Feeds are ordered by this.
    #[must_use]
    pub fn rank(self, weights: &ActivityWeights) -> u64 {
        let weigh = |count: u64, weight: u32| count.saturating_mul(u64::from(weight));
        weigh(self.likes, weights.like)
            .saturating_add(weigh(self.comments, weights.comment))
            .saturating_add(weigh(self.bookmarks, weights.bookmark))
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(self, weights: &ActivityWeights) -> f64 {
        self.rank(weights) as f64 / 10.0
    }
}

/// A post as it appears in feeds and listings.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct PostWithActivity {
    #[serde(flatten)]
    pub post: Post,
    pub author: Account,
    pub images: Vec<PostImage>,
    pub activity: ActivityCounts,
    pub score: f64,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct PostContent(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Post content must be between 1 and 2000 characters after trimming")]
pub struct InvalidPostContentError(String);

impl PostContent {
    pub fn new(content: String) -> Result<Self, InvalidPostContentError> {
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed.chars().count() > POST_CONTENT_MAX_LEN {
            return Err(InvalidPostContentError(content));
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for PostContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostContent::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"PostContent"))
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct ImageUrl(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Not an http(s) image url: {0:?}")]
pub struct InvalidImageUrlError(String);

impl ImageUrl {
    pub fn new(url: String) -> Result<Self, InvalidImageUrlError> {
        let valid_scheme = url.starts_with("https://") || url.starts_with("http://");
        if !valid_scheme || url.len() > IMAGE_URL_MAX_LEN || url.contains(char::is_whitespace) {
            return Err(InvalidImageUrlError(url));
        }
        Ok(Self(url))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ImageUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        ImageUrl::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"ImageUrl"))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("A post carries at most 4 images, got {0}")]
pub struct TooManyImagesError(usize);

/// The image urls attached to a new post.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct PostImageUrls(Vec<ImageUrl>);

impl PostImageUrls {
    pub fn new(urls: Vec<ImageUrl>) -> Result<Self, TooManyImagesError> {
        if urls.len() > MAX_POST_IMAGES {
            return Err(TooManyImagesError(urls.len()));
        }
        Ok(Self(urls))
    }

    #[must_use]
    pub fn get(&self) -> &[ImageUrl] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<ImageUrl> {
        self.0
    }
}

impl<'de> Deserialize<'de> for PostImageUrls {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = Vec::<ImageUrl>::deserialize(deserializer)?;
        PostImageUrls::new(inner).map_err(|err| Error::invalid_length(err.0, &"at most 4 images"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::post::{
        ActivityCounts, ActivityWeights, ImageUrl, PostContent, PostImageUrls,
    };

    #[test]
    fn content_is_trimmed_and_non_empty() {
        assert_eq!(PostContent::new("  hi \n".to_owned()).unwrap().get(), "hi");
        assert!(PostContent::new(" \t\n".to_owned()).is_err());
        assert!(PostContent::new("a".repeat(2001)).is_err());
    }

    #[test]
    fn image_urls() {
        assert!(ImageUrl::new("https://cdn.example.org/a.png".to_owned()).is_ok());
        assert!(ImageUrl::new("ftp://cdn.example.org/a.png".to_owned()).is_err());
        assert!(ImageUrl::new("https://a b".to_owned()).is_err());

        let url = ImageUrl::new("http://x.org/1".to_owned()).unwrap();
        assert!(PostImageUrls::new(vec![url.clone(); 4]).is_ok());
        assert!(PostImageUrls::new(vec![url; 5]).is_err());
        assert!(serde_json::from_str::<PostImageUrls>(r#"["http://x.org/1"]"#).is_ok());
    }

    #[test]
    fn weighted_score() {
        let weights = ActivityWeights::default();
        let commented = ActivityCounts {
            likes: 1,
            comments: 2,
            bookmarks: 1,
        };
        let liked = ActivityCounts {
            likes: 2,
            comments: 0,
            bookmarks: 2,
        };
        assert!((commented.score(&weights) - 2.8).abs() < 1e-9);
        assert!((liked.score(&weights) - 2.4).abs() < 1e-9);
        assert!(ActivityCounts::default().score(&weights).abs() < f64::EPSILON);
    }

    #[test]
    fn equal_scores_rank_equal() {
        let weights = ActivityWeights::default();
        let eight_likes = ActivityCounts {
            likes: 8,
            ..ActivityCounts::default()
        };
        let seven_comments = ActivityCounts {
            comments: 7,
            ..ActivityCounts::default()
        };

        assert_eq!(eight_likes.rank(&weights), 56);
        assert_eq!(seven_comments.rank(&weights), 56);
        assert_eq!(eight_likes.score(&weights), seven_comments.score(&weights));
    }
}
