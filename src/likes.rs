//! Removing likes from posts, photos and videos.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vk_client::api::{ApiClient, HttpTransport, RateLimiter};
//! use vk_client::auth::Credential;
//! use vk_client::config::ClientConfig;
//! use vk_client::likes::{LikeTarget, Unliker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let client = ApiClient::new(
//!     config.api_endpoint()?,
//!     Arc::new(RateLimiter::new(config.rate_limit)),
//!     Arc::new(HttpTransport::new()),
//! )
//! .with_credential(Credential::new("token", None, 1));
//!
//! let unliker = Unliker::new(&client);
//! let remaining = unliker
//!     .unlike(&CancellationToken::new(), &LikeTarget::Post { id: 42, owner_id: -1 })
//!     .await?;
//! println!("{remaining} likes left");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::api::{
    ApiClient, ApiError, Caller, ItemsPage, QueryOption, with_number, with_param,
};

const UNLIKE_METHOD: &str = "likes.delete";

/// Kind of likeable object, as named by the `type` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LikeKind {
    /// A wall post.
    Post,
    /// A photo.
    Photo,
    /// A video.
    Video,
}

impl LikeKind {
    /// Every kind, in the order liked objects are walked.
    pub const ALL: [Self; 3] = [Self::Post, Self::Photo, Self::Video];

    /// The wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }

    /// Method listing the current user's liked objects of this kind.
    #[must_use]
    pub fn fave_method(self) -> &'static str {
        match self {
            Self::Post => "fave.getPosts",
            Self::Photo => "fave.getPhotos",
            Self::Video => "fave.getVideos",
        }
    }

    /// Largest page [`fave_method`](Self::fave_method) returns.
    #[must_use]
    pub fn fave_page_size(self) -> usize {
        match self {
            Self::Post => 100,
            Self::Photo | Self::Video => 50,
        }
    }
}

impl fmt::Display for LikeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown like kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown like kind '{0}', expected post, photo or video")]
pub struct ParseLikeKindError(String);

impl FromStr for LikeKind {
    type Err = ParseLikeKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            _ => Err(ParseLikeKindError(s.to_string())),
        }
    }
}

/// A liked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LikeTarget {
    /// A wall post.
    Post {
        /// Post id.
        id: i64,
        /// Owner of the wall; negative for communities.
        owner_id: i64,
    },
    /// A photo.
    Photo {
        /// Photo id.
        id: i64,
        /// Owner of the photo.
        owner_id: i64,
    },
    /// A video.
    Video {
        /// Video id.
        id: i64,
        /// Owner of the video.
        owner_id: i64,
    },
}

impl LikeTarget {
    /// Builds a target of `kind`.
    #[must_use]
    pub fn new(kind: LikeKind, owner_id: i64, id: i64) -> Self {
        match kind {
            LikeKind::Post => Self::Post { id, owner_id },
            LikeKind::Photo => Self::Photo { id, owner_id },
            LikeKind::Video => Self::Video { id, owner_id },
        }
    }

    /// Kind of the object.
    #[must_use]
    pub fn kind(&self) -> LikeKind {
        match self {
            Self::Post { .. } => LikeKind::Post,
            Self::Photo { .. } => LikeKind::Photo,
            Self::Video { .. } => LikeKind::Video,
        }
    }

    /// Object id.
    #[must_use]
    pub fn id(&self) -> i64 {
        match *self {
            Self::Post { id, .. } | Self::Photo { id, .. } | Self::Video { id, .. } => id,
        }
    }

    /// Owner of the object; negative for communities.
    #[must_use]
    pub fn owner_id(&self) -> i64 {
        match *self {
            Self::Post { owner_id, .. }
            | Self::Photo { owner_id, .. }
            | Self::Video { owner_id, .. } => owner_id,
        }
    }

    /// `type`, `item_id` and `owner_id` for `likes.delete`.
    #[must_use]
    pub fn unlike_params(&self) -> Vec<QueryOption> {
        vec![
            with_param("type", self.kind().as_str()),
            with_number("item_id", self.id()),
            with_number("owner_id", self.owner_id()),
        ]
    }

    /// Public page of the object.
    #[must_use]
    pub fn page_url(&self) -> String {
        let prefix = match self.kind() {
            LikeKind::Post => "wall",
            LikeKind::Photo => "photo",
            LikeKind::Video => "video",
        };
        format!("https://vk.com/{prefix}{}_{}", self.owner_id(), self.id())
    }
}

impl fmt::Display for LikeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}_{}", self.kind(), self.owner_id(), self.id())
    }
}

#[derive(Debug, Deserialize)]
struct FavedObject {
    id: i64,
    owner_id: i64,
}

/// Lists every object of `kind` the current user has liked.
///
/// The list shrinks as likes are removed, so it is read in full before any
/// of it is unliked.
///
/// # Errors
///
/// Returns the [`ApiError`] that ended the walk; objects listed before it
/// are discarded.
#[instrument(skip(client, cancel))]
pub async fn list_faves(
    client: &ApiClient,
    cancel: &CancellationToken,
    kind: LikeKind,
) -> Result<Vec<LikeTarget>, ApiError> {
    let page_size = kind.fave_page_size();
    let count = i64::try_from(page_size).unwrap_or(i64::MAX);
    let mut pages = client
        .paginate(
            kind.fave_method(),
            vec![with_number("count", count)],
            ItemsPage::<FavedObject>::new(),
        )
        .with_page_size(page_size);

    let mut targets = Vec::new();
    while pages.next(cancel).await {
        targets.extend(
            pages
                .decoder_mut()
                .take_items()
                .into_iter()
                .map(|object| LikeTarget::new(kind, object.owner_id, object.id)),
        );
    }
    if let Some(error) = pages.into_err() {
        return Err(error);
    }
    debug!(count = targets.len(), "liked objects listed");
    Ok(targets)
}

#[derive(Debug, Deserialize)]
struct UnlikeResponse {
    #[serde(default)]
    likes: u64,
}

/// Removes likes through one shared [`Caller`].
///
/// Sharing the caller lets a solved captcha carry over to every later
/// removal, including those running on other pool workers.
#[derive(Debug, Clone)]
pub struct Unliker {
    caller: Arc<Caller>,
}

impl Unliker {
    /// Creates an unliker authenticated with the client's credential.
    #[must_use]
    pub fn new(client: &ApiClient) -> Self {
        Self {
            caller: Arc::new(client.caller(UNLIKE_METHOD, Vec::new())),
        }
    }

    /// Wraps an already configured caller for `likes.delete`.
    #[must_use]
    pub fn from_caller(caller: Arc<Caller>) -> Self {
        Self { caller }
    }

    /// Removes the like from `target` and returns its remaining like count.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the underlying call.
    #[instrument(skip(self, cancel), fields(target = %target))]
    pub async fn unlike(
        &self,
        cancel: &CancellationToken,
        target: &LikeTarget,
    ) -> Result<u64, ApiError> {
        let response: UnlikeResponse = self
            .caller
            .call_json(cancel, &target.unlike_params())
            .await?;
        debug!(remaining = response.likes, url = %target.page_url(), "like removed");
        Ok(response.likes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::CallParams;

    fn applied(target: &LikeTarget) -> CallParams {
        let mut params = CallParams::new();
        params.apply(&target.unlike_params());
        params
    }

    #[test]
    fn test_projection_is_uniform() {
        let targets = [
            LikeTarget::Post { id: 1, owner_id: -10 },
            LikeTarget::Photo { id: 2, owner_id: 20 },
            LikeTarget::Video { id: 3, owner_id: 30 },
        ];
        let kinds: Vec<_> = targets.iter().map(LikeTarget::kind).collect();
        assert_eq!(kinds, vec![LikeKind::Post, LikeKind::Photo, LikeKind::Video]);
        assert_eq!(targets[1].id(), 2);
        assert_eq!(targets[0].owner_id(), -10);
        assert_eq!(
            LikeTarget::new(LikeKind::Video, 30, 3),
            targets[2]
        );
    }

    #[test]
    fn test_unlike_params() {
        let params = applied(&LikeTarget::Photo { id: 456, owner_id: -123 });
        assert_eq!(params.get("type"), Some("photo"));
        assert_eq!(params.get("item_id"), Some("456"));
        assert_eq!(params.get("owner_id"), Some("-123"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_page_url_and_display() {
        let post = LikeTarget::Post { id: 7, owner_id: 1 };
        assert_eq!(post.page_url(), "https://vk.com/wall1_7");
        assert_eq!(post.to_string(), "post 1_7");
    }

    #[test]
    fn test_fave_methods_cover_every_kind() {
        let methods: Vec<_> = LikeKind::ALL.iter().map(|kind| kind.fave_method()).collect();
        assert_eq!(methods, vec!["fave.getPosts", "fave.getPhotos", "fave.getVideos"]);
        assert_eq!(LikeKind::Post.fave_page_size(), 100);
        assert_eq!(LikeKind::Video.fave_page_size(), 50);
    }

    #[test]
    fn test_like_kind_from_str() {
        assert_eq!("Photo".parse::<LikeKind>().unwrap(), LikeKind::Photo);
        assert!("story".parse::<LikeKind>().is_err());
    }
}
