//! Offset-advancing page walker.
//!
//! A [`Paginator`] drives a [`Caller`] with `offset=<cursor>` appended,
//! hands each payload to a [`PageDecoder`] and advances the cursor by the
//! number of items decoded. The first error stops the walk for good.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vk_client::api::{Caller, ItemsPage, Paginator};
//!
//! # async fn example(caller: Arc<Caller>) -> Result<(), vk_client::api::ApiError> {
//! let cancel = CancellationToken::new();
//! let mut pages = Paginator::new(caller, ItemsPage::<serde_json::Value>::new()).with_page_size(100);
//!
//! while pages.next(&cancel).await {
//!     for item in pages.decoder().items() {
//!         println!("{item}");
//!     }
//! }
//! if let Some(error) = pages.into_err() {
//!     return Err(error);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::error::ApiError;
use super::executor::Caller;
use super::params::with_number;

/// Turns one page payload into items and reports how many there were.
///
/// Implementations reset their own output before decoding; the same
/// decoder is reused for every page.
pub trait PageDecoder {
    /// Decodes `raw` and returns the item count.
    ///
    /// # Errors
    ///
    /// Any error ends the walk and is kept by the paginator.
    fn decode(&mut self, raw: &[u8]) -> Result<usize, ApiError>;
}

impl<F> PageDecoder for F
where
    F: FnMut(&[u8]) -> Result<usize, ApiError>,
{
    fn decode(&mut self, raw: &[u8]) -> Result<usize, ApiError> {
        self(raw)
    }
}

/// Decoder for the common `{"count": N, "items": [...]}` page shape.
#[derive(Debug, Clone)]
pub struct ItemsPage<T> {
    total: Option<u64>,
    items: Vec<T>,
}

#[derive(Deserialize)]
struct WireItems<T> {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl<T> Default for ItemsPage<T> {
    fn default() -> Self {
        Self {
            total: None,
            items: Vec::new(),
        }
    }
}

impl<T> ItemsPage<T> {
    /// Creates an empty page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Items of the most recently decoded page.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Takes the items of the most recent page, leaving it empty.
    pub fn take_items(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Total number of items the provider reported, if any.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

impl<T: DeserializeOwned> PageDecoder for ItemsPage<T> {
    fn decode(&mut self, raw: &[u8]) -> Result<usize, ApiError> {
        self.items.clear();
        let wire: WireItems<T> =
            serde_json::from_slice(raw).map_err(|source| ApiError::decode("items page", source))?;
        self.total = wire.count;
        self.items = wire.items;
        Ok(self.items.len())
    }
}

/// Walks a paginated resource one page per [`next`](Self::next).
///
/// Offsets issued are strictly increasing; a new paginator is the only way
/// to restart.
#[derive(Debug)]
pub struct Paginator<D> {
    caller: Arc<Caller>,
    decoder: D,
    offset: usize,
    page_size: Option<usize>,
    exhausted: bool,
    error: Option<ApiError>,
}

impl<D: PageDecoder> Paginator<D> {
    /// Creates a paginator starting at offset 0.
    pub fn new(caller: Arc<Caller>, decoder: D) -> Self {
        Self {
            caller,
            decoder,
            offset: 0,
            page_size: None,
            exhausted: false,
            error: None,
        }
    }

    /// Stops after the first page holding fewer than `size` items, saving
    /// the final empty round trip.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size).filter(|size| *size > 0);
        self
    }

    /// Fetches and decodes the next page.
    ///
    /// Returns `true` if a non-empty page was decoded. Returns `false` at
    /// the end of the collection and after any error; check
    /// [`err`](Self::err) to tell the two apart.
    #[instrument(skip(self, cancel), fields(method = %self.caller.method(), offset = self.offset))]
    pub async fn next(&mut self, cancel: &CancellationToken) -> bool {
        if self.exhausted || self.error.is_some() {
            return false;
        }

        let offset = i64::try_from(self.offset).unwrap_or(i64::MAX);
        let payload = match self.caller.call(cancel, &[with_number("offset", offset)]).await {
            Ok(payload) => payload,
            Err(error) => {
                debug!(%error, "page call failed");
                self.error = Some(error);
                return false;
            }
        };

        let count = match self.decoder.decode(&payload) {
            Ok(count) => count,
            Err(error) => {
                debug!(%error, "page decode failed");
                self.error = Some(error);
                return false;
            }
        };

        self.offset += count;
        if count == 0 {
            debug!("empty page, walk finished");
            self.exhausted = true;
            return false;
        }
        if self.page_size.is_some_and(|size| count < size) {
            debug!(count, "short page, walk finished");
            self.exhausted = true;
        }
        true
    }

    /// The error that ended the walk, if any.
    #[must_use]
    pub fn err(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Consumes the paginator and returns its error, if any.
    pub fn into_err(self) -> Option<ApiError> {
        self.error
    }

    /// The offset the next page will be requested at.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The decoder holding the most recent page.
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Mutable access to the decoder, e.g. to take the decoded items.
    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }
}
