//! Call parameters and the composable options that build them.
//!
//! [`CallParams`] is an ordered multimap of string keys to string values.
//! Options are small closures applied in order during request construction;
//! fixed per-operation options, per-session options (solved captchas) and
//! per-call options (the page offset) are layered on top of each other.
//!
//! # Example
//!
//! ```
//! use vk_client::api::{CallParams, with_number, with_param, with_strings};
//!
//! let mut params = CallParams::new();
//! params.apply(&[
//!     with_number("count", 100),
//!     with_strings("fields", &["photo_200", "city"]),
//!     with_param("order", "hints"),
//! ]);
//! assert_eq!(params.get("fields"), Some("photo_200,city"));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::auth::Credential;

/// A composable request-construction step.
pub type QueryOption = Arc<dyn Fn(&mut CallParams) + Send + Sync>;

/// Ordered multimap of request parameters.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallParams {
    pairs: Vec<(String, String)>,
}

impl CallParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value, keeping any existing values for `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Replaces every value for `key` with a single one, in place of the first.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| *k == key) {
            Some(first) => {
                self.pairs[first].1 = value;
                let mut index = 0;
                self.pairs.retain(|(k, _)| {
                    let keep = index <= first || *k != key;
                    index += 1;
                    keep
                });
            }
            None => self.pairs.push((key, value)),
        }
    }

    /// Returns the first value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `key`, in insertion order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Applies options in order.
    pub fn apply(&mut self, options: &[QueryOption]) {
        for option in options {
            option(self);
        }
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for CallParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.pairs {
            if key == "access_token" || key == "client_secret" {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Appends `key=value`.
pub fn with_param(key: impl Into<String>, value: impl Into<String>) -> QueryOption {
    let key = key.into();
    let value = value.into();
    Arc::new(move |params: &mut CallParams| params.add(key.clone(), value.clone()))
}

/// Sets `key` to a number.
pub fn with_number(key: impl Into<String>, n: i64) -> QueryOption {
    let key = key.into();
    Arc::new(move |params: &mut CallParams| params.set(key.clone(), n.to_string()))
}

/// Sets `key` to a comma-separated list of numbers.
pub fn with_numbers(key: impl Into<String>, ns: &[i64]) -> QueryOption {
    let list = ns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    with_set(key.into(), list)
}

/// Sets `key` to a comma-separated list of strings.
pub fn with_strings(key: impl Into<String>, strs: &[&str]) -> QueryOption {
    with_set(key.into(), strs.join(","))
}

/// Appends every pair of `source`.
pub fn with_query(source: CallParams) -> QueryOption {
    Arc::new(move |params: &mut CallParams| {
        for (key, value) in source.iter() {
            params.add(key, value);
        }
    })
}

/// Composes several options into one.
pub fn with_options(options: Vec<QueryOption>) -> QueryOption {
    Arc::new(move |params: &mut CallParams| params.apply(&options))
}

/// Sets the `access_token` parameter from a credential.
pub fn with_access_token(credential: &Credential) -> QueryOption {
    with_set("access_token".to_string(), credential.token().to_string())
}

fn with_set(key: String, value: String) -> QueryOption {
    Arc::new(move |params: &mut CallParams| params.set(key.clone(), value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_duplicates_in_order() {
        let mut params = CallParams::new();
        params.add("a", "1");
        params.add("b", "2");
        params.add("a", "3");
        assert_eq!(params.get("a"), Some("1"));
        assert_eq!(params.get_all("a"), vec!["1", "3"]);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_set_replaces_all_values_at_first_position() {
        let mut params: CallParams = [("a", "1"), ("b", "2"), ("a", "3")].into_iter().collect();
        params.set("a", "9");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("a", "9"), ("b", "2")]);

        params.set("c", "4");
        assert_eq!(params.get("c"), Some("4"));
    }

    #[test]
    fn test_options_compose_in_order() {
        let mut params = CallParams::new();
        params.apply(&[
            with_options(vec![with_number("count", 50), with_param("x", "1")]),
            with_number("count", 100),
            with_numbers("user_ids", &[1, 2, 3]),
            with_query([("extra", "yes")].into_iter().collect()),
        ]);
        assert_eq!(params.get("count"), Some("100"));
        assert_eq!(params.get("user_ids"), Some("1,2,3"));
        assert_eq!(params.get("extra"), Some("yes"));
        assert_eq!(params.iter().next(), Some(("count", "100")));
    }

    #[test]
    fn test_access_token_option_and_debug_redaction() {
        let credential = Credential::new("s3cr3t", None, 7);
        let mut params = CallParams::new();
        params.apply(&[with_access_token(&credential)]);
        assert_eq!(params.get("access_token"), Some("s3cr3t"));

        let debug = format!("{params:?}");
        assert!(!debug.contains("s3cr3t"), "token leaked: {debug}");
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_empty_lists() {
        let mut params = CallParams::new();
        assert!(params.is_empty());
        params.apply(&[with_strings("fields", &[])]);
        assert_eq!(params.get("fields"), Some(""));
    }
}
