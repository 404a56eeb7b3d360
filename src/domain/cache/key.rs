//! Hierarchical cache keys and prefix patterns.
//!
//! Keys are segment lists such as `orders/list/user-1`. A pattern matches
//! every key it is a prefix of, so `orders` covers both `orders/list/..`
//! and `orders/detail/..`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

const SEPARATOR: char = '/';

fn parse_segments(field: &str, raw: &str) -> Result<Vec<String>, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    let segments: Vec<String> = raw.split(SEPARATOR).map(|s| s.to_string()).collect();
    validate_segments(field, &segments)?;
    Ok(segments)
}

fn validate_segments(field: &str, segments: &[String]) -> Result<(), ValidationError> {
    if segments.is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    if segments.iter().any(|s| s.is_empty() || s.contains(SEPARATOR)) {
        return Err(ValidationError::invalid_format(
            field,
            "segments must be non-empty and must not contain '/'",
        ));
    }
    Ok(())
}

/// Address of one cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(segments: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        validate_segments("cache_key", &segments)?;
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The first segment, which names the data domain.
    pub fn domain(&self) -> &str {
        &self.0[0]
    }

    /// Pattern matching exactly this key and its descendants.
    pub fn as_pattern(&self) -> KeyPattern {
        KeyPattern(self.0.clone())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl FromStr for CacheKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_segments("cache_key", s).map(Self)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CacheKey> for String {
    fn from(value: CacheKey) -> Self {
        value.to_string()
    }
}

/// Prefix pattern selecting a set of cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPattern(Vec<String>);

impl KeyPattern {
    pub fn new<I, S>(segments: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        validate_segments("key_pattern", &segments)?;
        Ok(Self(segments))
    }

    /// Pattern covering a whole data domain, e.g. `orders`.
    pub fn domain(name: &str) -> Result<Self, ValidationError> {
        Self::new([name])
    }

    /// Domain pattern for the crate's own constant domain names.
    pub(crate) fn for_domain(name: &'static str) -> Self {
        debug_assert!(!name.is_empty() && !name.contains(SEPARATOR));
        Self(vec![name.to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        key.0.len() >= self.0.len() && key.0.iter().zip(&self.0).all(|(k, p)| k == p)
    }

    /// True when every key matched by `other` is also matched by `self`.
    pub fn covers(&self, other: &KeyPattern) -> bool {
        other.0.len() >= self.0.len() && other.0.iter().zip(&self.0).all(|(o, p)| o == p)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl FromStr for KeyPattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_segments("key_pattern", s).map(Self)
    }
}

impl TryFrom<String> for KeyPattern {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyPattern> for String {
    fn from(value: KeyPattern) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(s: &str) -> CacheKey {
        s.parse().unwrap()
    }

    fn pattern(s: &str) -> KeyPattern {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_displays_segments() {
        let k = key("orders/list/user-1");
        assert_eq!(k.segments(), &["orders", "list", "user-1"]);
        assert_eq!(k.domain(), "orders");
        assert_eq!(k.to_string(), "orders/list/user-1");
    }

    #[test]
    fn rejects_empty_and_blank_segments() {
        assert!("".parse::<CacheKey>().is_err());
        assert!("orders//list".parse::<CacheKey>().is_err());
        assert!(CacheKey::new(Vec::<String>::new()).is_err());
        assert!(KeyPattern::new(["a/b"]).is_err());
    }

    #[test]
    fn domain_pattern_matches_descendants() {
        let p = pattern("orders");
        assert!(p.matches(&key("orders")));
        assert!(p.matches(&key("orders/list/user-1")));
        assert!(!p.matches(&key("ordersx/list")));
        assert!(!p.matches(&key("cart")));
    }

    #[test]
    fn longer_pattern_does_not_match_shorter_key() {
        assert!(!pattern("orders/list").matches(&key("orders")));
    }

    #[test]
    fn covers_is_prefix_relation() {
        assert!(pattern("orders").covers(&pattern("orders/list")));
        assert!(!pattern("orders/list").covers(&pattern("orders")));
        assert!(pattern("cart").covers(&pattern("cart")));
    }

    #[test]
    fn key_as_pattern_matches_itself() {
        let k = key("inventory/sku-1");
        assert!(k.as_pattern().matches(&k));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9-]{1,6}"
    }

    proptest! {
        #[test]
        fn a_key_is_matched_by_each_of_its_prefixes(
            segs in proptest::collection::vec(segment(), 1..5),
            cut in 1usize..5,
        ) {
            let k = CacheKey::new(segs.clone()).unwrap();
            let len = cut.min(segs.len());
            let p = KeyPattern::new(segs[..len].to_vec()).unwrap();
            prop_assert!(p.matches(&k));
        }

        #[test]
        fn covering_pattern_matches_everything_the_covered_one_does(
            segs in proptest::collection::vec(segment(), 1..5),
            a in 1usize..5,
            b in 1usize..5,
        ) {
            let k = CacheKey::new(segs.clone()).unwrap();
            let (short, long) = (a.min(b).min(segs.len()), a.max(b).min(segs.len()));
            let wide = KeyPattern::new(segs[..short].to_vec()).unwrap();
            let narrow = KeyPattern::new(segs[..long].to_vec()).unwrap();
            prop_assert!(wide.covers(&narrow));
            prop_assert!(!narrow.matches(&k) || wide.matches(&k));
        }
    }
}
