//! `s3://bucket/key` parsing
//!
//! [`ObjectPath`] is the pure value behind every location: a bucket, a key and
//! the canonical url built from them. Identity (`Eq`, `Hash`, `Ord`) is defined
//! on the canonical url string alone.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scheme of every supported location
pub const SCHEME: &str = "s3";

/// Prefix every location string must start with
pub const SCHEME_PREFIX: &str = "s3://";

/// Key delimiter used to group "directories"
pub const DELIMITER: &str = "/";

/// A parsed `s3://bucket/key` location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath {
    bucket: String,
    key: String,
    url: String,
}

impl ObjectPath {
    /// Parse an `s3://bucket/key` string
    ///
    /// The bucket is everything between the scheme and the first `/`; the key is
    /// the remainder with leading slashes removed. Query and fragment markers are
    /// not interpreted, they stay part of the key.
    pub fn parse(input: &str) -> Result<Self> {
        let rest = input
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| Error::unsupported_url(input, "It must start with s3://"))?;

        let (bucket, key) = match rest.split_once('/') {
            Some((bucket, key)) => (bucket, key.trim_start_matches('/')),
            None => (rest, ""),
        };

        if bucket.is_empty() {
            return Err(Error::unsupported_url(input, "Bucket name is missing"));
        }

        Ok(Self {
            url: format!("{SCHEME_PREFIX}{bucket}/{key}"),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Build a path from its parts, equivalent to parsing `s3://{bucket}/{key}`
    pub fn from_bucket_key(bucket: &str, key: &str) -> Result<Self> {
        Self::parse(&format!("{SCHEME_PREFIX}{bucket}/{key}"))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Canonical `s3://bucket/key` form
    pub fn url(&self) -> &str {
        &self.url
    }

    /// True if the key is empty or ends with the delimiter
    pub fn is_dir(&self) -> bool {
        self.key.is_empty() || self.key.ends_with(DELIMITER)
    }

    /// Another object in the same bucket
    pub fn sibling(&self, key: &str) -> Result<Self> {
        Self::from_bucket_key(&self.bucket, key)
    }
}

impl PartialEq for ObjectPath {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for ObjectPath {}

impl Hash for ObjectPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl PartialOrd for ObjectPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.url.cmp(&other.url)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl FromStr for ObjectPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ObjectPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn test_parse_bucket_and_key() {
        let path = ObjectPath::parse("s3://test-bucket/SomeFolder/test_file.json").unwrap();
        assert_eq!(path.bucket(), "test-bucket");
        assert_eq!(path.key(), "SomeFolder/test_file.json");
        assert_eq!(path.url(), "s3://test-bucket/SomeFolder/test_file.json");
        assert_eq!(path.to_string(), path.url());
    }

    #[test]
    fn test_parse_directory_and_bucket_root() {
        let dir = ObjectPath::parse("s3://bucket/prefix/").unwrap();
        assert_eq!(dir.key(), "prefix/");
        assert!(dir.is_dir());

        let root = ObjectPath::parse("s3://bucket").unwrap();
        assert_eq!(root.bucket(), "bucket");
        assert_eq!(root.key(), "");
        assert_eq!(root.url(), "s3://bucket/");
        assert!(root.is_dir());

        let file = ObjectPath::parse("s3://bucket/file.txt").unwrap();
        assert!(!file.is_dir());
    }

    #[test]
    fn test_parse_strips_leading_slashes() {
        let path = ObjectPath::parse("s3://bucket//nested/key").unwrap();
        assert_eq!(path.key(), "nested/key");
        assert_eq!(path.url(), "s3://bucket/nested/key");
    }

    #[test]
    fn test_query_and_fragment_stay_in_key() {
        let path = ObjectPath::parse("s3://bucket/report?v=1#top").unwrap();
        assert_eq!(path.key(), "report?v=1#top");
    }

    #[test]
    fn test_round_trip() {
        for input in [
            "s3://bucket/key",
            "s3://bucket/a/b/c.json",
            "s3://bucket/dir/",
            "s3://my.bucket/with spaces/and+plus",
        ] {
            assert_eq!(ObjectPath::parse(input).unwrap().url(), input);
        }
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = ObjectPath::parse("https://bucket/some/path").unwrap_err();
        assert!(matches!(err, Error::InvalidLocation(_)));
        let msg = err.to_string();
        assert!(msg.contains("Unsupported URL"));
        assert!(msg.contains("https://bucket/some/path"));

        assert!(ObjectPath::parse("S3://bucket/key").is_err());
        assert!(ObjectPath::parse("bucket/key").is_err());
    }

    #[test]
    fn test_missing_bucket() {
        assert!(matches!(
            ObjectPath::parse("s3:///key"),
            Err(Error::InvalidLocation(_))
        ));
        assert!(ObjectPath::parse("s3://").is_err());
    }

    #[test]
    fn test_from_bucket_key() {
        let path = ObjectPath::from_bucket_key("test-bucket", "prefix/file.json").unwrap();
        assert_eq!(path, ObjectPath::parse("s3://test-bucket/prefix/file.json").unwrap());

        let sibling = path.sibling("other/file.txt").unwrap();
        assert_eq!(sibling.url(), "s3://test-bucket/other/file.txt");
    }

    #[test]
    fn test_equality_and_hash_follow_url() {
        let a = ObjectPath::parse("s3://bucket/test1").unwrap();
        let b = ObjectPath::from_bucket_key("bucket", "test1").unwrap();
        let c = ObjectPath::parse("s3://bucket/test2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a.clone(), b.clone(), c.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);

        let mut map = HashMap::new();
        map.insert(a, "value1");
        map.insert(c.clone(), "value2");
        assert_eq!(map[&b], "value1");
        assert_eq!(map[&c], "value2");
    }

    #[test]
    fn test_serde_as_string() {
        let path = ObjectPath::parse("s3://bucket/a/b").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"s3://bucket/a/b\"");

        let back: ObjectPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);

        assert!(serde_json::from_str::<ObjectPath>("\"gs://bucket/a\"").is_err());
    }
}
