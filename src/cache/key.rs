//! Cache keys

use std::fmt;

/// Request signature identifying one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    /// `path?a=1&b=2`, with query pairs sorted so equivalent requests share a key
    pub fn from_request(path: &str, query: &[(String, String)]) -> Self {
        if query.is_empty() {
            return Self(path.to_string());
        }
        let mut pairs: Vec<&(String, String)> = query.iter().collect();
        pairs.sort();
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        Self(format!("{}?{}", path, query))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path part, without the query string
    pub fn path(&self) -> &str {
        self.0.split('?').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
