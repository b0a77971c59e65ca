//! Provider identifiers and the configured provider set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of an upstream SMS provider (`provider1`, `provider2`, ...).
///
/// The set of valid identifiers is closed at configuration time; see
/// [`Providers`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The closed set of configured providers and their base URLs.
///
/// Backed by a `BTreeMap` so every iteration is in stable sorted order; the
/// distribution selector relies on that for deterministic round-robin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Providers {
    urls: BTreeMap<ProviderId, String>,
}

impl Providers {
    pub fn new(urls: BTreeMap<ProviderId, String>) -> Self {
        Self { urls }
    }

    /// Base URL for a provider, if configured.
    pub fn url(&self, id: &ProviderId) -> Option<&str> {
        self.urls.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.urls.contains_key(id)
    }

    /// Provider ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &ProviderId> {
        self.urls.keys()
    }

    /// `(id, url)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProviderId, &str)> {
        self.urls.iter().map(|(id, url)| (id, url.as_str()))
    }

    /// First provider in sorted order; the degraded-mode fallback target.
    pub fn first(&self) -> Option<(&ProviderId, &str)> {
        self.urls.iter().next().map(|(id, url)| (id, url.as_str()))
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl Default for Providers {
    /// The development defaults: three local provider stubs.
    fn default() -> Self {
        let mut urls = BTreeMap::new();
        urls.insert(
            ProviderId::from("provider1"),
            "http://localhost:8071/api/sms/provider1".to_string(),
        );
        urls.insert(
            ProviderId::from("provider2"),
            "http://localhost:8072/api/sms/provider2".to_string(),
        );
        urls.insert(
            ProviderId::from("provider3"),
            "http://localhost:8073/api/sms/provider3".to_string(),
        );
        Self { urls }
    }
}

impl FromIterator<(ProviderId, String)> for Providers {
    fn from_iter<T: IntoIterator<Item = (ProviderId, String)>>(iter: T) -> Self {
        Self {
            urls: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_providers_sorted() {
        let providers = Providers::default();
        let ids: Vec<&str> = providers.ids().map(ProviderId::as_str).collect();
        assert_eq!(ids, vec!["provider1", "provider2", "provider3"]);
    }

    #[test]
    fn test_url_lookup() {
        let providers = Providers::default();
        let url = providers.url(&ProviderId::from("provider2")).unwrap();
        assert!(url.contains("8072"));
        assert!(providers.url(&ProviderId::from("provider9")).is_none());
    }

    #[test]
    fn test_first_is_lowest_sorted() {
        let providers = Providers::default();
        let (id, _) = providers.first().unwrap();
        assert_eq!(id.as_str(), "provider1");
    }

    #[test]
    fn test_provider_id_serde_is_transparent() {
        let id = ProviderId::from("provider1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"provider1\"");
    }
}
